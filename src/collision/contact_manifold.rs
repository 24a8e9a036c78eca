use crate::core::BodyHandle;
use crate::math::{Transform, Vector3};

/// Maximum number of contact points cached per manifold
pub const MAX_CONTACT_POINTS: usize = 4;

/// Default distance beyond which cached contacts are dropped
pub const DEFAULT_CONTACT_BREAKING_THRESHOLD: f32 = 0.02;

/// Default number of refreshes a point may go without being reported again
pub const DEFAULT_CONTACT_STALENESS_THRESHOLD: u32 = 120;

/// A single cached contact between two bodies.
///
/// Local points are stored in each body's frame so the contact can be
/// re-evaluated after the bodies move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ManifoldPoint {
    /// Contact point in body A's local frame
    pub local_point_a: Vector3,

    /// Contact point in body B's local frame
    pub local_point_b: Vector3,

    /// World position on A, refreshed every step
    pub position_world_on_a: Vector3,

    /// World position on B, refreshed every step
    pub position_world_on_b: Vector3,

    /// Contact normal in world space, pointing from B towards A
    pub normal_world_on_b: Vector3,

    /// Signed separation; negative when penetrating
    pub distance: f32,

    /// Number of refreshes this point has survived
    pub lifetime: u32,

    /// Refreshes since the narrow phase last reported this point
    pub unmatched_refreshes: u32,

    /// Accumulated normal impulse, carried between steps for warm starting
    pub applied_impulse: f32,

    /// Accumulated friction impulse along the two tangents
    pub applied_friction_impulse: [f32; 2],

    /// Friction of the two bodies combined
    pub combined_friction: f32,

    /// Restitution of the two bodies combined
    pub combined_restitution: f32,

    id: u32,

    // solver cache, rebuilt in the prepare phase
    pub(crate) jac_diag_inv: f32,
    pub(crate) friction_tangents: [Vector3; 2],
    pub(crate) friction_jac_diag_inv: [f32; 2],
    pub(crate) restitution_velocity: f32,
}

impl ManifoldPoint {
    /// Creates a point from local points, the world normal on B and the distance
    pub fn new(local_point_a: Vector3, local_point_b: Vector3, normal_world_on_b: Vector3, distance: f32) -> Self {
        Self {
            local_point_a,
            local_point_b,
            position_world_on_a: Vector3::zeros(),
            position_world_on_b: Vector3::zeros(),
            normal_world_on_b,
            distance,
            lifetime: 0,
            unmatched_refreshes: 0,
            applied_impulse: 0.0,
            applied_friction_impulse: [0.0; 2],
            combined_friction: 0.0,
            combined_restitution: 0.0,
            id: 0,
            jac_diag_inv: 0.0,
            friction_tangents: [Vector3::zeros(); 2],
            friction_jac_diag_inv: [0.0; 2],
            restitution_velocity: 0.0,
        }
    }

    /// Stable identity of this contact, kept while the point is matched across steps
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Penetration depth, zero when separated
    pub fn penetration(&self) -> f32 {
        (-self.distance).max(0.0)
    }
}

/// Up to four contact points between a pair of bodies, kept across steps
#[derive(Debug, Clone)]
pub struct PersistentManifold {
    body_a: BodyHandle,
    body_b: BodyHandle,
    points: Vec<ManifoldPoint>,
    contact_breaking_threshold: f32,
    next_id: u32,
}

impl PersistentManifold {
    /// Creates an empty manifold for two bodies
    pub fn new(body_a: BodyHandle, body_b: BodyHandle, contact_breaking_threshold: f32) -> Self {
        Self {
            body_a,
            body_b,
            points: Vec::with_capacity(MAX_CONTACT_POINTS),
            contact_breaking_threshold,
            next_id: 0,
        }
    }

    /// The two bodies, in the order contact points refer to them
    pub fn bodies(&self) -> (BodyHandle, BodyHandle) {
        (self.body_a, self.body_b)
    }

    /// Number of cached points
    pub fn num_contacts(&self) -> usize {
        self.points.len()
    }

    /// Returns the point at `index`
    pub fn contact_point(&self, index: usize) -> &ManifoldPoint {
        &self.points[index]
    }

    /// All cached points
    pub fn points(&self) -> &[ManifoldPoint] {
        &self.points
    }

    pub(crate) fn points_mut(&mut self) -> &mut [ManifoldPoint] {
        &mut self.points
    }

    /// Distance beyond which points are dropped
    pub fn contact_breaking_threshold(&self) -> f32 {
        self.contact_breaking_threshold
    }

    /// Deepest penetration among the cached points, zero if none
    pub fn max_penetration(&self) -> f32 {
        self.points.iter().map(|p| p.penetration()).fold(0.0, f32::max)
    }

    /// Finds the cached point closest to `point` in A's local frame,
    /// within the breaking threshold.
    pub fn get_cache_entry(&self, point: &ManifoldPoint) -> Option<usize> {
        let mut shortest = self.contact_breaking_threshold * self.contact_breaking_threshold;
        let mut nearest = None;
        for (i, cached) in self.points.iter().enumerate() {
            let dist = (cached.local_point_a - point.local_point_a).norm_squared();
            if dist < shortest {
                shortest = dist;
                nearest = Some(i);
            }
        }
        nearest
    }

    /// Adds a new point, replacing one when the manifold is full. Returns its index.
    pub fn add_manifold_point(&mut self, mut point: ManifoldPoint) -> usize {
        point.id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        if self.points.len() < MAX_CONTACT_POINTS {
            self.points.push(point);
            self.points.len() - 1
        } else {
            let index = self.sort_cached_points(&point);
            self.points[index] = point;
            index
        }
    }

    /// Overwrites the geometry of a matched point, keeping its impulses,
    /// lifetime and id. The point counts as freshly reported.
    pub fn replace_contact_point(&mut self, point: ManifoldPoint, index: usize) {
        let cached = &mut self.points[index];
        let mut point = point;
        point.id = cached.id;
        point.lifetime = cached.lifetime;
        point.unmatched_refreshes = 0;
        point.applied_impulse = cached.applied_impulse;
        point.applied_friction_impulse = cached.applied_friction_impulse;
        *cached = point;
    }

    /// Removes the point at `index`; the last point takes its slot
    pub fn remove_contact_point(&mut self, index: usize) {
        self.points.swap_remove(index);
    }

    /// Removes every point
    pub fn clear_manifold(&mut self) {
        self.points.clear();
    }

    /// Recomputes world positions and distances for the new transforms and
    /// drops points that separated beyond the breaking threshold or drifted
    /// apart tangentially.
    pub fn refresh_contact_points(&mut self, transform_a: &Transform, transform_b: &Transform) {
        for point in self.points.iter_mut() {
            point.position_world_on_a = transform_a.transform_point(&point.local_point_a);
            point.position_world_on_b = transform_b.transform_point(&point.local_point_b);
            point.distance = (point.position_world_on_a - point.position_world_on_b).dot(&point.normal_world_on_b);
            point.lifetime += 1;
            point.unmatched_refreshes += 1;
        }

        let threshold = self.contact_breaking_threshold;
        let threshold_sq = threshold * threshold;
        for i in (0..self.points.len()).rev() {
            let point = &self.points[i];
            if point.distance > threshold {
                self.remove_contact_point(i);
                continue;
            }
            let projected = point.position_world_on_a - point.normal_world_on_b * point.distance;
            let drift = (point.position_world_on_b - projected).norm_squared();
            if drift > threshold_sq {
                self.remove_contact_point(i);
            }
        }
    }

    /// Drops points the narrow phase has not reported for more than
    /// `staleness_threshold` refreshes.
    pub fn evict_stale_points(&mut self, staleness_threshold: u32) {
        for i in (0..self.points.len()).rev() {
            if self.points[i].unmatched_refreshes > staleness_threshold {
                self.remove_contact_point(i);
            }
        }
    }

    /// Chooses the slot to replace when a fifth point arrives: the deepest
    /// point is kept and the area spanned by the remaining four is maximised.
    fn sort_cached_points(&self, point: &ManifoldPoint) -> usize {
        let mut deepest = None;
        let mut max_penetration = point.distance;
        for (i, cached) in self.points.iter().enumerate() {
            if cached.distance < max_penetration {
                max_penetration = cached.distance;
                deepest = Some(i);
            }
        }

        let p = &self.points;
        let new = point.local_point_a;
        let area = |a: Vector3, b: Vector3| a.cross(&b).norm_squared();

        let mut res = [0.0f32; 4];
        if deepest != Some(0) {
            res[0] = area(new - p[1].local_point_a, p[3].local_point_a - p[2].local_point_a);
        }
        if deepest != Some(1) {
            res[1] = area(new - p[0].local_point_a, p[3].local_point_a - p[2].local_point_a);
        }
        if deepest != Some(2) {
            res[2] = area(new - p[0].local_point_a, p[3].local_point_a - p[1].local_point_a);
        }
        if deepest != Some(3) {
            res[3] = area(new - p[0].local_point_a, p[2].local_point_a - p[1].local_point_a);
        }

        let mut best = 0;
        for i in 1..4 {
            if res[i] > res[best] {
                best = i;
            }
        }
        if Some(best) == deepest {
            // all candidate areas were zero; replace any other slot
            best = (best + 1) % MAX_CONTACT_POINTS;
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn manifold() -> PersistentManifold {
        PersistentManifold::new(BodyHandle::new(0, 0), BodyHandle::new(1, 0), DEFAULT_CONTACT_BREAKING_THRESHOLD)
    }

    fn point_at(x: f32, z: f32, distance: f32) -> ManifoldPoint {
        let local = Vector3::new(x, 0.0, z);
        ManifoldPoint::new(local, local - Vector3::y() * distance, Vector3::y(), distance)
    }

    #[test]
    fn matches_nearby_points() {
        let mut m = manifold();
        let index = m.add_manifold_point(point_at(1.0, 1.0, -0.01));
        let near = point_at(1.005, 1.0, -0.01);
        assert_eq!(m.get_cache_entry(&near), Some(index));
        let far = point_at(-1.0, 1.0, -0.01);
        assert_eq!(m.get_cache_entry(&far), None);
    }

    #[test]
    fn replace_keeps_impulse_and_id() {
        let mut m = manifold();
        let index = m.add_manifold_point(point_at(0.0, 0.0, -0.01));
        m.points_mut()[index].applied_impulse = 3.0;
        m.points_mut()[index].lifetime = 7;
        let id = m.contact_point(index).id();

        m.replace_contact_point(point_at(0.001, 0.0, -0.02), index);
        let p = m.contact_point(index);
        assert_relative_eq!(p.applied_impulse, 3.0);
        assert_eq!(p.lifetime, 7);
        assert_eq!(p.id(), id);
        assert_relative_eq!(p.distance, -0.02);
    }

    #[test]
    fn full_manifold_keeps_deepest_and_spreads() {
        let mut m = manifold();
        m.add_manifold_point(point_at(-1.0, -1.0, -0.05));
        m.add_manifold_point(point_at(1.0, -1.0, -0.01));
        m.add_manifold_point(point_at(1.0, 1.0, -0.01));
        m.add_manifold_point(point_at(0.1, 0.1, -0.01));
        assert_eq!(m.num_contacts(), MAX_CONTACT_POINTS);

        let index = m.add_manifold_point(point_at(-1.0, 1.0, -0.01));
        assert_eq!(m.num_contacts(), MAX_CONTACT_POINTS);
        assert_ne!(index, 0);
        assert_relative_eq!(m.contact_point(index).local_point_a, Vector3::new(-1.0, 0.0, 1.0));
        assert!(m.points().iter().any(|p| p.distance == -0.05));
    }

    #[test]
    fn refresh_drops_separated_points() {
        let mut m = manifold();
        m.add_manifold_point(point_at(0.0, 0.0, -0.01));
        m.add_manifold_point(point_at(1.0, 0.0, -0.01));

        m.refresh_contact_points(&Transform::identity(), &Transform::identity());
        assert_eq!(m.num_contacts(), 2);
        assert!(m.points().iter().all(|p| p.lifetime == 1));

        // lift A well past the breaking threshold
        let lifted = Transform::from_position(Vector3::new(0.0, 0.5, 0.0));
        m.refresh_contact_points(&lifted, &Transform::identity());
        assert_eq!(m.num_contacts(), 0);
    }

    #[test]
    fn stale_points_are_evicted() {
        let mut m = manifold();
        m.add_manifold_point(point_at(0.0, 0.0, -0.01));
        m.add_manifold_point(point_at(1.0, 0.0, -0.01));

        for _ in 0..3 {
            // only the first point is reported again
            let index = m.get_cache_entry(&point_at(0.001, 0.0, -0.01)).unwrap();
            m.replace_contact_point(point_at(0.001, 0.0, -0.01), index);
            m.refresh_contact_points(&Transform::identity(), &Transform::identity());
            m.evict_stale_points(2);
        }

        assert_eq!(m.num_contacts(), 1);
        let kept = m.contact_point(0);
        assert_relative_eq!(kept.local_point_a.x, 0.001);
        assert_eq!(kept.unmatched_refreshes, 1);
        assert_eq!(kept.lifetime, 3);
    }

    #[test]
    fn refresh_drops_sliding_points() {
        let mut m = manifold();
        m.add_manifold_point(point_at(0.0, 0.0, -0.01));
        let slid = Transform::from_position(Vector3::new(0.5, 0.0, 0.0));
        m.refresh_contact_points(&slid, &Transform::identity());
        assert_eq!(m.num_contacts(), 0);
    }
}
