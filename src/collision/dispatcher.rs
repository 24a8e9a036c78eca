//! Narrow phase dispatch.
//!
//! A table indexed by the two shape kinds selects the algorithm for a pair.
//! The algorithm is created once per overlapping pair and keeps its own
//! state (the GJK separating axis) between steps.

use log::trace;

use crate::collision::{
    ClosestPointInput, GjkConfig, GjkPairDetector, ManifoldPoint, OverlappingPair, PersistentManifold,
    DEFAULT_CONTACT_BREAKING_THRESHOLD, DEFAULT_CONTACT_STALENESS_THRESHOLD, DEFAULT_EPA_ITERATIONS,
};
use crate::math::{plane_space, Quaternion, Transform, Vector3, EPSILON};
use crate::shapes::{CollisionShape, ShapeType};

/// Upper bound on the combined friction of a contact
const MAX_FRICTION: f32 = 10.0;

/// Largest rotation applied when perturbing a shape for extra contacts
const PERTURBATION_ANGLE_LIMIT: f32 = 0.125 * std::f32::consts::PI;

/// Which algorithm handles a pair of shape kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmKind {
    /// GJK closest points with penetration fallback
    ConvexConvex,
    /// Never produces contacts
    Empty,
}

/// Narrow phase settings shared by all pairs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DispatcherInfo {
    /// Distance within which contact points are created and kept
    pub contact_breaking_threshold: f32,

    /// Number of perturbed queries per step; zero disables perturbation
    pub perturbation_iterations: u32,

    /// Perturbation runs only while the manifold has fewer points than this
    pub perturbation_min_points: usize,

    /// Refreshes a contact may go unreported before it is dropped
    pub contact_staleness_threshold: u32,

    pub gjk: GjkConfig,
    pub epa_max_iterations: u32,
}

impl Default for DispatcherInfo {
    fn default() -> Self {
        Self {
            contact_breaking_threshold: DEFAULT_CONTACT_BREAKING_THRESHOLD,
            perturbation_iterations: 4,
            perturbation_min_points: 3,
            contact_staleness_threshold: DEFAULT_CONTACT_STALENESS_THRESHOLD,
            gjk: GjkConfig::default(),
            epa_max_iterations: DEFAULT_EPA_ITERATIONS,
        }
    }
}

/// What the narrow phase needs to know about one side of a pair
#[derive(Debug, Clone, Copy)]
pub struct CollisionObject<'a> {
    pub shape: &'a CollisionShape,
    pub transform: Transform,
    pub friction: f32,
    pub restitution: f32,
}

/// Convex versus convex collision via GJK
#[derive(Debug, Clone)]
pub struct ConvexConvexAlgorithm {
    detector: GjkPairDetector,
}

impl ConvexConvexAlgorithm {
    pub fn new(info: &DispatcherInfo) -> Self {
        Self {
            detector: GjkPairDetector::new(info.gjk, info.epa_max_iterations),
        }
    }

    /// The GJK detector with its cached separating axis
    pub fn detector(&self) -> &GjkPairDetector {
        &self.detector
    }

    fn process_collision(
        &mut self,
        a: &CollisionObject,
        b: &CollisionObject,
        manifold: &mut PersistentManifold,
        info: &DispatcherInfo,
    ) {
        let threshold = manifold.contact_breaking_threshold();
        let max_distance = a.shape.margin() + b.shape.margin() + threshold;

        let input = ClosestPointInput::new(a.shape, a.transform, b.shape, b.transform)
            .with_maximum_distance(max_distance);
        let result = self.detector.get_closest_points(&input);

        if result.has_result {
            add_contact_point(manifold, a, b, &result.normal_on_b, &result.point_on_b, result.distance);

            if info.perturbation_iterations > 0
                && manifold.num_contacts() < info.perturbation_min_points
                && a.shape.shape_type().is_polyhedral()
                && b.shape.shape_type().is_polyhedral()
                && result.distance < threshold
            {
                self.perturb(a, b, manifold, &result.normal_on_b, &result.point_on_b, info.perturbation_iterations);
            }
        }

        manifold.refresh_contact_points(&a.transform, &b.transform);
        manifold.evict_stale_points(info.contact_staleness_threshold);
    }

    /// Tilts the smaller shape slightly about the contact point in a few
    /// directions around the normal and queries again, so a resting face
    /// yields a fuller manifold in one step.
    fn perturb(
        &mut self,
        a: &CollisionObject,
        b: &CollisionObject,
        manifold: &mut PersistentManifold,
        normal: &Vector3,
        pivot: &Vector3,
        iterations: u32,
    ) {
        let Some(normal) = normal.try_normalize(EPSILON) else {
            return;
        };
        let (v0, _) = plane_space(&normal);

        let threshold = manifold.contact_breaking_threshold();
        let radius_a = a.shape.bounding_radius();
        let radius_b = b.shape.bounding_radius();
        let perturb_a = radius_a < radius_b;
        let radius = radius_a.min(radius_b);
        if radius <= EPSILON {
            return;
        }
        let angle = (threshold / radius).min(PERTURBATION_ANGLE_LIMIT);

        let saved_axis = self.detector.cached_separating_axis();
        let perturbation = Quaternion::from_axis_angle(&nalgebra::Unit::new_unchecked(v0), angle);
        let max_distance = a.shape.margin() + b.shape.margin() + threshold;

        for i in 0..iterations {
            let iteration_angle = i as f32 * (std::f32::consts::TAU / iterations as f32);
            let rotq = Quaternion::from_axis_angle(&nalgebra::Unit::new_unchecked(normal), iteration_angle);
            let rotation = rotq.inverse() * perturbation * rotq;

            let (mut transform_a, mut transform_b) = (a.transform, b.transform);
            // rotate about the contact point so the contact stays in range
            if perturb_a {
                transform_a.rotation = rotation * a.transform.rotation;
                transform_a.position = pivot + rotation * (a.transform.position - pivot);
            } else {
                transform_b.rotation = rotation * b.transform.rotation;
                transform_b.position = pivot + rotation * (b.transform.position - pivot);
            }

            let input = ClosestPointInput::new(a.shape, transform_a, b.shape, transform_b)
                .with_maximum_distance(max_distance);
            let result = self.detector.get_closest_points(&input);
            if !result.has_result {
                continue;
            }

            // map the perturbed contact back onto the unperturbed shape
            let (start, depth) = if perturb_a {
                let end_perturbed = result.point_on_b + result.normal_on_b * result.distance;
                let end = a.transform.transform_point(&transform_a.inverse_transform_point(&end_perturbed));
                (result.point_on_b, (end - result.point_on_b).dot(&result.normal_on_b))
            } else {
                let end = result.point_on_b + result.normal_on_b * result.distance;
                let start = b.transform.transform_point(&transform_b.inverse_transform_point(&result.point_on_b));
                (start, (end - start).dot(&result.normal_on_b))
            };
            add_contact_point(manifold, a, b, &result.normal_on_b, &start, depth);
        }

        trace!("perturbation left {} contacts", manifold.num_contacts());
        self.detector.set_cached_separating_axis(saved_axis);
    }
}

/// Narrow phase algorithm attached to an overlapping pair
#[derive(Debug, Clone)]
pub enum CollisionAlgorithm {
    ConvexConvex(ConvexConvexAlgorithm),
    Empty,
}

impl CollisionAlgorithm {
    /// Kind of this algorithm
    pub fn kind(&self) -> AlgorithmKind {
        match self {
            CollisionAlgorithm::ConvexConvex(_) => AlgorithmKind::ConvexConvex,
            CollisionAlgorithm::Empty => AlgorithmKind::Empty,
        }
    }

    /// Updates `manifold` for the current transforms
    pub fn process_collision(
        &mut self,
        a: &CollisionObject,
        b: &CollisionObject,
        manifold: &mut PersistentManifold,
        info: &DispatcherInfo,
    ) {
        match self {
            CollisionAlgorithm::ConvexConvex(algorithm) => algorithm.process_collision(a, b, manifold, info),
            CollisionAlgorithm::Empty => manifold.clear_manifold(),
        }
    }
}

/// Adds a contact reported at `point_on_b`, merging it with a cached point when close
fn add_contact_point(
    manifold: &mut PersistentManifold,
    a: &CollisionObject,
    b: &CollisionObject,
    normal_on_b: &Vector3,
    point_on_b: &Vector3,
    distance: f32,
) {
    if distance > manifold.contact_breaking_threshold() {
        return;
    }

    let point_on_a = point_on_b + normal_on_b * distance;
    let local_a = a.transform.inverse_transform_point(&point_on_a);
    let local_b = b.transform.inverse_transform_point(point_on_b);

    let mut point = ManifoldPoint::new(local_a, local_b, *normal_on_b, distance);
    point.position_world_on_a = point_on_a;
    point.position_world_on_b = *point_on_b;
    point.combined_friction = (a.friction * b.friction).clamp(-MAX_FRICTION, MAX_FRICTION);
    point.combined_restitution = a.restitution * b.restitution;

    match manifold.get_cache_entry(&point) {
        Some(index) => manifold.replace_contact_point(point, index),
        None => {
            manifold.add_manifold_point(point);
        }
    }
}

/// Picks and runs the narrow phase algorithm for each pair
#[derive(Debug, Clone)]
pub struct CollisionDispatcher {
    table: [[AlgorithmKind; ShapeType::COUNT]; ShapeType::COUNT],
    info: DispatcherInfo,
}

impl Default for CollisionDispatcher {
    fn default() -> Self {
        Self::new(DispatcherInfo::default())
    }
}

impl CollisionDispatcher {
    /// Creates a dispatcher with convex pairs routed to GJK and the empty
    /// shape routed to the empty algorithm
    pub fn new(info: DispatcherInfo) -> Self {
        let mut table = [[AlgorithmKind::Empty; ShapeType::COUNT]; ShapeType::COUNT];
        for a in ShapeType::ALL {
            for b in ShapeType::ALL {
                if a.is_convex() && b.is_convex() {
                    table[a.index()][b.index()] = AlgorithmKind::ConvexConvex;
                }
            }
        }
        Self { table, info }
    }

    /// Narrow phase settings
    pub fn info(&self) -> &DispatcherInfo {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut DispatcherInfo {
        &mut self.info
    }

    /// Overrides the algorithm for a pair of shape kinds, in both orders
    pub fn register_algorithm(&mut self, a: ShapeType, b: ShapeType, kind: AlgorithmKind) {
        self.table[a.index()][b.index()] = kind;
        self.table[b.index()][a.index()] = kind;
    }

    /// Algorithm kind registered for two shape kinds
    pub fn algorithm_kind(&self, a: ShapeType, b: ShapeType) -> AlgorithmKind {
        self.table[a.index()][b.index()]
    }

    /// Creates a fresh algorithm for two shapes
    pub fn find_algorithm(&self, a: &CollisionShape, b: &CollisionShape) -> CollisionAlgorithm {
        match self.algorithm_kind(a.shape_type(), b.shape_type()) {
            AlgorithmKind::ConvexConvex => CollisionAlgorithm::ConvexConvex(ConvexConvexAlgorithm::new(&self.info)),
            AlgorithmKind::Empty => CollisionAlgorithm::Empty,
        }
    }

    /// Runs the narrow phase for one pair, creating its algorithm and
    /// manifold on first use. `a` and `b` must be the pair's owners in order.
    pub fn process_pair(&self, pair: &mut OverlappingPair, a: &CollisionObject, b: &CollisionObject) {
        let (owner_a, owner_b) = pair.owners();
        let algorithm = pair
            .algorithm
            .get_or_insert_with(|| self.find_algorithm(a.shape, b.shape));
        let manifold = pair
            .manifold
            .get_or_insert_with(|| PersistentManifold::new(owner_a, owner_b, self.info.contact_breaking_threshold));
        algorithm.process_collision(a, b, manifold, &self.info);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_routes_empty_shapes() {
        let dispatcher = CollisionDispatcher::default();
        assert_eq!(dispatcher.algorithm_kind(ShapeType::Box, ShapeType::Sphere), AlgorithmKind::ConvexConvex);
        assert_eq!(dispatcher.algorithm_kind(ShapeType::Cone, ShapeType::Simplex), AlgorithmKind::ConvexConvex);
        assert_eq!(dispatcher.algorithm_kind(ShapeType::Empty, ShapeType::Box), AlgorithmKind::Empty);
        assert_eq!(dispatcher.algorithm_kind(ShapeType::Sphere, ShapeType::Empty), AlgorithmKind::Empty);
    }

    #[test]
    fn register_overrides_both_orders() {
        let mut dispatcher = CollisionDispatcher::default();
        dispatcher.register_algorithm(ShapeType::Sphere, ShapeType::Cone, AlgorithmKind::Empty);
        assert_eq!(dispatcher.algorithm_kind(ShapeType::Cone, ShapeType::Sphere), AlgorithmKind::Empty);
    }

    #[test]
    fn resting_box_gets_full_manifold() {
        let info = DispatcherInfo::default();
        let small = CollisionShape::new_box(Vector3::repeat(1.0)).unwrap();
        let ground = CollisionShape::new_box(Vector3::new(10.0, 1.0, 10.0)).unwrap();
        let a = CollisionObject {
            shape: &small,
            transform: Transform::from_position(Vector3::new(0.0, 1.99, 0.0)),
            friction: 0.5,
            restitution: 0.0,
        };
        let b = CollisionObject {
            shape: &ground,
            transform: Transform::identity(),
            friction: 0.5,
            restitution: 0.0,
        };

        let mut algorithm = ConvexConvexAlgorithm::new(&info);
        let mut manifold = PersistentManifold::new(
            crate::core::BodyHandle::new(0, 0),
            crate::core::BodyHandle::new(1, 0),
            info.contact_breaking_threshold,
        );
        algorithm.process_collision(&a, &b, &mut manifold, &info);

        assert!(manifold.num_contacts() >= 2, "got {} contacts", manifold.num_contacts());
        for point in manifold.points() {
            assert!((point.normal_world_on_b - Vector3::y()).norm() < 1e-2);
            assert!(point.distance < 0.0 && point.distance > -0.05);
            assert!((point.combined_friction - 0.25).abs() < 1e-6);
        }
    }
}
