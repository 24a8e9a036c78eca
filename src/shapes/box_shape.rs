use crate::math::{Vector3, Transform, EPSILON};
use crate::collision::RayCastResult;

/// A box (cuboid) described by its half extents.
///
/// The half extents are the outer dimensions and already include the
/// collision margin; the GJK core is the box shrunk by the margin.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxShape {
    /// The half-extents of the box (half-width, half-height, half-depth)
    half_extents: Vector3,
}

impl BoxShape {
    pub(crate) fn new(half_extents: Vector3) -> Self {
        Self { half_extents }
    }

    /// Returns the half-extents of the box
    pub fn half_extents(&self) -> Vector3 {
        self.half_extents
    }

    /// Returns the 8 corners of the box in local space
    pub fn vertices(&self) -> [Vector3; 8] {
        let h = self.half_extents;
        [
            Vector3::new(-h.x, -h.y, -h.z),
            Vector3::new(h.x, -h.y, -h.z),
            Vector3::new(h.x, h.y, -h.z),
            Vector3::new(-h.x, h.y, -h.z),
            Vector3::new(-h.x, -h.y, h.z),
            Vector3::new(h.x, -h.y, h.z),
            Vector3::new(h.x, h.y, h.z),
            Vector3::new(-h.x, h.y, h.z),
        ]
    }

    /// Support point of the box shrunk by `margin`
    pub(crate) fn support_without_margin(&self, direction: &Vector3, margin: f32) -> Vector3 {
        let core = self.half_extents - Vector3::repeat(margin);
        Vector3::new(
            if direction.x >= 0.0 { core.x } else { -core.x },
            if direction.y >= 0.0 { core.y } else { -core.y },
            if direction.z >= 0.0 { core.z } else { -core.z },
        )
    }

    /// Box inertia: `m/12 * (ly^2 + lz^2, lx^2 + lz^2, lx^2 + ly^2)`
    pub(crate) fn local_inertia(&self, mass: f32) -> Vector3 {
        box_inertia(&self.half_extents, mass)
    }

    /// Slab test of a segment against the box in world space
    pub(crate) fn ray_intersect(&self, transform: &Transform, from: &Vector3, to: &Vector3) -> Option<RayCastResult> {
        let origin = transform.inverse_transform_point(from);
        let direction = transform.inverse_transform_direction(&(to - from));

        let mut t_enter = 0.0f32;
        let mut t_exit = 1.0f32;
        let mut enter_axis = None;
        let mut enter_sign = 0.0;

        for axis in 0..3 {
            let extent = self.half_extents[axis];
            if direction[axis].abs() < EPSILON {
                if origin[axis] < -extent || origin[axis] > extent {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / direction[axis];
            let mut t1 = (-extent - origin[axis]) * inv;
            let mut t2 = (extent - origin[axis]) * inv;
            let mut sign = -1.0;
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
                sign = 1.0;
            }

            if t1 > t_enter {
                t_enter = t1;
                enter_axis = Some(axis);
                enter_sign = sign;
            }
            t_exit = t_exit.min(t2);
            if t_enter > t_exit {
                return None;
            }
        }

        // Starting inside the box reports a hit at the start, facing the ray.
        let local_normal = match enter_axis {
            Some(axis) => {
                let mut n = Vector3::zeros();
                n[axis] = enter_sign;
                n
            }
            None => {
                let len = direction.norm();
                if len < EPSILON {
                    return None;
                }
                -direction / len
            }
        };

        Some(RayCastResult {
            fraction: t_enter,
            normal: transform.transform_direction(&local_normal),
        })
    }
}

pub(crate) fn box_inertia(half_extents: &Vector3, mass: f32) -> Vector3 {
    let lx = 2.0 * half_extents.x;
    let ly = 2.0 * half_extents.y;
    let lz = 2.0 * half_extents.z;
    let factor = mass / 12.0;
    Vector3::new(
        factor * (ly * ly + lz * lz),
        factor * (lx * lx + lz * lz),
        factor * (lx * lx + ly * ly),
    )
}
