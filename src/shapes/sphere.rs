use crate::math::{Vector3, Transform, EPSILON};
use crate::collision::RayCastResult;

/// A sphere. For GJK it is a single point whose margin is the radius.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereShape {
    radius: f32,
}

impl SphereShape {
    pub(crate) fn new(radius: f32) -> Self {
        Self { radius }
    }

    /// Returns the radius of the sphere
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Solid sphere inertia, `2/5 m r^2` about every axis
    pub(crate) fn local_inertia(&self, mass: f32) -> Vector3 {
        Vector3::repeat(0.4 * mass * self.radius * self.radius)
    }

    pub(crate) fn ray_intersect(&self, transform: &Transform, from: &Vector3, to: &Vector3) -> Option<RayCastResult> {
        let d = to - from;
        let m = from - transform.position;
        let a = d.norm_squared();
        if a < EPSILON {
            return None;
        }

        let b = m.dot(&d);
        let c = m.norm_squared() - self.radius * self.radius;

        if c <= 0.0 {
            // Start point is inside.
            return Some(RayCastResult {
                fraction: 0.0,
                normal: -d / a.sqrt(),
            });
        }
        if b > 0.0 {
            return None;
        }

        let discriminant = b * b - a * c;
        if discriminant < 0.0 {
            return None;
        }

        let t = (-b - discriminant.sqrt()) / a;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }

        let hit = from + d * t;
        Some(RayCastResult {
            fraction: t,
            normal: (hit - transform.position) / self.radius,
        })
    }
}
