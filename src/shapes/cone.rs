use crate::math::{Vector3, EPSILON};

/// A cone around the local Y axis, apex at `+height / 2`
#[derive(Debug, Clone, PartialEq)]
pub struct ConeShape {
    radius: f32,
    height: f32,
    sin_angle: f32,
}

impl ConeShape {
    pub(crate) fn new(radius: f32, height: f32) -> Self {
        Self {
            radius,
            height,
            sin_angle: radius / (radius * radius + height * height).sqrt(),
        }
    }

    /// Radius of the base
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Height from base to apex
    pub fn height(&self) -> f32 {
        self.height
    }

    pub(crate) fn support_without_margin(&self, direction: &Vector3) -> Vector3 {
        let half_height = 0.5 * self.height;

        if direction.y > direction.norm() * self.sin_angle {
            return Vector3::new(0.0, half_height, 0.0);
        }

        let s = (direction.x * direction.x + direction.z * direction.z).sqrt();
        if s > EPSILON {
            let d = self.radius / s;
            Vector3::new(direction.x * d, -half_height, direction.z * d)
        } else {
            Vector3::new(0.0, -half_height, 0.0)
        }
    }
}
