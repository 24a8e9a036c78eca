use crate::math::Vector3;

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Ray segment used for ray tests. `point_at(0)` is the start, `point_at(1)` the end.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Ray {
    /// Origin of the ray
    pub origin: Vector3,

    /// Direction of the ray, scaled to the segment length
    pub direction: Vector3,
}

impl Ray {
    /// Creates a new ray with the given origin and direction
    #[inline]
    pub fn new(origin: Vector3, direction: Vector3) -> Self {
        Self { origin, direction }
    }

    /// Creates the ray running from `from` to `to`
    #[inline]
    pub fn from_points(from: Vector3, to: Vector3) -> Self {
        Self {
            origin: from,
            direction: to - from,
        }
    }

    /// Returns the point at parameter `t` along the ray
    #[inline]
    pub fn point_at(&self, t: f32) -> Vector3 {
        self.origin + self.direction * t
    }

    /// Returns the end point of the segment
    #[inline]
    pub fn end(&self) -> Vector3 {
        self.origin + self.direction
    }
}
