use crate::math::{Vector3, Matrix3, Quaternion};

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Rigid transformation in 3D space: a rotation followed by a translation.
///
/// Bodies never carry scale, so the basis is always orthonormal.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct Transform {
    /// Position of the local origin in world space
    pub position: Vector3,

    /// Orientation of the local frame
    pub rotation: Quaternion,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    /// Creates a new transform with the given position and rotation
    #[inline]
    pub fn new(position: Vector3, rotation: Quaternion) -> Self {
        Self { position, rotation }
    }

    /// Creates a new identity transform
    #[inline]
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: Quaternion::identity(),
        }
    }

    /// Creates a new transform from just a position
    #[inline]
    pub fn from_position(position: Vector3) -> Self {
        Self {
            position,
            rotation: Quaternion::identity(),
        }
    }

    /// Creates a transform from a position and a 3x3 basis given row by row.
    ///
    /// The basis does not need to be perfectly orthonormal; the closest
    /// rotation is extracted.
    pub fn from_basis(position: Vector3, basis: &Matrix3) -> Self {
        Self {
            position,
            rotation: Quaternion::from_matrix(basis),
        }
    }

    /// Returns the rotation as a 3x3 basis matrix
    #[inline]
    pub fn basis(&self) -> Matrix3 {
        *self.rotation.to_rotation_matrix().matrix()
    }

    /// Transforms a point from local to world space
    #[inline]
    pub fn transform_point(&self, point: &Vector3) -> Vector3 {
        self.rotation * point + self.position
    }

    /// Rotates a direction from local to world space
    #[inline]
    pub fn transform_direction(&self, direction: &Vector3) -> Vector3 {
        self.rotation * direction
    }

    /// Transforms a world space point into this local frame
    #[inline]
    pub fn inverse_transform_point(&self, point: &Vector3) -> Vector3 {
        self.rotation.inverse_transform_vector(&(point - self.position))
    }

    /// Rotates a world space direction into this local frame
    #[inline]
    pub fn inverse_transform_direction(&self, direction: &Vector3) -> Vector3 {
        self.rotation.inverse_transform_vector(direction)
    }

    /// Returns the inverse transform
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            position: -(rotation * self.position),
            rotation,
        }
    }

    /// Composes two transforms: the result applies `other` first, then `self`
    pub fn multiply(&self, other: &Self) -> Self {
        Self {
            position: self.transform_point(&other.position),
            rotation: self.rotation * other.rotation,
        }
    }

    /// Returns true if both position and rotation are finite
    pub fn is_finite(&self) -> bool {
        let q = self.rotation.quaternion();
        crate::math::is_finite(&self.position)
            && q.w.is_finite()
            && q.i.is_finite()
            && q.j.is_finite()
            && q.k.is_finite()
    }
}
