mod transform;
mod aabb;
mod ray;

pub use transform::Transform;
pub use aabb::Aabb;
pub use ray::Ray;

/// 3D vector used throughout the engine
pub type Vector3 = nalgebra::Vector3<f32>;

/// 3x3 matrix, used for orientation bases and inertia tensors
pub type Matrix3 = nalgebra::Matrix3<f32>;

/// Unit quaternion for orientations
pub type Quaternion = nalgebra::UnitQuaternion<f32>;

/// Constant for a very small number, used for comparisons
pub const EPSILON: f32 = 1.0e-6;

/// Squared epsilon, used when comparing squared lengths
pub const EPSILON_SQUARED: f32 = EPSILON * EPSILON;

/// Large value used in place of infinity for squared distances
pub const LARGE_FLOAT: f32 = 1.0e18;

/// Returns true if the two floating point values are approximately equal
#[inline]
pub fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

/// Returns true if the value is approximately zero
#[inline]
pub fn approx_zero(a: f32) -> bool {
    a.abs() < EPSILON
}

/// Returns true if every component is finite
#[inline]
pub fn is_finite(v: &Vector3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Builds two unit vectors that together with `n` form an orthonormal basis.
///
/// `n` is expected to be normalized. The choice of tangents is deterministic,
/// picking the construction that avoids the axis `n` is closest to.
pub fn plane_space(n: &Vector3) -> (Vector3, Vector3) {
    if n.z.abs() > std::f32::consts::FRAC_1_SQRT_2 {
        // choose p in y-z plane
        let a = n.y * n.y + n.z * n.z;
        let k = 1.0 / a.sqrt();
        let p = Vector3::new(0.0, -n.z * k, n.y * k);
        let q = Vector3::new(a * k, -n.x * p.z, n.x * p.y);
        (p, q)
    } else {
        // choose p in x-y plane
        let a = n.x * n.x + n.y * n.y;
        let k = 1.0 / a.sqrt();
        let p = Vector3::new(-n.y * k, n.x * k, 0.0);
        let q = Vector3::new(-n.z * p.y, n.z * p.x, a * k);
        (p, q)
    }
}

/// Component-wise absolute value of a matrix
#[inline]
pub fn abs_matrix(m: &Matrix3) -> Matrix3 {
    m.map(|v| v.abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plane_space_is_orthonormal() {
        for n in [
            Vector3::x(),
            Vector3::y(),
            Vector3::z(),
            Vector3::new(1.0, 2.0, 3.0).normalize(),
            Vector3::new(-0.3, 0.1, -0.9).normalize(),
        ] {
            let (p, q) = plane_space(&n);
            assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-5);
            assert_relative_eq!(p.dot(&n), 0.0, epsilon = 1e-5);
            assert_relative_eq!(q.dot(&n), 0.0, epsilon = 1e-5);
            assert_relative_eq!(p.dot(&q), 0.0, epsilon = 1e-5);
        }
    }
}
