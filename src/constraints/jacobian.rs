use crate::math::{Matrix3, Vector3};

/// One row of a constraint Jacobian between two bodies.
///
/// Stores the angular components for both bodies and the effective mass
/// diagonal along the constrained direction.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct JacobianEntry {
    linear_joint_axis: Vector3,
    a_j: Vector3,
    b_j: Vector3,
    minv_jt_a: Vector3,
    minv_jt_b: Vector3,
    a_diag: f32,
}

impl JacobianEntry {
    /// Linear row: relative motion of two points along `axis`
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rel_pos_a: &Vector3,
        rel_pos_b: &Vector3,
        axis: &Vector3,
        inv_inertia_a: &Matrix3,
        inv_mass_a: f32,
        inv_inertia_b: &Matrix3,
        inv_mass_b: f32,
    ) -> Self {
        let a_j = rel_pos_a.cross(axis);
        let b_j = rel_pos_b.cross(&-axis);
        let minv_jt_a = inv_inertia_a * a_j;
        let minv_jt_b = inv_inertia_b * b_j;
        let a_diag = inv_mass_a + minv_jt_a.dot(&a_j) + inv_mass_b + minv_jt_b.dot(&b_j);
        Self {
            linear_joint_axis: *axis,
            a_j,
            b_j,
            minv_jt_a,
            minv_jt_b,
            a_diag,
        }
    }

    /// Angular row: relative rotation about `axis`
    pub fn new_angular(axis: &Vector3, inv_inertia_a: &Matrix3, inv_inertia_b: &Matrix3) -> Self {
        let a_j = *axis;
        let b_j = -axis;
        let minv_jt_a = inv_inertia_a * a_j;
        let minv_jt_b = inv_inertia_b * b_j;
        let a_diag = minv_jt_a.dot(&a_j) + minv_jt_b.dot(&b_j);
        Self {
            linear_joint_axis: Vector3::zeros(),
            a_j,
            b_j,
            minv_jt_a,
            minv_jt_b,
            a_diag,
        }
    }

    /// Constrained direction of a linear row
    pub fn linear_axis(&self) -> Vector3 {
        self.linear_joint_axis
    }

    /// Effective inverse mass along the row
    pub fn get_diagonal(&self) -> f32 {
        self.a_diag
    }

    /// Inverse of the diagonal, zero when both bodies are immovable along the row
    pub fn diagonal_inverse(&self) -> f32 {
        if self.a_diag > f32::EPSILON {
            1.0 / self.a_diag
        } else {
            0.0
        }
    }

    /// Relative velocity along the row
    pub fn get_relative_velocity(
        &self,
        linvel_a: &Vector3,
        angvel_a: &Vector3,
        linvel_b: &Vector3,
        angvel_b: &Vector3,
    ) -> f32 {
        self.linear_joint_axis.dot(&(linvel_a - linvel_b)) + angvel_a.dot(&self.a_j) + angvel_b.dot(&self.b_j)
    }

    /// Angular response of body A to a unit impulse along the row
    pub fn minv_jt_a(&self) -> Vector3 {
        self.minv_jt_a
    }

    /// Angular response of body B to a unit impulse along the row
    pub fn minv_jt_b(&self) -> Vector3 {
        self.minv_jt_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn point_masses_sum() {
        let zero = Matrix3::zeros();
        let jac = JacobianEntry::new(&Vector3::zeros(), &Vector3::zeros(), &Vector3::x(), &zero, 0.5, &zero, 0.25);
        assert_relative_eq!(jac.get_diagonal(), 0.75);
        assert_relative_eq!(jac.diagonal_inverse(), 1.0 / 0.75);
    }

    #[test]
    fn lever_arm_adds_rotation() {
        let inv_i = Matrix3::identity() * 2.0;
        let zero = Matrix3::zeros();
        let jac = JacobianEntry::new(&Vector3::y(), &Vector3::zeros(), &Vector3::x(), &inv_i, 1.0, &zero, 0.0);
        // (r x n) = -z, |.|^2 * 2 = 2
        assert_relative_eq!(jac.get_diagonal(), 3.0);
        let rel = jac.get_relative_velocity(&Vector3::zeros(), &Vector3::new(0.0, 0.0, -1.0), &Vector3::zeros(), &Vector3::zeros());
        assert_relative_eq!(rel, 1.0);
    }

    #[test]
    fn angular_row_uses_both_inertias() {
        let jac = JacobianEntry::new_angular(&Vector3::z(), &Matrix3::identity(), &(Matrix3::identity() * 3.0));
        assert_relative_eq!(jac.get_diagonal(), 4.0);
    }
}
