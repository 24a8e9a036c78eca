use crate::bodies::RigidBody;
use crate::constraints::JacobianEntry;
use crate::error::PhysicsError;
use crate::math::{Matrix3, Transform, Vector3};
use crate::Result;

/// Softness settings of a point-to-point constraint
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstraintSetting {
    /// Fraction of the positional error removed per solve, in (0, 1]
    pub tau: f32,

    /// Scale on the relative velocity removed per solve
    pub damping: f32,
}

impl Default for ConstraintSetting {
    fn default() -> Self {
        Self { tau: 0.3, damping: 1.0 }
    }
}

/// Softness used for interactive picking
pub const PICKING_TAU: f32 = 0.1;

/// Locks a pivot on body A to a pivot on body B, or to a fixed world point.
///
/// When there is no body B, `pivot_in_b` is a world space position.
#[derive(Debug, Clone)]
pub struct Point2PointConstraint {
    pivot_in_a: Vector3,
    pivot_in_b: Vector3,
    setting: ConstraintSetting,
    jac: [JacobianEntry; 3],
    applied_impulse: f32,
}

impl Point2PointConstraint {
    /// Creates a constraint with the default setting
    pub fn new(pivot_in_a: Vector3, pivot_in_b: Vector3) -> Self {
        Self {
            pivot_in_a,
            pivot_in_b,
            setting: ConstraintSetting::default(),
            jac: [JacobianEntry::default(); 3],
            applied_impulse: 0.0,
        }
    }

    /// Creates a constraint with explicit softness; `tau` is clamped into (0, 1]
    pub fn with_setting(pivot_in_a: Vector3, pivot_in_b: Vector3, setting: ConstraintSetting) -> Self {
        let mut p2p = Self::new(pivot_in_a, pivot_in_b);
        p2p.setting = ConstraintSetting {
            tau: setting.tau.clamp(f32::EPSILON, 1.0),
            damping: setting.damping.max(0.0),
        };
        p2p
    }

    /// Pivot in body A's local frame
    pub fn get_pivot_in_a(&self) -> Vector3 {
        self.pivot_in_a
    }

    /// Pivot in body B's local frame, or in world space
    pub fn get_pivot_in_b(&self) -> Vector3 {
        self.pivot_in_b
    }

    pub fn set_pivot_a(&mut self, pivot: Vector3) {
        self.pivot_in_a = pivot;
    }

    pub fn set_pivot_b(&mut self, pivot: Vector3) {
        self.pivot_in_b = pivot;
    }

    pub fn get_setting(&self) -> ConstraintSetting {
        self.setting
    }

    /// Sets the softness; `tau` must lie in (0, 1]
    pub fn set_tau(&mut self, tau: f32) -> Result<()> {
        if !(tau > 0.0 && tau <= 1.0) {
            return Err(PhysicsError::InvalidParameter(format!("tau must be in (0, 1], got {}", tau)));
        }
        self.setting.tau = tau;
        Ok(())
    }

    pub fn set_damping(&mut self, damping: f32) -> Result<()> {
        if !damping.is_finite() || damping < 0.0 {
            return Err(PhysicsError::InvalidParameter(format!(
                "damping must be finite and non-negative, got {}",
                damping
            )));
        }
        self.setting.damping = damping;
        Ok(())
    }

    /// Sum of the impulse magnitudes applied during the last step
    pub fn get_applied_impulse(&self) -> f32 {
        self.applied_impulse
    }

    /// World space positions of both pivots
    pub fn pivots_in_world(&self, a: &Transform, b: Option<&Transform>) -> (Vector3, Vector3) {
        let pivot_b = match b {
            Some(b) => b.transform_point(&self.pivot_in_b),
            None => self.pivot_in_b,
        };
        (a.transform_point(&self.pivot_in_a), pivot_b)
    }

    pub(crate) fn build_jacobian(&mut self, a: &RigidBody, b: Option<&RigidBody>) {
        self.applied_impulse = 0.0;
        let (pivot_a, pivot_b) = self.pivots_in_world(a.get_transform(), b.map(|b| b.get_transform()));
        let normals = [Vector3::x(), Vector3::y(), Vector3::z()];
        self.jac = linear_jacobians(&normals, &pivot_a, &pivot_b, a, b);
    }

    pub(crate) fn solve(&mut self, a: &mut RigidBody, b: Option<&mut RigidBody>, dt: f32) {
        let impulse = solve_linear(
            &self.jac,
            &self.pivot_in_a,
            &self.pivot_in_b,
            a,
            b,
            self.setting,
            dt,
        );
        self.applied_impulse += impulse;
    }
}

/// Position, inverse mass and world inverse inertia of an optional body
pub(super) fn body_properties(body: Option<&RigidBody>) -> (Transform, f32, Matrix3) {
    match body {
        Some(body) => (*body.get_transform(), body.get_inverse_mass(), *body.get_inv_inertia_tensor_world()),
        None => (Transform::identity(), 0.0, Matrix3::zeros()),
    }
}

pub(super) fn linear_jacobians(
    normals: &[Vector3; 3],
    pivot_a: &Vector3,
    pivot_b: &Vector3,
    a: &RigidBody,
    b: Option<&RigidBody>,
) -> [JacobianEntry; 3] {
    let (tr_b, inv_mass_b, inv_inertia_b) = body_properties(b);
    let rel_a = pivot_a - a.get_position();
    let rel_b = pivot_b - tr_b.position;
    normals.map(|normal| {
        JacobianEntry::new(
            &rel_a,
            &rel_b,
            &normal,
            a.get_inv_inertia_tensor_world(),
            a.get_inverse_mass(),
            &inv_inertia_b,
            inv_mass_b,
        )
    })
}

/// One pass over the three translational rows; returns the summed impulse magnitude
pub(super) fn solve_linear(
    jac: &[JacobianEntry; 3],
    pivot_in_a: &Vector3,
    pivot_in_b: &Vector3,
    a: &mut RigidBody,
    mut b: Option<&mut RigidBody>,
    setting: ConstraintSetting,
    dt: f32,
) -> f32 {
    let tr_a = *a.get_transform();
    let tr_b = b.as_deref().map_or(Transform::identity(), |b| *b.get_transform());
    let pivot_a = tr_a.transform_point(pivot_in_a);
    let pivot_b = tr_b.transform_point(pivot_in_b);
    let rel_a = pivot_a - tr_a.position;
    let rel_b = pivot_b - tr_b.position;

    let mut total = 0.0;
    for entry in jac {
        let normal = entry.linear_axis();
        let jac_diag_inv = entry.diagonal_inverse();

        let vel_a = a.get_velocity_in_local_point(&rel_a);
        let vel_b = b
            .as_deref()
            .map_or(Vector3::zeros(), |b| b.get_velocity_in_local_point(&rel_b));
        let rel_vel = normal.dot(&(vel_a - vel_b));

        let depth = -(pivot_a - pivot_b).dot(&normal);
        let impulse = depth * setting.tau / dt * jac_diag_inv - setting.damping * rel_vel * jac_diag_inv;
        let impulse_vector = normal * impulse;

        a.apply_solver_impulse(&impulse_vector, &rel_a);
        if let Some(b) = b.as_deref_mut() {
            b.apply_solver_impulse(&-impulse_vector, &rel_b);
        }
        total += impulse.abs();
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::CcdConstructionInfo;
    use crate::shapes::CollisionShape;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn sphere_at(position: Vector3) -> RigidBody {
        let shape = Arc::new(CollisionShape::new_sphere(0.5).unwrap());
        RigidBody::new(CcdConstructionInfo::new(1.0, shape, Transform::from_position(position))).unwrap()
    }

    #[test]
    fn rejects_out_of_range_tau() {
        let mut p2p = Point2PointConstraint::new(Vector3::zeros(), Vector3::zeros());
        assert!(p2p.set_tau(0.0).is_err());
        assert!(p2p.set_tau(1.5).is_err());
        assert!(p2p.set_tau(1.0).is_ok());
        assert_eq!(p2p.get_setting().tau, 1.0);
    }

    #[test]
    fn world_anchor_pulls_body_toward_pivot() {
        let mut body = sphere_at(Vector3::new(0.0, -1.0, 0.0));
        let mut p2p = Point2PointConstraint::new(Vector3::zeros(), Vector3::zeros());
        p2p.set_tau(1.0).unwrap();
        p2p.build_jacobian(&body, None);
        p2p.solve(&mut body, None, 0.5);

        // rigid tau removes the whole 1 unit error over dt = 0.5
        assert_relative_eq!(body.get_linear_velocity(), Vector3::new(0.0, 2.0, 0.0), epsilon = 1e-5);
        assert!(p2p.get_applied_impulse() > 0.0);
    }

    #[test]
    fn pair_impulses_cancel() {
        let mut a = sphere_at(Vector3::new(-1.0, 0.0, 0.0));
        let mut b = sphere_at(Vector3::new(1.0, 0.0, 0.0));
        let mut p2p = Point2PointConstraint::new(Vector3::zeros(), Vector3::zeros());
        p2p.build_jacobian(&a, Some(&b));
        p2p.solve(&mut a, Some(&mut b), 1.0 / 60.0);

        let momentum = a.get_linear_velocity() + b.get_linear_velocity();
        assert_relative_eq!(momentum, Vector3::zeros(), epsilon = 1e-4);
        assert!(a.get_linear_velocity().x > 0.0);
    }
}
