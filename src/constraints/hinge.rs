use crate::bodies::RigidBody;
use crate::constraints::point_to_point::{body_properties, linear_jacobians, solve_linear};
use crate::constraints::{ConstraintSetting, JacobianEntry};
use crate::error::PhysicsError;
use crate::math::{plane_space, Transform, Vector3, EPSILON};
use crate::Result;

const MIN_CORRECTION: f32 = 1e-5;

/// Angle range a hinge may turn through, in radians
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HingeLimit {
    pub low: f32,
    pub high: f32,

    /// Fraction of the limit violation corrected per solve
    pub bias_factor: f32,
}

/// A hinge (revolute) constraint that allows rotation around a single axis.
///
/// Pivots and axes are given in each body's local frame. Without a body B
/// they are world space values.
#[derive(Debug, Clone)]
pub struct HingeConstraint {
    pivot_in_a: Vector3,
    pivot_in_b: Vector3,
    axis_in_a: Vector3,
    axis_in_b: Vector3,

    /// Perpendicular reference axes; the hinge angle is measured between them
    ref_in_a: Vector3,
    ref_in_b: Vector3,

    jac: [JacobianEntry; 3],
    limit: Option<HingeLimit>,
    limit_impulse: f32,
    applied_impulse: f32,
}

fn normalized_axis(axis: &Vector3) -> Result<Vector3> {
    let length = axis.norm();
    if !length.is_finite() || length < EPSILON {
        return Err(PhysicsError::InvalidParameter(format!("hinge axis {:?} must be non-zero", axis)));
    }
    Ok(axis / length)
}

impl HingeConstraint {
    /// Creates a hinge; both axes must be non-zero
    pub fn new(pivot_in_a: Vector3, pivot_in_b: Vector3, axis_in_a: Vector3, axis_in_b: Vector3) -> Result<Self> {
        let axis_in_a = normalized_axis(&axis_in_a)?;
        let axis_in_b = normalized_axis(&axis_in_b)?;
        Ok(Self {
            pivot_in_a,
            pivot_in_b,
            axis_in_a,
            axis_in_b,
            ref_in_a: plane_space(&axis_in_a).0,
            ref_in_b: plane_space(&axis_in_b).0,
            jac: [JacobianEntry::default(); 3],
            limit: None,
            limit_impulse: 0.0,
            applied_impulse: 0.0,
        })
    }

    pub fn get_pivot_in_a(&self) -> Vector3 {
        self.pivot_in_a
    }

    pub fn get_pivot_in_b(&self) -> Vector3 {
        self.pivot_in_b
    }

    pub fn get_axis_in_a(&self) -> Vector3 {
        self.axis_in_a
    }

    pub fn get_axis_in_b(&self) -> Vector3 {
        self.axis_in_b
    }

    /// Makes the current relative orientation the zero angle
    pub(crate) fn calibrate(&mut self, a: &Transform, b: &Transform) {
        let reference = a.transform_direction(&self.ref_in_a);
        self.ref_in_b = b.inverse_transform_direction(&reference);
    }

    /// Restricts the hinge angle to `[low, high]`
    pub fn set_limit(&mut self, low: f32, high: f32) -> Result<()> {
        if !low.is_finite() || !high.is_finite() || low > high {
            return Err(PhysicsError::InvalidParameter(format!(
                "hinge limit [{}, {}] is not a valid range",
                low, high
            )));
        }
        self.limit = Some(HingeLimit {
            low,
            high,
            bias_factor: ConstraintSetting::default().tau,
        });
        Ok(())
    }

    pub fn clear_limit(&mut self) {
        self.limit = None;
        self.limit_impulse = 0.0;
    }

    pub fn get_limit(&self) -> Option<HingeLimit> {
        self.limit
    }

    pub fn get_applied_impulse(&self) -> f32 {
        self.applied_impulse
    }

    /// Rotation of B relative to A about the hinge axis
    pub fn get_hinge_angle(&self, a: &Transform, b: &Transform) -> f32 {
        let axis = a.transform_direction(&self.axis_in_a);
        let ref_a = a.transform_direction(&self.ref_in_a);
        let ref_b = b.transform_direction(&self.ref_in_b);
        axis.dot(&ref_a.cross(&ref_b)).atan2(ref_a.dot(&ref_b))
    }

    /// World space positions of both pivots
    pub fn pivots_in_world(&self, a: &Transform, b: Option<&Transform>) -> (Vector3, Vector3) {
        let pivot_b = match b {
            Some(b) => b.transform_point(&self.pivot_in_b),
            None => self.pivot_in_b,
        };
        (a.transform_point(&self.pivot_in_a), pivot_b)
    }

    /// World space hinge axis as seen from body A
    pub fn axis_in_world(&self, a: &Transform) -> Vector3 {
        a.transform_direction(&self.axis_in_a)
    }

    pub(crate) fn build_jacobian(&mut self, a: &RigidBody, b: Option<&RigidBody>) {
        self.applied_impulse = 0.0;
        self.limit_impulse = 0.0;

        let (pivot_a, pivot_b) = self.pivots_in_world(a.get_transform(), b.map(|b| b.get_transform()));
        let rel = pivot_b - pivot_a;
        let first = if rel.norm_squared() > EPSILON * EPSILON {
            rel.normalize()
        } else {
            Vector3::x()
        };
        let (second, third) = plane_space(&first);
        self.jac = linear_jacobians(&[first, second, third], &pivot_a, &pivot_b, a, b);
    }

    pub(crate) fn solve(&mut self, a: &mut RigidBody, mut b: Option<&mut RigidBody>, dt: f32) {
        let setting = ConstraintSetting {
            damping: 1.0,
            ..ConstraintSetting::default()
        };
        self.applied_impulse += solve_linear(
            &self.jac,
            &self.pivot_in_a,
            &self.pivot_in_b,
            a,
            b.as_deref_mut(),
            setting,
            dt,
        );

        let (tr_b, _, inv_inertia_b) = body_properties(b.as_deref());
        let tr_a = *a.get_transform();
        let inv_inertia_a = *a.get_inv_inertia_tensor_world();
        let axis_a = tr_a.transform_direction(&self.axis_in_a);
        let axis_b = tr_b.transform_direction(&self.axis_in_b);

        let ang_vel_a = a.get_angular_velocity();
        let ang_vel_b = b.as_deref().map_or(Vector3::zeros(), |b| b.get_angular_velocity());

        // kill relative rotation orthogonal to the hinge axis
        let orthog_a = ang_vel_a - axis_a * axis_a.dot(&ang_vel_a);
        let orthog_b = ang_vel_b - axis_b * axis_b.dot(&ang_vel_b);
        let mut vel_rel_orthog = orthog_a - orthog_b;
        let length = vel_rel_orthog.norm();
        if length > MIN_CORRECTION {
            let normal = vel_rel_orthog / length;
            let denom = JacobianEntry::new_angular(&normal, &inv_inertia_a, &inv_inertia_b).get_diagonal();
            vel_rel_orthog = if denom > EPSILON { vel_rel_orthog / denom } else { Vector3::zeros() };
        }

        // drift of the axes apart
        let mut angular_error = axis_a.cross(&axis_b) / dt;
        let error_length = angular_error.norm();
        if error_length > MIN_CORRECTION {
            let normal = angular_error / error_length;
            let denom = JacobianEntry::new_angular(&normal, &inv_inertia_a, &inv_inertia_b).get_diagonal();
            angular_error = if denom > EPSILON { angular_error / denom } else { Vector3::zeros() };
        }

        let torque = angular_error - vel_rel_orthog;
        a.apply_solver_angular_impulse(&torque);
        if let Some(b) = b.as_deref_mut() {
            b.apply_solver_angular_impulse(&-torque);
        }
        self.applied_impulse += torque.norm();

        if let Some(limit) = self.limit {
            self.solve_limit(&limit, a, b, &tr_b, dt);
        }
    }

    fn solve_limit(&mut self, limit: &HingeLimit, a: &mut RigidBody, mut b: Option<&mut RigidBody>, tr_b: &Transform, dt: f32) {
        let tr_a = *a.get_transform();
        let angle = self.get_hinge_angle(&tr_a, tr_b);

        // sign is the direction B has to turn relative to A
        let (error, sign) = if angle < limit.low {
            (limit.low - angle, 1.0)
        } else if angle > limit.high {
            (angle - limit.high, -1.0)
        } else {
            self.limit_impulse = 0.0;
            return;
        };

        let axis = tr_a.transform_direction(&self.axis_in_a);
        let (_, _, inv_inertia_b) = body_properties(b.as_deref());
        let denom = JacobianEntry::new_angular(&axis, a.get_inv_inertia_tensor_world(), &inv_inertia_b).get_diagonal();
        if denom <= EPSILON {
            return;
        }

        let ang_vel_b = b.as_deref().map_or(Vector3::zeros(), |b| b.get_angular_velocity());
        let rate = (ang_vel_b - a.get_angular_velocity()).dot(&axis) * sign;
        let lambda = (limit.bias_factor * error / dt - rate) / denom;

        let old = self.limit_impulse;
        self.limit_impulse = (old + lambda).max(0.0);
        let torque = axis * ((self.limit_impulse - old) * sign);

        a.apply_solver_angular_impulse(&-torque);
        if let Some(b) = b.as_deref_mut() {
            b.apply_solver_angular_impulse(&torque);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bodies::CcdConstructionInfo;
    use crate::math::Quaternion;
    use crate::shapes::CollisionShape;
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn unit_box(transform: Transform) -> RigidBody {
        let shape = Arc::new(CollisionShape::new_box(Vector3::repeat(0.5)).unwrap());
        RigidBody::new(CcdConstructionInfo::new(1.0, shape, transform)).unwrap()
    }

    #[test]
    fn rejects_zero_axis() {
        assert!(HingeConstraint::new(Vector3::zeros(), Vector3::zeros(), Vector3::zeros(), Vector3::z()).is_err());
    }

    #[test]
    fn angle_follows_rotation_about_axis() {
        let mut hinge = HingeConstraint::new(Vector3::zeros(), Vector3::zeros(), Vector3::z(), Vector3::z()).unwrap();
        let a = Transform::identity();
        hinge.calibrate(&a, &a);
        assert_relative_eq!(hinge.get_hinge_angle(&a, &a), 0.0, epsilon = 1e-6);

        let turned = Transform::new(Vector3::zeros(), Quaternion::from_scaled_axis(Vector3::z() * 0.5));
        assert_relative_eq!(hinge.get_hinge_angle(&a, &turned), 0.5, epsilon = 1e-5);
    }

    #[test]
    fn removes_off_axis_spin() {
        let mut body = unit_box(Transform::identity());
        body.set_angular_velocity(Vector3::new(1.0, 0.0, 2.0));
        let mut hinge = HingeConstraint::new(Vector3::zeros(), Vector3::zeros(), Vector3::z(), Vector3::z()).unwrap();
        hinge.build_jacobian(&body, None);
        hinge.solve(&mut body, None, 1.0 / 60.0);

        let spin = body.get_angular_velocity();
        assert_relative_eq!(spin.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(spin.z, 2.0, epsilon = 1e-4);
    }

    #[test]
    fn limit_stops_rotation() {
        let mut body = unit_box(Transform::identity());
        let mut hinge = HingeConstraint::new(Vector3::zeros(), Vector3::zeros(), Vector3::z(), Vector3::z()).unwrap();
        hinge.calibrate(body.get_transform(), &Transform::identity());
        hinge.set_limit(-0.1, 0.1).unwrap();
        assert!(hinge.set_limit(1.0, -1.0).is_err());

        // A is the body, so B (the world) turns negatively relative to it
        body.proceed_to_transform(Transform::new(Vector3::zeros(), Quaternion::from_scaled_axis(Vector3::z() * 0.3)));
        body.set_angular_velocity(Vector3::new(0.0, 0.0, 1.0));
        hinge.build_jacobian(&body, None);
        hinge.solve(&mut body, None, 1.0 / 60.0);

        assert!(hinge.get_hinge_angle(body.get_transform(), &Transform::identity()) < -0.1);
        assert!(body.get_angular_velocity().z < 0.0);
    }
}
