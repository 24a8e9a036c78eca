use std::fmt;
use std::sync::Arc;

use crate::bodies::{ActivationState, CcdConstructionInfo, MotionState};
use crate::collision::{CollisionFilter, ProxyHandle};
use crate::error::PhysicsError;
use crate::math::{is_finite, Matrix3, Quaternion, Transform, Vector3, EPSILON};
use crate::shapes::{CollisionShape, ShapeType};
use crate::Result;

/// Largest rotation, in radians, a body may turn through in one step
pub const MAX_ANGULAR_STEP: f32 = std::f32::consts::FRAC_PI_2;

/// A rigid body for physics simulation
pub struct RigidBody {
    /// The body's transform in world space
    transform: Transform,

    /// Transform at the start of the last kinematic update
    previous_transform: Transform,

    linear_velocity: Vector3,
    angular_velocity: Vector3,

    /// Zero for static and kinematic bodies
    inv_mass: f32,

    /// Diagonal inertia in body space
    local_inertia: Vector3,

    /// Component-wise inverse of `local_inertia`, zero where the inertia is zero
    inv_inertia_local: Vector3,

    /// R * diag(inv_inertia_local) * R^T
    inv_inertia_tensor_world: Matrix3,

    gravity: Vector3,
    gravity_override: bool,

    linear_damping: f32,
    angular_damping: f32,
    friction: f32,
    restitution: f32,

    activation_state: ActivationState,

    /// Time spent below the sleep thresholds
    deactivation_time: f32,

    shape: Arc<CollisionShape>,
    proxy: Option<ProxyHandle>,
    filter: CollisionFilter,
    motion_state: Option<Box<dyn MotionState>>,

    /// Forces accumulated for the next step
    total_force: Vector3,
    total_torque: Vector3,

    kinematic: bool,
}

impl fmt::Debug for RigidBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RigidBody")
            .field("transform", &self.transform)
            .field("linear_velocity", &self.linear_velocity)
            .field("angular_velocity", &self.angular_velocity)
            .field("inv_mass", &self.inv_mass)
            .field("activation_state", &self.activation_state)
            .field("shape_type", &self.shape.shape_type())
            .field("kinematic", &self.kinematic)
            .finish()
    }
}

fn check_non_negative(name: &str, value: f32) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(PhysicsError::InvalidParameter(format!(
            "{} must be finite and non-negative, got {}",
            name, value
        )));
    }
    Ok(())
}

impl RigidBody {
    /// Creates a body from its construction info.
    ///
    /// The motion state, if any, supplies the initial transform.
    pub fn new(info: CcdConstructionInfo) -> Result<Self> {
        check_non_negative("mass", info.mass)?;
        check_non_negative("linear damping", info.linear_damping)?;
        check_non_negative("angular damping", info.angular_damping)?;
        check_non_negative("friction", info.friction)?;
        check_non_negative("restitution", info.restitution)?;
        if let Some(inertia) = info.local_inertia {
            if !is_finite(&inertia) || inertia.min() < 0.0 {
                return Err(PhysicsError::InvalidParameter(format!(
                    "local inertia {:?} must be finite and non-negative",
                    inertia
                )));
            }
        }
        if let Some(gravity) = info.gravity {
            if !is_finite(&gravity) {
                return Err(PhysicsError::InvalidParameter("gravity must be finite".to_string()));
            }
        }

        let transform = match &info.motion_state {
            Some(state) => state.get_world_transform(),
            None => info.transform,
        };
        if !transform.is_finite() {
            return Err(PhysicsError::InvalidParameter(format!("transform {:?} is not finite", transform)));
        }

        let kinematic = info.kinematic;
        let mass = if kinematic { 0.0 } else { info.mass };
        let local_inertia = info
            .local_inertia
            .unwrap_or_else(|| info.collision_shape.calculate_local_inertia(mass));

        let filter = info.collision_filter.unwrap_or(if kinematic {
            CollisionFilter::kinematic()
        } else if mass == 0.0 {
            CollisionFilter::fixed()
        } else {
            CollisionFilter::dynamic()
        });

        let mut body = Self {
            transform,
            previous_transform: transform,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            inv_mass: 0.0,
            local_inertia: Vector3::zeros(),
            inv_inertia_local: Vector3::zeros(),
            inv_inertia_tensor_world: Matrix3::zeros(),
            gravity: info.gravity.unwrap_or_else(Vector3::zeros),
            gravity_override: info.gravity.is_some(),
            linear_damping: info.linear_damping,
            angular_damping: info.angular_damping,
            friction: info.friction,
            restitution: info.restitution,
            activation_state: if kinematic {
                ActivationState::DisableDeactivation
            } else {
                ActivationState::Active
            },
            deactivation_time: 0.0,
            shape: info.collision_shape,
            proxy: None,
            filter,
            motion_state: info.motion_state,
            total_force: Vector3::zeros(),
            total_torque: Vector3::zeros(),
            kinematic,
        };
        body.set_mass_props(mass, local_inertia);
        Ok(body)
    }

    /// Returns the body's transform
    pub fn get_transform(&self) -> &Transform {
        &self.transform
    }

    /// Moves the body and wakes it
    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.previous_transform = transform;
        self.update_inertia_tensor_world();
        self.activate();
    }

    /// Returns the body's position
    pub fn get_position(&self) -> Vector3 {
        self.transform.position
    }

    /// Returns the body's rotation
    pub fn get_rotation(&self) -> Quaternion {
        self.transform.rotation
    }

    /// Returns the body's linear velocity
    pub fn get_linear_velocity(&self) -> Vector3 {
        self.linear_velocity
    }

    /// Sets the linear velocity and wakes the body
    pub fn set_linear_velocity(&mut self, velocity: Vector3) {
        self.linear_velocity = velocity;
        self.activate();
    }

    /// Returns the body's angular velocity
    pub fn get_angular_velocity(&self) -> Vector3 {
        self.angular_velocity
    }

    /// Sets the angular velocity and wakes the body
    pub fn set_angular_velocity(&mut self, velocity: Vector3) {
        self.angular_velocity = velocity;
        self.activate();
    }

    /// Velocity of a point given relative to the center of mass
    pub fn get_velocity_in_local_point(&self, rel_pos: &Vector3) -> Vector3 {
        self.linear_velocity + self.angular_velocity.cross(rel_pos)
    }

    /// Returns the body's mass, zero for immovable bodies
    pub fn get_mass(&self) -> f32 {
        if self.inv_mass == 0.0 {
            0.0
        } else {
            1.0 / self.inv_mass
        }
    }

    /// Returns the inverse mass
    pub fn get_inverse_mass(&self) -> f32 {
        self.inv_mass
    }

    /// Diagonal inertia in body space
    pub fn get_local_inertia(&self) -> Vector3 {
        self.local_inertia
    }

    /// Inverse of the diagonal body space inertia
    pub fn get_inv_inertia_diag_local(&self) -> Vector3 {
        self.inv_inertia_local
    }

    /// Returns the inverse inertia tensor in world space
    pub fn get_inv_inertia_tensor_world(&self) -> &Matrix3 {
        &self.inv_inertia_tensor_world
    }

    /// Sets mass and diagonal inertia. Kinematic bodies keep a zero inverse mass.
    pub fn set_mass_props(&mut self, mass: f32, inertia: Vector3) {
        self.inv_mass = if mass == 0.0 || self.kinematic { 0.0 } else { 1.0 / mass };
        self.local_inertia = inertia;
        self.inv_inertia_local = if self.inv_mass == 0.0 {
            Vector3::zeros()
        } else {
            inertia.map(|i| if i != 0.0 { 1.0 / i } else { 0.0 })
        };
        self.update_inertia_tensor_world();
    }

    fn update_inertia_tensor_world(&mut self) {
        let basis = self.transform.basis();
        self.inv_inertia_tensor_world = basis * Matrix3::from_diagonal(&self.inv_inertia_local) * basis.transpose();
    }

    /// Gravity acting on this body
    pub fn get_gravity(&self) -> Vector3 {
        self.gravity
    }

    /// Returns true if the body's gravity ignores the world gravity
    pub fn has_gravity_override(&self) -> bool {
        self.gravity_override
    }

    /// Sets the body's own gravity, which then ignores world gravity changes
    pub fn set_gravity(&mut self, gravity: Vector3) {
        self.gravity = gravity;
        self.gravity_override = true;
    }

    pub(crate) fn set_world_gravity(&mut self, gravity: Vector3) {
        if !self.gravity_override {
            self.gravity = gravity;
        }
    }

    /// Sets linear and angular damping
    pub fn set_damping(&mut self, linear: f32, angular: f32) -> Result<()> {
        check_non_negative("linear damping", linear)?;
        check_non_negative("angular damping", angular)?;
        self.linear_damping = linear;
        self.angular_damping = angular;
        Ok(())
    }

    pub fn get_linear_damping(&self) -> f32 {
        self.linear_damping
    }

    pub fn get_angular_damping(&self) -> f32 {
        self.angular_damping
    }

    pub fn get_friction(&self) -> f32 {
        self.friction
    }

    pub fn set_friction(&mut self, friction: f32) {
        self.friction = friction;
    }

    pub fn get_restitution(&self) -> f32 {
        self.restitution
    }

    pub fn set_restitution(&mut self, restitution: f32) {
        self.restitution = restitution;
    }

    /// Returns true for bodies with zero inverse mass that are not kinematic
    pub fn is_static(&self) -> bool {
        self.inv_mass == 0.0 && !self.kinematic
    }

    /// Returns true for bodies moved by their motion state
    pub fn is_kinematic(&self) -> bool {
        self.kinematic
    }

    /// Returns true for static or kinematic bodies
    pub fn is_static_or_kinematic(&self) -> bool {
        self.inv_mass == 0.0
    }

    /// Returns true for bodies that respond to forces and impulses
    pub fn is_dynamic(&self) -> bool {
        self.inv_mass != 0.0
    }

    // activation

    /// Current sleep state
    pub fn get_activation_state(&self) -> ActivationState {
        self.activation_state
    }

    /// Changes the sleep state unless deactivation is disabled for this body
    pub fn set_activation_state(&mut self, state: ActivationState) {
        if self.activation_state != ActivationState::DisableDeactivation {
            self.activation_state = state;
        }
    }

    /// Changes the sleep state unconditionally
    pub fn force_activation_state(&mut self, state: ActivationState) {
        self.activation_state = state;
        if state == ActivationState::Active {
            self.deactivation_time = 0.0;
        }
    }

    /// Wakes the body and restarts its deactivation timer
    pub fn activate(&mut self) {
        if self.activation_state != ActivationState::DisableDeactivation {
            self.activation_state = ActivationState::Active;
            self.deactivation_time = 0.0;
        }
    }

    /// Returns true unless the body sleeps with its island
    pub fn is_active(&self) -> bool {
        self.activation_state.is_active()
    }

    /// Time the body has spent below the sleep thresholds
    pub fn get_deactivation_time(&self) -> f32 {
        self.deactivation_time
    }

    /// Advances the deactivation timer while the body is slow, resets it otherwise
    pub fn update_deactivation(&mut self, dt: f32, linear_threshold: f32, angular_threshold: f32) {
        if matches!(
            self.activation_state,
            ActivationState::IslandSleeping | ActivationState::DisableDeactivation
        ) {
            return;
        }

        if self.linear_velocity.norm_squared() < linear_threshold * linear_threshold
            && self.angular_velocity.norm_squared() < angular_threshold * angular_threshold
        {
            self.deactivation_time += dt;
        } else {
            self.deactivation_time = 0.0;
            self.set_activation_state(ActivationState::Active);
        }
    }

    /// Returns true if the body has been slow for longer than `deactivation_time`
    pub fn wants_sleeping(&self, deactivation_time: f32, deactivation_enabled: bool) -> bool {
        if self.activation_state == ActivationState::DisableDeactivation {
            return false;
        }
        if !deactivation_enabled || deactivation_time == 0.0 {
            return false;
        }
        if self.activation_state.is_sleepy() {
            return true;
        }
        self.deactivation_time > deactivation_time
    }

    pub(crate) fn put_to_sleep(&mut self) {
        self.activation_state = ActivationState::IslandSleeping;
        self.linear_velocity = Vector3::zeros();
        self.angular_velocity = Vector3::zeros();
    }

    // shape and broadphase

    /// The body's shared collision shape
    pub fn get_collision_shape(&self) -> &Arc<CollisionShape> {
        &self.shape
    }

    /// Replaces the shape and recomputes inertia; an empty shape keeps the old inertia
    pub(crate) fn set_collision_shape(&mut self, shape: Arc<CollisionShape>) {
        let mass = self.get_mass();
        let inertia = if shape.shape_type() == ShapeType::Empty {
            self.local_inertia
        } else {
            shape.calculate_local_inertia(mass)
        };
        self.shape = shape;
        self.set_mass_props(mass, inertia);
    }

    /// Broadphase proxy, once the body is in a world
    pub fn get_broadphase_handle(&self) -> Option<ProxyHandle> {
        self.proxy
    }

    pub(crate) fn set_broadphase_handle(&mut self, proxy: Option<ProxyHandle>) {
        self.proxy = proxy;
    }

    /// Broadphase group and mask
    pub fn get_collision_filter(&self) -> CollisionFilter {
        self.filter
    }

    // motion state

    pub fn motion_state(&self) -> Option<&dyn MotionState> {
        self.motion_state.as_deref()
    }

    pub fn motion_state_mut(&mut self) -> Option<&mut (dyn MotionState + 'static)> {
        self.motion_state.as_deref_mut()
    }

    /// Pushes the current transform to the motion state
    pub(crate) fn sync_motion_state(&mut self) {
        if let Some(state) = self.motion_state.as_mut() {
            state.set_world_transform(&self.transform);
        }
    }

    /// Pulls a kinematic body's transform from its motion state and derives
    /// the velocities that moved it there.
    pub(crate) fn update_kinematic(&mut self, dt: f32) {
        let Some(state) = self.motion_state.as_ref() else {
            return;
        };
        let target = state.get_world_transform();
        self.previous_transform = self.transform;
        self.transform = target;

        if dt > 0.0 {
            self.linear_velocity = (target.position - self.previous_transform.position) / dt;
            let delta = target.rotation * self.previous_transform.rotation.inverse();
            self.angular_velocity = delta.scaled_axis() / dt;
        }
        self.update_inertia_tensor_world();
    }

    // forces and impulses

    /// Adds a force through the center of mass for the next step
    pub fn apply_central_force(&mut self, force: Vector3) {
        self.total_force += force;
        self.activate();
    }

    /// Adds a force at a point relative to the center of mass
    pub fn apply_force(&mut self, force: Vector3, rel_pos: Vector3) {
        self.total_force += force;
        self.total_torque += rel_pos.cross(&force);
        self.activate();
    }

    /// Adds a torque for the next step
    pub fn apply_torque(&mut self, torque: Vector3) {
        self.total_torque += torque;
        self.activate();
    }

    /// Clears accumulated forces and torques
    pub fn clear_forces(&mut self) {
        self.total_force = Vector3::zeros();
        self.total_torque = Vector3::zeros();
    }

    /// Applies an impulse through the center of mass and wakes the body
    pub fn apply_central_impulse(&mut self, impulse: Vector3) {
        self.linear_velocity += impulse * self.inv_mass;
        self.activate();
    }

    /// Applies an impulse at a point relative to the center of mass and wakes the body
    pub fn apply_impulse(&mut self, impulse: Vector3, rel_pos: Vector3) {
        self.apply_solver_impulse(&impulse, &rel_pos);
        self.activate();
    }

    /// Applies an angular impulse and wakes the body
    pub fn apply_torque_impulse(&mut self, torque: Vector3) {
        self.angular_velocity += self.inv_inertia_tensor_world * torque;
        self.activate();
    }

    /// Impulse application used inside the solver; does not touch activation
    #[inline]
    pub(crate) fn apply_solver_impulse(&mut self, impulse: &Vector3, rel_pos: &Vector3) {
        if self.inv_mass == 0.0 {
            return;
        }
        self.linear_velocity += impulse * self.inv_mass;
        self.angular_velocity += self.inv_inertia_tensor_world * rel_pos.cross(impulse);
    }

    #[inline]
    pub(crate) fn apply_solver_angular_impulse(&mut self, torque: &Vector3) {
        if self.inv_mass == 0.0 {
            return;
        }
        self.angular_velocity += self.inv_inertia_tensor_world * torque;
    }

    // integration

    /// Adds gravity and accumulated forces to the velocities, then clears the forces
    pub(crate) fn integrate_velocities(&mut self, dt: f32) {
        if !self.is_dynamic() {
            return;
        }
        self.linear_velocity += (self.gravity + self.total_force * self.inv_mass) * dt;
        self.angular_velocity += self.inv_inertia_tensor_world * self.total_torque * dt;
        self.clear_forces();

        // keep the per-step rotation below a quarter turn
        let angvel = self.angular_velocity.norm();
        if angvel * dt > MAX_ANGULAR_STEP {
            self.angular_velocity *= MAX_ANGULAR_STEP / dt / angvel;
        }
    }

    /// Scales the velocities by `1 - dt * damping`, clamped to `[0, 1]`
    pub(crate) fn apply_damping(&mut self, dt: f32) {
        self.linear_velocity *= (1.0 - dt * self.linear_damping).clamp(0.0, 1.0);
        self.angular_velocity *= (1.0 - dt * self.angular_damping).clamp(0.0, 1.0);
    }

    /// Transform the body would reach after `dt` at its current velocities
    pub fn predict_integrated_transform(&self, dt: f32) -> Transform {
        let position = self.transform.position + self.linear_velocity * dt;
        let spin = self.angular_velocity * dt;
        let rotation = if spin.norm_squared() > EPSILON * EPSILON {
            Quaternion::from_scaled_axis(spin) * self.transform.rotation
        } else {
            self.transform.rotation
        };
        Transform::new(position, rotation)
    }

    /// Advances the transform by `dt`
    pub(crate) fn integrate_transform(&mut self, dt: f32) {
        if !self.is_dynamic() {
            return;
        }
        let predicted = self.predict_integrated_transform(dt);
        self.proceed_to_transform(predicted);
    }

    /// Jumps to `transform` without waking the body
    pub fn proceed_to_transform(&mut self, transform: Transform) {
        self.transform = transform;
        self.update_inertia_tensor_world();
    }

    /// Returns true if every state vector is finite
    pub fn is_finite(&self) -> bool {
        self.transform.is_finite() && is_finite(&self.linear_velocity) && is_finite(&self.angular_velocity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box(mass: f32) -> RigidBody {
        let shape = Arc::new(CollisionShape::new_box(Vector3::repeat(1.0)).unwrap());
        RigidBody::new(CcdConstructionInfo::new(mass, shape, Transform::identity())).unwrap()
    }

    #[test]
    fn rejects_negative_mass() {
        let info = CcdConstructionInfo {
            mass: -1.0,
            ..Default::default()
        };
        assert!(matches!(RigidBody::new(info), Err(PhysicsError::InvalidParameter(_))));
    }

    #[test]
    fn impulse_changes_velocities() {
        let mut body = unit_box(2.0);
        body.apply_impulse(Vector3::new(0.0, 0.0, 2.0), Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(body.get_linear_velocity(), Vector3::new(0.0, 0.0, 1.0));
        // r x J = (0, -2, 0), inertia of a 2 kg unit box is 4/3
        assert_relative_eq!(body.get_angular_velocity(), Vector3::new(0.0, -1.5, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn static_body_ignores_impulses() {
        let mut body = unit_box(0.0);
        assert!(body.is_static());
        body.apply_impulse(Vector3::new(10.0, 0.0, 0.0), Vector3::y());
        assert_eq!(body.get_linear_velocity(), Vector3::zeros());
        assert_eq!(body.get_angular_velocity(), Vector3::zeros());
    }

    #[test]
    fn deactivation_timer() {
        let mut body = unit_box(1.0);
        body.update_deactivation(0.5, 0.8, 1.0);
        body.update_deactivation(0.5, 0.8, 1.0);
        assert_relative_eq!(body.get_deactivation_time(), 1.0);
        assert!(!body.wants_sleeping(2.0, true));
        body.update_deactivation(1.5, 0.8, 1.0);
        assert!(body.wants_sleeping(2.0, true));
        assert!(!body.wants_sleeping(2.0, false));

        body.set_linear_velocity(Vector3::new(2.0, 0.0, 0.0));
        body.update_deactivation(0.5, 0.8, 1.0);
        assert_eq!(body.get_deactivation_time(), 0.0);
    }

    #[test]
    fn disable_deactivation_is_sticky() {
        let mut body = unit_box(1.0);
        body.force_activation_state(ActivationState::DisableDeactivation);
        body.set_activation_state(ActivationState::IslandSleeping);
        assert_eq!(body.get_activation_state(), ActivationState::DisableDeactivation);
        body.activate();
        assert_eq!(body.get_activation_state(), ActivationState::DisableDeactivation);
        body.force_activation_state(ActivationState::Active);
        assert_eq!(body.get_activation_state(), ActivationState::Active);
    }

    #[test]
    fn damping_scales_velocity() {
        let mut body = unit_box(1.0);
        body.set_damping(0.5, 0.0).unwrap();
        body.set_linear_velocity(Vector3::new(10.0, 0.0, 0.0));
        body.apply_damping(0.1);
        assert_relative_eq!(body.get_linear_velocity().x, 9.5, epsilon = 1e-5);
    }

    #[test]
    fn integrates_rotation() {
        let mut body = unit_box(1.0);
        body.set_angular_velocity(Vector3::new(0.0, 1.0, 0.0));
        body.integrate_transform(0.5);
        let (_, angle) = body.get_rotation().axis_angle().unwrap();
        assert_relative_eq!(angle, 0.5, epsilon = 1e-5);
    }
}
