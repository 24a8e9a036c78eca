use std::fmt;
use std::sync::Arc;

use crate::bodies::MotionState;
use crate::collision::CollisionFilter;
use crate::math::{Transform, Vector3};
use crate::shapes::CollisionShape;

/// Everything needed to create a rigid body.
///
/// A mass of zero makes the body static, or kinematic when `kinematic` is set.
pub struct CcdConstructionInfo {
    /// Mass in kilograms; zero for immovable bodies
    pub mass: f32,

    /// Coulomb friction coefficient
    pub friction: f32,

    /// Bounciness, combined multiplicatively with the other body
    pub restitution: f32,

    /// Fraction of linear velocity removed per second
    pub linear_damping: f32,

    /// Fraction of angular velocity removed per second
    pub angular_damping: f32,

    /// Diagonal body space inertia; computed from the shape when `None`
    pub local_inertia: Option<Vector3>,

    /// Shared, read-only collision shape
    pub collision_shape: Arc<CollisionShape>,

    /// Per-body gravity that ignores the world gravity when set
    pub gravity: Option<Vector3>,

    /// Scene link; its transform overrides `transform` when present
    pub motion_state: Option<Box<dyn MotionState>>,

    /// Initial world transform
    pub transform: Transform,

    /// Body is moved by its motion state instead of by the simulation
    pub kinematic: bool,

    /// Broadphase group and mask; derived from the body kind when `None`
    pub collision_filter: Option<CollisionFilter>,
}

impl Default for CcdConstructionInfo {
    fn default() -> Self {
        Self {
            mass: 0.0,
            friction: 0.5,
            restitution: 0.1,
            linear_damping: 0.1,
            angular_damping: 0.1,
            local_inertia: None,
            collision_shape: Arc::new(CollisionShape::empty()),
            gravity: None,
            motion_state: None,
            transform: Transform::identity(),
            kinematic: false,
            collision_filter: None,
        }
    }
}

impl fmt::Debug for CcdConstructionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CcdConstructionInfo")
            .field("mass", &self.mass)
            .field("friction", &self.friction)
            .field("restitution", &self.restitution)
            .field("linear_damping", &self.linear_damping)
            .field("angular_damping", &self.angular_damping)
            .field("local_inertia", &self.local_inertia)
            .field("shape_type", &self.collision_shape.shape_type())
            .field("gravity", &self.gravity)
            .field("has_motion_state", &self.motion_state.is_some())
            .field("transform", &self.transform)
            .field("kinematic", &self.kinematic)
            .finish()
    }
}

impl CcdConstructionInfo {
    /// Creates info for a body with the given mass and shape at `transform`
    pub fn new(mass: f32, collision_shape: Arc<CollisionShape>, transform: Transform) -> Self {
        Self {
            mass,
            collision_shape,
            transform,
            ..Default::default()
        }
    }

    /// Creates info for an immovable body
    pub fn fixed(collision_shape: Arc<CollisionShape>, transform: Transform) -> Self {
        Self::new(0.0, collision_shape, transform)
    }

    /// Creates info for a body driven by `motion_state`
    pub fn kinematic(collision_shape: Arc<CollisionShape>, motion_state: Box<dyn MotionState>) -> Self {
        Self {
            transform: motion_state.get_world_transform(),
            collision_shape,
            motion_state: Some(motion_state),
            kinematic: true,
            ..Default::default()
        }
    }

    pub fn with_friction(mut self, friction: f32) -> Self {
        self.friction = friction;
        self
    }

    pub fn with_restitution(mut self, restitution: f32) -> Self {
        self.restitution = restitution;
        self
    }

    pub fn with_damping(mut self, linear: f32, angular: f32) -> Self {
        self.linear_damping = linear;
        self.angular_damping = angular;
        self
    }

    pub fn with_local_inertia(mut self, inertia: Vector3) -> Self {
        self.local_inertia = Some(inertia);
        self
    }

    pub fn with_gravity(mut self, gravity: Vector3) -> Self {
        self.gravity = Some(gravity);
        self
    }

    pub fn with_motion_state(mut self, motion_state: Box<dyn MotionState>) -> Self {
        self.motion_state = Some(motion_state);
        self
    }

    pub fn with_collision_filter(mut self, filter: CollisionFilter) -> Self {
        self.collision_filter = Some(filter);
        self
    }
}
