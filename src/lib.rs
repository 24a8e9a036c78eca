pub mod math;
pub mod core;
pub mod bodies;
pub mod shapes;
pub mod collision;
pub mod constraints;

/// Re-export common types for easier usage
pub use crate::core::{
    BodyHandle, ConstraintHandle, DebugDrawer, DebugMode, PhysicsWorld, RayHit, SimulationConfig,
};
pub use crate::bodies::{ActivationState, CcdConstructionInfo, DefaultMotionState, MotionState, RigidBody};
pub use crate::collision::BroadphaseType;
pub use crate::constraints::{Constraint, ConstraintKind, ConstraintType};
pub use crate::shapes::{CollisionShape, ShapeType};
pub use crate::math::{Quaternion, Transform, Vector3};
pub use crate::error::PhysicsError;

/// Error types for the physics engine
pub mod error {
    use thiserror::Error;

    use crate::core::{BodyHandle, ConstraintHandle};

    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum PhysicsError {
        #[error("Invalid shape: {0}")]
        InvalidShape(String),

        #[error("Invalid parameter: {0}")]
        InvalidParameter(String),

        #[error("Broadphase capacity of {capacity} proxies exceeded")]
        CapacityExceeded { capacity: u32 },

        #[error("Unknown {0}")]
        UnknownBody(BodyHandle),

        #[error("Unknown {0}")]
        UnknownConstraintId(ConstraintHandle),

        #[error("Simulation stability error: {0}")]
        SimulationError(String),
    }
}

/// Result type for physics engine operations
pub type Result<T> = std::result::Result<T, error::PhysicsError>;

/// Engine version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
