mod activation;
mod construction_info;
mod motion_state;
mod rigid_body;

pub use self::activation::ActivationState;
pub use self::construction_info::CcdConstructionInfo;
pub use self::motion_state::{DefaultMotionState, MotionState};
pub use self::rigid_body::{RigidBody, MAX_ANGULAR_STEP};
