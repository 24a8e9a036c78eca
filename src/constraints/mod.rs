mod constraint;
mod contact;
mod hinge;
mod jacobian;
mod point_to_point;

pub use self::constraint::{Constraint, ConstraintKind, ConstraintType};
pub use self::contact::{prepare_manifold, solve_manifold, ContactSolverInfo};
pub use self::hinge::{HingeConstraint, HingeLimit};
pub use self::jacobian::JacobianEntry;
pub use self::point_to_point::{ConstraintSetting, Point2PointConstraint, PICKING_TAU};
