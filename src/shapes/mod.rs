//! Convex collision shapes.
//!
//! Shapes are immutable once shared: bodies hold them behind an `Arc`, and the
//! only way to change geometry of a shared shape is `Arc::make_mut`, which
//! copies it first.

mod shape;
mod box_shape;
mod sphere;
mod cone;
mod simplex;

pub use shape::{CollisionShape, ShapeKind, ShapeType};
pub use box_shape::BoxShape;
pub use sphere::SphereShape;
pub use cone::ConeShape;
pub use simplex::SimplexShape;

/// Default collision margin for convex shapes
pub const CONVEX_DISTANCE_MARGIN: f32 = 0.04;
