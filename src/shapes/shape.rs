use crate::collision::{ray_cast, RayCastResult};
use crate::error::PhysicsError;
use crate::math::{abs_matrix, Aabb, Transform, Vector3, EPSILON};
use crate::shapes::box_shape::box_inertia;
use crate::shapes::{BoxShape, ConeShape, SimplexShape, SphereShape, CONVEX_DISTANCE_MARGIN};
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Tag identifying a shape kind. Used to index the collision dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ShapeType {
    Box,
    Sphere,
    Cone,
    Simplex,
    Empty,
}

impl ShapeType {
    /// Number of shape kinds
    pub const COUNT: usize = 5;

    /// All shape kinds in dispatch table order
    pub const ALL: [ShapeType; Self::COUNT] = [
        ShapeType::Box,
        ShapeType::Sphere,
        ShapeType::Cone,
        ShapeType::Simplex,
        ShapeType::Empty,
    ];

    /// Row/column of this kind in the dispatch table
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Returns true for shapes handled by the GJK convex pipeline
    #[inline]
    pub fn is_convex(self) -> bool {
        !matches!(self, ShapeType::Empty)
    }

    /// Returns true for shapes with flat faces, which benefit from contact perturbation
    #[inline]
    pub fn is_polyhedral(self) -> bool {
        matches!(self, ShapeType::Box | ShapeType::Cone | ShapeType::Simplex)
    }
}

/// Geometry payload of a collision shape
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Box(BoxShape),
    Sphere(SphereShape),
    Cone(ConeShape),
    Simplex(SimplexShape),
    /// Placeholder that takes part in the broadphase but never produces contacts
    Empty,
}

/// Convex collision shape plus its collision margin.
///
/// Constructors validate geometry and return `InvalidShape` instead of
/// clamping bad input.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionShape {
    kind: ShapeKind,
    margin: f32,
}

impl CollisionShape {
    /// Creates a box from its half extents with the default margin
    pub fn new_box(half_extents: Vector3) -> Result<Self> {
        for axis in 0..3 {
            let h = half_extents[axis];
            if !h.is_finite() || h <= 0.0 {
                return Err(PhysicsError::InvalidShape(format!(
                    "box half extent {} on axis {} must be positive and finite",
                    h, axis
                )));
            }
        }
        let margin = CONVEX_DISTANCE_MARGIN.min(half_extents.min());
        Self::validated(ShapeKind::Box(BoxShape::new(half_extents)), margin)
    }

    /// Creates a sphere. Its effective margin is the radius.
    pub fn new_sphere(radius: f32) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 {
            return Err(PhysicsError::InvalidShape(format!(
                "sphere radius {} must be positive and finite",
                radius
            )));
        }
        Self::validated(ShapeKind::Sphere(SphereShape::new(radius)), radius)
    }

    /// Creates a cone around the Y axis
    pub fn new_cone(radius: f32, height: f32) -> Result<Self> {
        if !radius.is_finite() || radius <= 0.0 || !height.is_finite() || height <= 0.0 {
            return Err(PhysicsError::InvalidShape(format!(
                "cone radius {} and height {} must be positive and finite",
                radius, height
            )));
        }
        Self::validated(ShapeKind::Cone(ConeShape::new(radius, height)), CONVEX_DISTANCE_MARGIN)
    }

    /// Creates a simplex from one to four points
    pub fn new_simplex(points: &[Vector3]) -> Result<Self> {
        if points.is_empty() || points.len() > 4 {
            return Err(PhysicsError::InvalidShape(format!(
                "simplex needs 1 to 4 points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|p| !crate::math::is_finite(p)) {
            return Err(PhysicsError::InvalidShape("simplex point is not finite".to_string()));
        }
        Self::validated(ShapeKind::Simplex(SimplexShape::new(points.to_vec())), CONVEX_DISTANCE_MARGIN)
    }

    /// Creates the empty placeholder shape
    pub fn empty() -> Self {
        Self {
            kind: ShapeKind::Empty,
            margin: 0.0,
        }
    }

    /// Returns this shape with a different margin
    pub fn with_margin(mut self, margin: f32) -> Result<Self> {
        self.set_margin(margin)?;
        Ok(self)
    }

    /// Sets the collision margin.
    ///
    /// For a sphere the radius is the margin, so this only validates the value.
    pub fn set_margin(&mut self, margin: f32) -> Result<()> {
        Self::check_margin(&self.kind, margin)?;
        if !matches!(self.kind, ShapeKind::Sphere(_)) {
            self.margin = margin;
        }
        Ok(())
    }

    fn validated(kind: ShapeKind, margin: f32) -> Result<Self> {
        Self::check_margin(&kind, margin)?;
        Ok(Self { kind, margin })
    }

    fn check_margin(kind: &ShapeKind, margin: f32) -> Result<()> {
        if !margin.is_finite() || margin <= 0.0 {
            return Err(PhysicsError::InvalidShape(format!(
                "margin {} must be finite and positive",
                margin
            )));
        }
        if let ShapeKind::Box(b) = kind {
            if margin > b.half_extents().min() {
                return Err(PhysicsError::InvalidShape(format!(
                    "margin {} exceeds the smallest box half extent {}",
                    margin,
                    b.half_extents().min()
                )));
            }
        }
        Ok(())
    }

    /// The kind tag of this shape
    pub fn shape_type(&self) -> ShapeType {
        match self.kind {
            ShapeKind::Box(_) => ShapeType::Box,
            ShapeKind::Sphere(_) => ShapeType::Sphere,
            ShapeKind::Cone(_) => ShapeType::Cone,
            ShapeKind::Simplex(_) => ShapeType::Simplex,
            ShapeKind::Empty => ShapeType::Empty,
        }
    }

    /// The geometry payload
    pub fn kind(&self) -> &ShapeKind {
        &self.kind
    }

    /// Effective collision margin used by GJK
    pub fn margin(&self) -> f32 {
        match &self.kind {
            ShapeKind::Sphere(s) => s.radius(),
            _ => self.margin,
        }
    }

    /// Support point of the core shape (without margin) in local space
    pub fn local_support_without_margin(&self, direction: &Vector3) -> Vector3 {
        match &self.kind {
            ShapeKind::Box(b) => b.support_without_margin(direction, self.margin),
            ShapeKind::Sphere(_) => Vector3::zeros(),
            ShapeKind::Cone(c) => c.support_without_margin(direction),
            ShapeKind::Simplex(s) => s.support_without_margin(direction),
            ShapeKind::Empty => Vector3::zeros(),
        }
    }

    /// Support point of the full shape, including margin, in local space
    pub fn local_support(&self, direction: &Vector3) -> Vector3 {
        let core = self.local_support_without_margin(direction);
        let margin = self.margin();
        if margin == 0.0 {
            return core;
        }
        let len_sq = direction.norm_squared();
        let unit = if len_sq < EPSILON * EPSILON {
            Vector3::new(-1.0, -1.0, -1.0).normalize()
        } else {
            direction / len_sq.sqrt()
        };
        core + unit * margin
    }

    /// Support point of the full shape for a world space direction
    pub fn world_support(&self, transform: &Transform, direction: &Vector3) -> Vector3 {
        let local_dir = transform.inverse_transform_direction(direction);
        transform.transform_point(&self.local_support(&local_dir))
    }

    /// Diagonal local inertia for the given mass
    pub fn calculate_local_inertia(&self, mass: f32) -> Vector3 {
        match &self.kind {
            ShapeKind::Box(b) => b.local_inertia(mass),
            ShapeKind::Sphere(s) => s.local_inertia(mass),
            ShapeKind::Cone(_) | ShapeKind::Simplex(_) => {
                box_inertia(&self.local_aabb().half_extents(), mass)
            }
            ShapeKind::Empty => Vector3::zeros(),
        }
    }

    /// Local space bounding box, margin included
    pub fn local_aabb(&self) -> Aabb {
        match &self.kind {
            ShapeKind::Box(b) => Aabb::new(-b.half_extents(), b.half_extents()),
            ShapeKind::Sphere(s) => {
                Aabb::from_center_half_extents(Vector3::zeros(), Vector3::repeat(s.radius()))
            }
            ShapeKind::Empty => Aabb::from_center_half_extents(Vector3::zeros(), Vector3::repeat(self.margin)),
            _ => {
                let mut min = Vector3::zeros();
                let mut max = Vector3::zeros();
                for axis in 0..3 {
                    let mut dir = Vector3::zeros();
                    dir[axis] = 1.0;
                    max[axis] = self.local_support(&dir)[axis];
                    dir[axis] = -1.0;
                    min[axis] = self.local_support(&dir)[axis];
                }
                Aabb::new(min, max)
            }
        }
    }

    /// World space bounding box for a transform, margin included
    pub fn aabb(&self, transform: &Transform) -> Aabb {
        match &self.kind {
            ShapeKind::Sphere(s) => {
                Aabb::from_center_half_extents(transform.position, Vector3::repeat(s.radius()))
            }
            ShapeKind::Cone(_) | ShapeKind::Simplex(_) => {
                let mut min = Vector3::zeros();
                let mut max = Vector3::zeros();
                for axis in 0..3 {
                    let mut dir = Vector3::zeros();
                    dir[axis] = 1.0;
                    max[axis] = self.world_support(transform, &dir)[axis];
                    dir[axis] = -1.0;
                    min[axis] = self.world_support(transform, &dir)[axis];
                }
                Aabb::new(min, max)
            }
            _ => {
                let local = self.local_aabb();
                let center = transform.transform_point(&local.center());
                let extent = abs_matrix(&transform.basis()) * local.half_extents();
                Aabb::from_center_half_extents(center, extent)
            }
        }
    }

    /// Radius of a sphere around the local origin enclosing the shape
    pub fn bounding_radius(&self) -> f32 {
        let aabb = self.local_aabb();
        aabb.min.norm().max(aabb.max.norm())
    }

    /// Intersects the segment `from -> to` with the shape placed at `transform`.
    ///
    /// Returns the fraction along the segment and the world space surface normal.
    pub fn ray_intersect(&self, transform: &Transform, from: &Vector3, to: &Vector3) -> Option<RayCastResult> {
        match &self.kind {
            ShapeKind::Box(b) => b.ray_intersect(transform, from, to),
            ShapeKind::Sphere(s) => s.ray_intersect(transform, from, to),
            ShapeKind::Cone(_) | ShapeKind::Simplex(_) => ray_cast::convex_ray_cast(self, transform, from, to),
            ShapeKind::Empty => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn rejects_invalid_geometry() {
        assert!(CollisionShape::new_box(Vector3::new(1.0, 0.0, 1.0)).is_err());
        assert!(CollisionShape::new_sphere(-1.0).is_err());
        assert!(CollisionShape::new_cone(1.0, f32::NAN).is_err());
        assert!(CollisionShape::new_simplex(&[]).is_err());
        assert!(CollisionShape::new_simplex(&[Vector3::zeros(); 5]).is_err());
    }

    #[test]
    fn rejects_invalid_margin() {
        let shape = CollisionShape::new_box(Vector3::repeat(1.0)).unwrap();
        assert!(shape.clone().with_margin(-0.01).is_err());
        assert!(shape.clone().with_margin(0.0).is_err());
        assert!(shape.clone().with_margin(f32::NAN).is_err());
        assert!(CollisionShape::new_cone(1.0, 2.0).unwrap().with_margin(0.0).is_err());
        assert!(shape.clone().with_margin(2.0).is_err());
        let shape = shape.with_margin(0.05).unwrap();
        assert_relative_eq!(shape.margin(), 0.05);
    }

    #[test]
    fn box_support_includes_margin() {
        let shape = CollisionShape::new_box(Vector3::new(1.0, 2.0, 3.0)).unwrap();
        let support = shape.local_support(&Vector3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(support.x, 1.0, epsilon = 1e-6);
        let core = shape.local_support_without_margin(&Vector3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(core, Vector3::new(0.96, 1.96, 2.96), epsilon = 1e-6);
    }

    #[test]
    fn sphere_margin_is_radius() {
        let shape = CollisionShape::new_sphere(0.95).unwrap();
        assert_relative_eq!(shape.margin(), 0.95);
        assert_relative_eq!(shape.local_support(&Vector3::y()), Vector3::new(0.0, 0.95, 0.0));
    }

    #[test]
    fn cone_support_picks_apex_and_rim() {
        let shape = CollisionShape::new_cone(1.0, 2.0).unwrap();
        let apex = shape.local_support_without_margin(&Vector3::y());
        assert_relative_eq!(apex, Vector3::new(0.0, 1.0, 0.0));
        let rim = shape.local_support_without_margin(&Vector3::new(1.0, -0.2, 0.0));
        assert_relative_eq!(rim, Vector3::new(1.0, -1.0, 0.0));
    }

    #[test]
    fn box_inertia_matches_formula() {
        let shape = CollisionShape::new_box(Vector3::repeat(1.0)).unwrap();
        let inertia = shape.calculate_local_inertia(6.0);
        assert_relative_eq!(inertia, Vector3::repeat(4.0), epsilon = 1e-5);
        assert_eq!(CollisionShape::empty().calculate_local_inertia(1.0), Vector3::zeros());
    }

    #[test]
    fn rotated_box_aabb_grows() {
        let shape = CollisionShape::new_box(Vector3::repeat(1.0)).unwrap();
        let rotation = crate::math::Quaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_4);
        let aabb = shape.aabb(&Transform::new(Vector3::zeros(), rotation));
        assert_relative_eq!(aabb.max.x, 2.0f32.sqrt(), epsilon = 1e-5);
        assert_relative_eq!(aabb.max.z, 1.0, epsilon = 1e-5);
    }
}
