//! Ray casting against convex shapes.
//!
//! Shapes without an analytic test are cast with the GJK based ray cast:
//! the ray origin is advanced along the segment whenever a support plane
//! separates it from the shape, until the simplex reaches the shape surface.

use crate::collision::simplex_solver::VoronoiSimplexSolver;
use crate::math::{Transform, Vector3, EPSILON};
use crate::shapes::CollisionShape;

/// Iteration bound of the GJK ray cast
const MAX_ITERATIONS: u32 = 64;

/// Distance at which the ray point counts as touching the shape
const HIT_TOLERANCE: f32 = 1.0e-4;

/// Hit along a segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayCastResult {
    /// Fraction in `[0, 1]` along the segment
    pub fraction: f32,

    /// World space surface normal at the hit
    pub normal: Vector3,
}

/// Casts the segment `from -> to` against a convex shape, margin included.
///
/// A segment starting inside the shape reports a hit at fraction zero with
/// the normal facing back along the segment.
pub fn convex_ray_cast(
    shape: &CollisionShape,
    transform: &Transform,
    from: &Vector3,
    to: &Vector3,
) -> Option<RayCastResult> {
    let r = to - from;
    let mut lambda = 0.0f32;
    let mut x = *from;
    let mut normal = Vector3::zeros();

    let mut solver = VoronoiSimplexSolver::default();
    let mut support_points: Vec<Vector3> = Vec::with_capacity(4);

    let center = transform.transform_point(&shape.local_aabb().center());
    let mut v = x - center;
    if v.norm_squared() < EPSILON * EPSILON {
        v = -r;
    }
    let mut dist2 = v.norm_squared();

    let mut iterations = 0;
    while dist2 > HIT_TOLERANCE * HIT_TOLERANCE {
        iterations += 1;
        if iterations > MAX_ITERATIONS {
            break;
        }

        let p = shape.world_support(transform, &v);
        let w = x - p;
        let vw = v.dot(&w);
        if vw > 0.0 {
            let vr = v.dot(&r);
            if vr >= -EPSILON * EPSILON {
                return None;
            }
            lambda -= vw / vr;
            if lambda > 1.0 {
                return None;
            }
            x = from + r * lambda;
            normal = v;
        }

        // the simplex is kept as shape points and rebuilt relative to x
        solver.reset();
        for y in support_points.iter() {
            solver.add_vertex(x - y, x, *y);
        }
        let w = x - p;
        if !solver.in_simplex(&w) && !solver.full_simplex() {
            solver.add_vertex(w, x, p);
        }

        dist2 = if solver.closest(&mut v) { v.norm_squared() } else { 0.0 };
        let (_, _, points) = solver.simplex_points();
        support_points.clear();
        support_points.extend_from_slice(points);
    }

    let normal = if normal.norm_squared() > EPSILON * EPSILON {
        normal.normalize()
    } else {
        -r.try_normalize(EPSILON)?
    };

    Some(RayCastResult {
        fraction: lambda,
        normal,
    })
}
