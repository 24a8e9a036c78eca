//! GJK closest point query between two convex shapes.
//!
//! The query runs on the core shapes (support without margin) and subtracts
//! the margins afterwards, so touching shapes are handled without falling
//! back to penetration depth. When the cores overlap the penetration solver
//! in [`super::penetration`] takes over.

use log::{trace, warn};

use crate::collision::penetration::calc_penetration_depth;
use crate::collision::simplex_solver::{VoronoiSimplexSolver, DEFAULT_DEGENERATE_TOLERANCE};
use crate::math::{Transform, Vector3, LARGE_FLOAT};
use crate::shapes::CollisionShape;

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Relative improvement below which GJK stops iterating
const REL_ERROR2: f32 = 1.0e-6;

/// Default bound on EPA iterations
pub const DEFAULT_EPA_ITERATIONS: u32 = 64;

/// Tuning knobs of the GJK query
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct GjkConfig {
    /// Iteration bound; exceeding it yields no result
    pub max_iterations: u32,

    /// Squared relative error used for the convergence test
    pub relative_error: f32,

    /// Sine of a vertex's elevation over its opposite face below which a
    /// tetrahedron simplex is flat
    pub degenerate_tolerance: f32,
}

impl Default for GjkConfig {
    fn default() -> Self {
        Self {
            max_iterations: 128,
            relative_error: REL_ERROR2,
            degenerate_tolerance: DEFAULT_DEGENERATE_TOLERANCE,
        }
    }
}

/// Input of a closest point query
#[derive(Debug, Clone, Copy)]
pub struct ClosestPointInput<'a> {
    pub shape_a: &'a CollisionShape,
    pub transform_a: Transform,
    pub shape_b: &'a CollisionShape,
    pub transform_b: Transform,

    /// Squared separation beyond which the query may stop early without a result
    pub maximum_distance_squared: f32,
}

impl<'a> ClosestPointInput<'a> {
    /// Creates an input with no distance bound
    pub fn new(
        shape_a: &'a CollisionShape,
        transform_a: Transform,
        shape_b: &'a CollisionShape,
        transform_b: Transform,
    ) -> Self {
        Self {
            shape_a,
            transform_a,
            shape_b,
            transform_b,
            maximum_distance_squared: LARGE_FLOAT,
        }
    }

    /// Sets the distance bound
    pub fn with_maximum_distance(mut self, distance: f32) -> Self {
        self.maximum_distance_squared = distance * distance;
        self
    }
}

/// Closest points between two shapes.
///
/// `point_on_a = point_on_b + normal_on_b * distance`; `distance` is negative
/// when the shapes penetrate and `normal_on_b` points from B towards A.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClosestPointResult {
    pub has_result: bool,
    pub point_on_a: Vector3,
    pub point_on_b: Vector3,
    pub normal_on_b: Vector3,
    pub distance: f32,
}

impl ClosestPointResult {
    /// A result that carries no contact
    pub fn none() -> Self {
        Self {
            has_result: false,
            point_on_a: Vector3::zeros(),
            point_on_b: Vector3::zeros(),
            normal_on_b: Vector3::zeros(),
            distance: LARGE_FLOAT,
        }
    }
}

/// Which path produced the last result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GjkMethod {
    /// Separated or touching cores, resolved by GJK
    Gjk,
    /// Overlapping cores, resolved by the penetration solver
    Penetration,
    /// Query stopped early or failed
    NoResult,
}

/// GJK query object that keeps the separating axis between calls
#[derive(Debug, Clone)]
pub struct GjkPairDetector {
    cached_separating_axis: Vector3,
    config: GjkConfig,
    epa_max_iterations: u32,
    simplex: VoronoiSimplexSolver,
    last_method: GjkMethod,
    last_iterations: u32,
}

impl Default for GjkPairDetector {
    fn default() -> Self {
        Self::new(GjkConfig::default(), DEFAULT_EPA_ITERATIONS)
    }
}

impl GjkPairDetector {
    /// Creates a detector with the cached axis set to +Y
    pub fn new(config: GjkConfig, epa_max_iterations: u32) -> Self {
        Self {
            cached_separating_axis: Vector3::new(0.0, 1.0, 0.0),
            config,
            epa_max_iterations,
            simplex: VoronoiSimplexSolver::new(config.degenerate_tolerance),
            last_method: GjkMethod::NoResult,
            last_iterations: 0,
        }
    }

    /// Separating axis carried over from the previous query
    pub fn cached_separating_axis(&self) -> Vector3 {
        self.cached_separating_axis
    }

    /// Seeds the separating axis of the next query
    pub fn set_cached_separating_axis(&mut self, axis: Vector3) {
        self.cached_separating_axis = axis;
    }

    /// Path taken by the last query
    pub fn last_method(&self) -> GjkMethod {
        self.last_method
    }

    /// Iterations used by the last query
    pub fn last_iterations(&self) -> u32 {
        self.last_iterations
    }

    /// Number of flat tetrahedra resolved by the closest-face fallback so far
    pub fn degenerate_fallbacks(&self) -> u32 {
        self.simplex.degenerate_fallbacks()
    }

    /// Computes the closest points between the two shapes of `input`
    pub fn get_closest_points(&mut self, input: &ClosestPointInput) -> ClosestPointResult {
        let shape_a = input.shape_a;
        let shape_b = input.shape_b;

        // shift both shapes towards the origin to keep the support points small
        let offset = (input.transform_a.position + input.transform_b.position) * 0.5;
        let mut local_a = input.transform_a;
        let mut local_b = input.transform_b;
        local_a.position -= offset;
        local_b.position -= offset;

        let margin_a = shape_a.margin();
        let margin_b = shape_b.margin();

        let mut normal_in_b = Vector3::zeros();
        let mut point_on_a = Vector3::zeros();
        let mut point_on_b = Vector3::zeros();
        let mut distance = 0.0;
        let mut is_valid = false;
        let mut check_simplex = false;
        let mut check_penetration = true;

        let mut squared_distance = LARGE_FLOAT;
        let mut delta;
        let mut iterations = 0u32;

        self.last_method = GjkMethod::NoResult;
        self.simplex.reset();

        loop {
            let v = self.cached_separating_axis;
            let p_world = core_support(shape_a, &local_a, &-v);
            let q_world = core_support(shape_b, &local_b, &v);
            let w = p_world - q_world;

            delta = v.dot(&w);

            // separated beyond the requested distance
            if delta > 0.0 && delta * delta > squared_distance * input.maximum_distance_squared {
                check_penetration = false;
                break;
            }

            // no progress: w is already part of the simplex
            if self.simplex.in_simplex(&w) {
                check_simplex = true;
                break;
            }

            // converged within the relative error
            let f0 = squared_distance - delta;
            let f1 = squared_distance * self.config.relative_error;
            if f0 <= f1 {
                if f0 <= 0.0 {
                    trace!("gjk: support moved backwards by {}", f0);
                }
                check_simplex = true;
                break;
            }

            self.simplex.add_vertex(w, p_world, q_world);

            let mut new_axis = Vector3::zeros();
            if !self.simplex.closest(&mut new_axis) {
                check_simplex = true;
                break;
            }
            self.cached_separating_axis = new_axis;

            let previous = squared_distance;
            squared_distance = new_axis.norm_squared();

            // not getting any closer
            if previous - squared_distance <= f32::EPSILON * previous {
                self.simplex.backup_closest(&mut self.cached_separating_axis);
                check_simplex = true;
                break;
            }

            iterations += 1;
            if iterations > self.config.max_iterations {
                warn!(
                    "gjk: no convergence after {} iterations ({:?} vs {:?})",
                    iterations,
                    shape_a.shape_type(),
                    shape_b.shape_type()
                );
                self.last_iterations = iterations;
                return ClosestPointResult::none();
            }

            if self.simplex.full_simplex() {
                // origin enclosed by the core simplex
                break;
            }
        }
        self.last_iterations = iterations;

        if check_simplex {
            let (pa, pb) = self.simplex.compute_points();
            point_on_a = pa;
            point_on_b = pb;
            normal_in_b = pa - pb;
            let len_sq = self.cached_separating_axis.norm_squared();
            if len_sq > f32::EPSILON * f32::EPSILON {
                let rlen = 1.0 / len_sq.sqrt();
                normal_in_b *= rlen;
                let s = squared_distance.sqrt();
                point_on_a -= self.cached_separating_axis * (margin_a / s);
                point_on_b += self.cached_separating_axis * (margin_b / s);
                distance = 1.0 / rlen - margin_a - margin_b;
                is_valid = true;
                self.last_method = GjkMethod::Gjk;
            }
        }

        if check_penetration && !is_valid {
            match calc_penetration_depth(shape_a, &local_a, shape_b, &local_b, self.epa_max_iterations) {
                Some(pen) => {
                    point_on_a = pen.point_on_a;
                    point_on_b = pen.point_on_b;
                    normal_in_b = pen.normal_on_b;
                    distance = -pen.depth;
                    is_valid = true;
                    self.last_method = GjkMethod::Penetration;
                    // keep a usable axis for the next frame
                    self.cached_separating_axis = -pen.normal_on_b * pen.depth.max(f32::EPSILON);
                }
                None => {
                    trace!("gjk: penetration solver found no overlap");
                }
            }
        }

        if !is_valid {
            return ClosestPointResult::none();
        }

        ClosestPointResult {
            has_result: true,
            point_on_a: point_on_a + offset,
            point_on_b: point_on_b + offset,
            normal_on_b: normal_in_b,
            distance,
        }
    }
}

/// World support of the core shape, the shape minus its margin
#[inline]
fn core_support(shape: &CollisionShape, transform: &Transform, direction: &Vector3) -> Vector3 {
    let local_dir = transform.inverse_transform_direction(direction);
    transform.transform_point(&shape.local_support_without_margin(&local_dir))
}

/// One-shot closest point query with default settings and a cold axis cache
pub fn closest_points(
    shape_a: &CollisionShape,
    transform_a: &Transform,
    shape_b: &CollisionShape,
    transform_b: &Transform,
) -> ClosestPointResult {
    let mut detector = GjkPairDetector::default();
    detector.get_closest_points(&ClosestPointInput::new(shape_a, *transform_a, shape_b, *transform_b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn separated_spheres() {
        let a = CollisionShape::new_sphere(1.0).unwrap();
        let b = CollisionShape::new_sphere(0.5).unwrap();
        let result = closest_points(
            &a,
            &Transform::from_position(Vector3::new(3.0, 0.0, 0.0)),
            &b,
            &Transform::identity(),
        );
        assert!(result.has_result);
        assert_relative_eq!(result.distance, 1.5, epsilon = 1e-4);
        assert_relative_eq!(result.normal_on_b, Vector3::x(), epsilon = 1e-4);
        assert_relative_eq!(result.point_on_a, Vector3::new(2.0, 0.0, 0.0), epsilon = 1e-4);
        assert_relative_eq!(result.point_on_b, Vector3::new(0.5, 0.0, 0.0), epsilon = 1e-4);
    }

    #[test]
    fn box_resting_on_box() {
        let a = CollisionShape::new_box(Vector3::repeat(1.0)).unwrap();
        let b = CollisionShape::new_box(Vector3::new(10.0, 1.0, 10.0)).unwrap();
        let result = closest_points(
            &a,
            &Transform::from_position(Vector3::new(0.0, 2.5, 0.0)),
            &b,
            &Transform::identity(),
        );
        assert!(result.has_result);
        assert_relative_eq!(result.distance, 0.5, epsilon = 1e-4);
        assert_relative_eq!(result.normal_on_b, Vector3::y(), epsilon = 1e-4);
    }

    #[test]
    fn max_distance_skips_far_pairs() {
        let a = CollisionShape::new_sphere(1.0).unwrap();
        let mut detector = GjkPairDetector::default();
        let input = ClosestPointInput::new(
            &a,
            Transform::from_position(Vector3::new(100.0, 0.0, 0.0)),
            &a,
            Transform::identity(),
        )
        .with_maximum_distance(2.0);
        let result = detector.get_closest_points(&input);
        assert!(!result.has_result);
    }

    #[test]
    fn overlapping_spheres_use_margins() {
        let a = CollisionShape::new_sphere(1.0).unwrap();
        let result = closest_points(
            &a,
            &Transform::from_position(Vector3::new(0.0, 1.5, 0.0)),
            &a,
            &Transform::identity(),
        );
        assert!(result.has_result);
        assert_relative_eq!(result.distance, -0.5, epsilon = 1e-4);
        assert_relative_eq!(result.normal_on_b, Vector3::y(), epsilon = 1e-4);
    }
}
