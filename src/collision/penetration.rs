//! Penetration depth for overlapping convex shapes.
//!
//! A boolean GJK on the full shapes (margins included) builds a tetrahedron
//! around the origin, then the expanding polytope algorithm grows it towards
//! the boundary of the Minkowski difference. If either stage breaks down on
//! degenerate input, a fixed set of sampled directions gives a bounded answer.

use log::{debug, warn};

use crate::math::{Transform, Vector3, EPSILON};
use crate::shapes::CollisionShape;

/// Relative accuracy at which EPA stops expanding
const EPA_TOLERANCE: f32 = 1.0e-4;

/// Iteration bound of the boolean GJK stage
const ENCLOSING_MAX_ITERATIONS: u32 = 64;

/// Penetration between two shapes.
///
/// `normal_on_b` points from B towards A, so moving A by
/// `normal_on_b * depth` separates the shapes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenetrationResult {
    pub point_on_a: Vector3,
    pub point_on_b: Vector3,
    pub normal_on_b: Vector3,
    pub depth: f32,
}

#[derive(Debug, Clone, Copy)]
struct SupportVertex {
    /// Point of the Minkowski difference A - B
    w: Vector3,
    /// Support point on A
    a: Vector3,
    /// Support point on B
    b: Vector3,
}

struct MinkowskiDifference<'a> {
    shape_a: &'a CollisionShape,
    transform_a: &'a Transform,
    shape_b: &'a CollisionShape,
    transform_b: &'a Transform,
}

impl MinkowskiDifference<'_> {
    fn support(&self, direction: &Vector3) -> SupportVertex {
        let a = self.shape_a.world_support(self.transform_a, direction);
        let b = self.shape_b.world_support(self.transform_b, &-direction);
        SupportVertex { w: a - b, a, b }
    }
}

/// Computes how deep two shapes overlap, margins included.
///
/// Returns `None` if the shapes do not overlap.
pub fn calc_penetration_depth(
    shape_a: &CollisionShape,
    transform_a: &Transform,
    shape_b: &CollisionShape,
    transform_b: &Transform,
    max_iterations: u32,
) -> Option<PenetrationResult> {
    let minkowski = MinkowskiDifference {
        shape_a,
        transform_a,
        shape_b,
        transform_b,
    };

    match enclosing_tetrahedron(&minkowski) {
        Enclosing::Separated => return None,
        Enclosing::Tetrahedron(simplex) => {
            if let Some(result) = expand_polytope(&minkowski, simplex, max_iterations) {
                return Some(result);
            }
            warn!(
                "epa failed for {:?} vs {:?}, sampling directions",
                shape_a.shape_type(),
                shape_b.shape_type()
            );
        }
        Enclosing::Degenerate => {
            debug!(
                "degenerate simplex for {:?} vs {:?}, sampling directions",
                shape_a.shape_type(),
                shape_b.shape_type()
            );
        }
    }

    sample_penetration(&minkowski)
}

enum Enclosing {
    Separated,
    Degenerate,
    Tetrahedron([SupportVertex; 4]),
}

/// Boolean GJK that stops once a tetrahedron encloses the origin
fn enclosing_tetrahedron(minkowski: &MinkowskiDifference) -> Enclosing {
    let mut direction = minkowski.transform_a.position - minkowski.transform_b.position;
    if direction.norm_squared() < EPSILON {
        direction = Vector3::x();
    }

    let first = minkowski.support(&direction);
    let mut simplex: Vec<SupportVertex> = vec![first];
    direction = -first.w;

    for _ in 0..ENCLOSING_MAX_ITERATIONS {
        if direction.norm_squared() < EPSILON * EPSILON {
            // origin on the current simplex feature
            return complete_tetrahedron(minkowski, simplex);
        }

        let next = minkowski.support(&direction);
        if next.w.dot(&direction) < 0.0 {
            return Enclosing::Separated;
        }
        simplex.push(next);

        if let Some(contained) = do_simplex(&mut simplex, &mut direction) {
            return if contained {
                let mut tetra = [simplex[0]; 4];
                tetra.copy_from_slice(&simplex[..4]);
                Enclosing::Tetrahedron(tetra)
            } else {
                Enclosing::Degenerate
            };
        }
    }

    Enclosing::Degenerate
}

/// Reduces the simplex to the feature nearest the origin and updates the
/// search direction. Returns `Some(true)` when a tetrahedron encloses the origin.
fn do_simplex(simplex: &mut Vec<SupportVertex>, direction: &mut Vector3) -> Option<bool> {
    match simplex.len() {
        2 => {
            let a = simplex[1];
            let b = simplex[0];
            let ab = b.w - a.w;
            let ao = -a.w;
            if ab.dot(&ao) > 0.0 {
                *direction = ab.cross(&ao).cross(&ab);
                if direction.norm_squared() < EPSILON * EPSILON {
                    // origin on the segment; any perpendicular works
                    *direction = any_perpendicular(&ab);
                }
            } else {
                *simplex = vec![a];
                *direction = ao;
            }
            None
        }
        3 => {
            let a = simplex[2];
            let b = simplex[1];
            let c = simplex[0];
            let ab = b.w - a.w;
            let ac = c.w - a.w;
            let ao = -a.w;
            let abc = ab.cross(&ac);

            if abc.cross(&ac).dot(&ao) > 0.0 {
                if ac.dot(&ao) > 0.0 {
                    *simplex = vec![c, a];
                    *direction = ac.cross(&ao).cross(&ac);
                } else {
                    *simplex = vec![b, a];
                    return do_simplex(simplex, direction);
                }
            } else if ab.cross(&abc).dot(&ao) > 0.0 {
                *simplex = vec![b, a];
                return do_simplex(simplex, direction);
            } else if abc.dot(&ao) > 0.0 {
                *direction = abc;
            } else {
                *simplex = vec![b, c, a];
                *direction = -abc;
            }
            if direction.norm_squared() < EPSILON * EPSILON {
                *direction = if abc.norm_squared() > EPSILON * EPSILON { abc } else { any_perpendicular(&ab) };
            }
            None
        }
        4 => {
            let a = simplex[3];
            let b = simplex[2];
            let c = simplex[1];
            let d = simplex[0];
            let ao = -a.w;

            for (p, q, opposite) in [(b, c, d), (c, d, b), (d, b, c)] {
                let normal = (p.w - a.w).cross(&(q.w - a.w));
                let outward = if normal.dot(&(opposite.w - a.w)) > 0.0 { -normal } else { normal };
                if outward.norm_squared() < EPSILON * EPSILON {
                    return Some(false);
                }
                if outward.dot(&ao) > 0.0 {
                    *simplex = vec![q, p, a];
                    *direction = outward;
                    return None;
                }
            }

            let (ab, ac, ad) = (b.w - a.w, c.w - a.w, d.w - a.w);
            let volume = ab.cross(&ac).dot(&ad);
            if volume.abs() <= EPSILON * ab.norm() * ac.norm() * ad.norm() {
                return Some(false);
            }
            Some(true)
        }
        _ => None,
    }
}

fn any_perpendicular(v: &Vector3) -> Vector3 {
    let axis = if v.x.abs() < 0.57 { Vector3::x() } else { Vector3::y() };
    v.cross(&axis)
}

/// Grows a simplex that touches the origin into a full tetrahedron
fn complete_tetrahedron(minkowski: &MinkowskiDifference, mut simplex: Vec<SupportVertex>) -> Enclosing {
    let axes = [
        Vector3::x(),
        Vector3::y(),
        Vector3::z(),
        -Vector3::x(),
        -Vector3::y(),
        -Vector3::z(),
    ];

    while simplex.len() < 4 {
        let mut best: Option<(f32, SupportVertex)> = None;
        for axis in axes.iter() {
            let candidate = minkowski.support(axis);
            let spread = match simplex.len() {
                1 => (candidate.w - simplex[0].w).norm_squared(),
                2 => (simplex[1].w - simplex[0].w)
                    .cross(&(candidate.w - simplex[0].w))
                    .norm_squared(),
                _ => (simplex[1].w - simplex[0].w)
                    .cross(&(simplex[2].w - simplex[0].w))
                    .dot(&(candidate.w - simplex[0].w))
                    .abs(),
            };
            if best.map_or(true, |(s, _)| spread > s) {
                best = Some((spread, candidate));
            }
        }
        match best {
            Some((spread, vertex)) if spread > EPSILON => simplex.push(vertex),
            _ => return Enclosing::Degenerate,
        }
    }

    let mut tetra = [simplex[0]; 4];
    tetra.copy_from_slice(&simplex[..4]);
    if contains_origin(&tetra) {
        Enclosing::Tetrahedron(tetra)
    } else {
        Enclosing::Degenerate
    }
}

fn contains_origin(tetra: &[SupportVertex; 4]) -> bool {
    const FACES: [[usize; 4]; 4] = [[0, 1, 2, 3], [0, 1, 3, 2], [0, 2, 3, 1], [1, 2, 3, 0]];
    FACES.iter().all(|f| {
        let a = tetra[f[0]].w;
        let normal = match (tetra[f[1]].w - a).cross(&(tetra[f[2]].w - a)).try_normalize(f32::MIN_POSITIVE) {
            Some(n) => n,
            None => return false,
        };
        let side_d = normal.dot(&(tetra[f[3]].w - a));
        let side_o = normal.dot(&-a);
        side_o * side_d.signum() >= -EPSILON * side_d.abs()
    })
}

#[derive(Debug, Clone, Copy)]
struct PolytopeFace {
    indices: [usize; 3],
    normal: Vector3,
    distance: f32,
}

fn make_face(vertices: &[SupportVertex], i: usize, j: usize, k: usize, centroid: &Vector3) -> Option<PolytopeFace> {
    let a = vertices[i].w;
    let mut normal = (vertices[j].w - a).cross(&(vertices[k].w - a));
    let len = normal.norm();
    if len < EPSILON * EPSILON {
        return None;
    }
    normal /= len;

    let mut indices = [i, j, k];
    if normal.dot(&(a - centroid)) < 0.0 {
        normal = -normal;
        indices.swap(1, 2);
    }
    Some(PolytopeFace {
        indices,
        normal,
        distance: normal.dot(&a),
    })
}

fn add_edge(edges: &mut Vec<(usize, usize)>, a: usize, b: usize) {
    if let Some(pos) = edges.iter().position(|&(x, y)| x == b && y == a) {
        edges.swap_remove(pos);
    } else {
        edges.push((a, b));
    }
}

/// Expanding polytope algorithm from an enclosing tetrahedron
fn expand_polytope(
    minkowski: &MinkowskiDifference,
    tetra: [SupportVertex; 4],
    max_iterations: u32,
) -> Option<PenetrationResult> {
    let mut vertices: Vec<SupportVertex> = tetra.to_vec();
    let centroid = vertices.iter().fold(Vector3::zeros(), |acc, v| acc + v.w) * 0.25;

    let mut faces = Vec::with_capacity(32);
    for [i, j, k] in [[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]] {
        faces.push(make_face(&vertices, i, j, k, &centroid)?);
    }

    let mut closest = faces[0];
    for _ in 0..max_iterations {
        closest = *faces
            .iter()
            .min_by(|x, y| x.distance.total_cmp(&y.distance))?;

        let support = minkowski.support(&closest.normal);
        let support_distance = support.w.dot(&closest.normal);
        if support_distance - closest.distance <= EPA_TOLERANCE * closest.distance.max(EPSILON) {
            return Some(face_result(&vertices, &closest));
        }

        let new_index = vertices.len();
        vertices.push(support);

        let mut edges: Vec<(usize, usize)> = Vec::new();
        faces.retain(|face| {
            let visible = face.normal.dot(&(support.w - vertices[face.indices[0]].w)) > 0.0;
            if visible {
                let [a, b, c] = face.indices;
                add_edge(&mut edges, a, b);
                add_edge(&mut edges, b, c);
                add_edge(&mut edges, c, a);
            }
            !visible
        });

        for (a, b) in edges {
            if let Some(face) = make_face(&vertices, a, b, new_index, &centroid) {
                faces.push(face);
            }
        }

        if faces.is_empty() {
            return None;
        }
    }

    debug!("epa: iteration bound reached, using best face");
    Some(face_result(&vertices, &closest))
}

fn face_result(vertices: &[SupportVertex], face: &PolytopeFace) -> PenetrationResult {
    let [i, j, k] = face.indices;
    let (a, b, c) = (vertices[i], vertices[j], vertices[k]);
    let projection = face.normal * face.distance;
    let (u, v, w) = barycentric(&projection, &a.w, &b.w, &c.w);

    let point_on_a = a.a * u + b.a * v + c.a * w;
    let point_on_b = a.b * u + b.b * v + c.b * w;

    PenetrationResult {
        point_on_a,
        point_on_b,
        normal_on_b: -face.normal,
        depth: face.distance,
    }
}

fn barycentric(p: &Vector3, a: &Vector3, b: &Vector3, c: &Vector3) -> (f32, f32, f32) {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let d00 = v0.dot(&v0);
    let d01 = v0.dot(&v1);
    let d11 = v1.dot(&v1);
    let d20 = v2.dot(&v0);
    let d21 = v2.dot(&v1);
    let denom = d00 * d11 - d01 * d01;
    if denom.abs() < EPSILON * EPSILON {
        return (1.0, 0.0, 0.0);
    }
    let v = (d11 * d20 - d01 * d21) / denom;
    let w = (d00 * d21 - d01 * d20) / denom;
    (1.0 - v - w, v, w)
}

/// Fixed sample directions: the six axes, twelve edge diagonals and eight corners
fn sample_directions() -> Vec<Vector3> {
    let mut dirs = Vec::with_capacity(26);
    for x in -1i32..=1 {
        for y in -1i32..=1 {
            for z in -1i32..=1 {
                if x == 0 && y == 0 && z == 0 {
                    continue;
                }
                dirs.push(Vector3::new(x as f32, y as f32, z as f32).normalize());
            }
        }
    }
    dirs
}

/// Minimises the support function of the Minkowski difference over a fixed
/// direction set. The minimum over all directions is the exact depth; the
/// sampled minimum is an upper bound.
fn sample_penetration(minkowski: &MinkowskiDifference) -> Option<PenetrationResult> {
    let mut directions = sample_directions();
    for transform in [minkowski.transform_a, minkowski.transform_b] {
        let basis = transform.basis();
        for axis in 0..3 {
            let column: Vector3 = basis.column(axis).into();
            directions.push(column);
            directions.push(-column);
        }
    }

    let mut best: Option<(f32, Vector3, SupportVertex)> = None;
    for dir in directions.iter() {
        let support = minkowski.support(dir);
        let h = support.w.dot(dir);
        if best.map_or(true, |(best_h, _, _)| h < best_h) {
            best = Some((h, *dir, support));
        }
    }

    let (depth, dir, support) = best?;
    if depth < 0.0 {
        return None;
    }
    Some(PenetrationResult {
        point_on_a: support.a,
        point_on_b: support.a - dir * depth,
        normal_on_b: -dir,
        depth,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn overlapping_boxes_depth() {
        let a = CollisionShape::new_box(Vector3::repeat(1.0)).unwrap();
        let b = CollisionShape::new_box(Vector3::repeat(1.0)).unwrap();
        let result = calc_penetration_depth(
            &a,
            &Transform::from_position(Vector3::new(0.0, 1.5, 0.0)),
            &b,
            &Transform::identity(),
            64,
        )
        .unwrap();
        assert_relative_eq!(result.depth, 0.5, epsilon = 1e-3);
        assert_relative_eq!(result.normal_on_b, Vector3::y(), epsilon = 1e-3);
        let separation = result.point_on_a - result.point_on_b;
        assert_relative_eq!(separation, -result.normal_on_b * result.depth, epsilon = 1e-3);
    }

    #[test]
    fn separated_shapes_report_none() {
        let a = CollisionShape::new_box(Vector3::repeat(1.0)).unwrap();
        let result = calc_penetration_depth(
            &a,
            &Transform::from_position(Vector3::new(5.0, 0.0, 0.0)),
            &a,
            &Transform::identity(),
            64,
        );
        assert!(result.is_none());
    }

    #[test]
    fn sampling_bounds_depth() {
        let a = CollisionShape::new_box(Vector3::repeat(1.0)).unwrap();
        let ta = Transform::from_position(Vector3::new(0.3, 0.0, 0.0));
        let tb = Transform::identity();
        let minkowski = MinkowskiDifference {
            shape_a: &a,
            transform_a: &ta,
            shape_b: &a,
            transform_b: &tb,
        };
        let result = sample_penetration(&minkowski).unwrap();
        assert_relative_eq!(result.depth, 1.7, epsilon = 1e-3);
        assert_relative_eq!(result.normal_on_b, Vector3::x(), epsilon = 1e-3);
    }
}
