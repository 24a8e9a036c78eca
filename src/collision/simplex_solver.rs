//! Voronoi simplex solver used by GJK.
//!
//! Holds up to four points of the Minkowski difference together with the
//! support points on both shapes they came from, and computes the point of
//! the simplex closest to the origin with barycentric coordinates so the
//! witness points on each shape can be reconstructed.

use log::debug;

use crate::math::{Vector3, LARGE_FLOAT};

const MAX_VERTICES: usize = 4;

const VERTEX_A: u8 = 1;
const VERTEX_B: u8 = 2;
const VERTEX_C: u8 = 4;
const VERTEX_D: u8 = 8;

/// Squared distance below which two Minkowski points count as the same vertex
const EQUAL_VERTEX_THRESHOLD: f32 = 1.0e-10;

/// Default bound on the sine of a tetrahedron vertex's elevation above the
/// opposite face, below which the tetrahedron counts as flat
pub const DEFAULT_DEGENERATE_TOLERANCE: f32 = 1.0e-4;

#[derive(Debug, Clone, Copy)]
struct SubSimplexClosestResult {
    closest_point: Vector3,
    used_vertices: u8,
    barycentric: [f32; 4],
    degenerate: bool,
}

impl Default for SubSimplexClosestResult {
    fn default() -> Self {
        Self {
            closest_point: Vector3::zeros(),
            used_vertices: 0,
            barycentric: [0.0; 4],
            degenerate: false,
        }
    }
}

impl SubSimplexClosestResult {
    fn set_barycentric(&mut self, a: f32, b: f32, c: f32, d: f32) {
        self.barycentric = [a, b, c, d];
    }

    fn is_valid(&self) -> bool {
        self.barycentric.iter().all(|&c| c >= 0.0)
    }
}

/// Result of classifying a point against a tetrahedron face
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaneSide {
    Inside,
    Outside,
    /// The opposite vertex lies (almost) on the face plane
    Degenerate,
}

/// Incremental simplex solver for GJK
#[derive(Debug, Clone)]
pub struct VoronoiSimplexSolver {
    num_vertices: usize,
    simplex_w: [Vector3; MAX_VERTICES],
    simplex_p: [Vector3; MAX_VERTICES],
    simplex_q: [Vector3; MAX_VERTICES],

    cached_p1: Vector3,
    cached_p2: Vector3,
    cached_v: Vector3,
    last_w: Vector3,
    cached_valid_closest: bool,
    needs_update: bool,
    cached_bc: SubSimplexClosestResult,

    degenerate_tolerance: f32,
    degenerate_fallbacks: u32,
}

impl Default for VoronoiSimplexSolver {
    fn default() -> Self {
        Self::new(DEFAULT_DEGENERATE_TOLERANCE)
    }
}

impl VoronoiSimplexSolver {
    /// Creates an empty solver.
    ///
    /// `degenerate_tolerance` bounds the sine of the angle between a vertex
    /// and its opposite face below which a tetrahedron is treated as flat.
    /// The test is independent of the size of the shapes.
    pub fn new(degenerate_tolerance: f32) -> Self {
        Self {
            num_vertices: 0,
            simplex_w: [Vector3::zeros(); MAX_VERTICES],
            simplex_p: [Vector3::zeros(); MAX_VERTICES],
            simplex_q: [Vector3::zeros(); MAX_VERTICES],
            cached_p1: Vector3::zeros(),
            cached_p2: Vector3::zeros(),
            cached_v: Vector3::zeros(),
            last_w: Vector3::repeat(LARGE_FLOAT),
            cached_valid_closest: false,
            needs_update: true,
            cached_bc: SubSimplexClosestResult::default(),
            degenerate_tolerance,
            degenerate_fallbacks: 0,
        }
    }

    /// Empties the simplex
    pub fn reset(&mut self) {
        self.cached_valid_closest = false;
        self.num_vertices = 0;
        self.needs_update = true;
        self.last_w = Vector3::repeat(LARGE_FLOAT);
        self.cached_bc = SubSimplexClosestResult::default();
    }

    /// Adds a Minkowski point `w = p - q` with its support points `p` on A and `q` on B
    pub fn add_vertex(&mut self, w: Vector3, p: Vector3, q: Vector3) {
        debug_assert!(self.num_vertices < MAX_VERTICES, "simplex is already full");
        self.last_w = w;
        self.needs_update = true;

        self.simplex_w[self.num_vertices] = w;
        self.simplex_p[self.num_vertices] = p;
        self.simplex_q[self.num_vertices] = q;
        self.num_vertices += 1;
    }

    /// Computes the point of the simplex closest to the origin into `v`.
    ///
    /// Returns false when no valid closest point exists.
    pub fn closest(&mut self, v: &mut Vector3) -> bool {
        let valid = self.update_closest_vector_and_points();
        *v = self.cached_v;
        valid
    }

    /// Writes the last computed closest point into `v`
    pub fn backup_closest(&self, v: &mut Vector3) {
        *v = self.cached_v;
    }

    /// Largest squared length among the simplex points
    pub fn max_vertex(&self) -> f32 {
        self.simplex_w[..self.num_vertices]
            .iter()
            .map(|w| w.norm_squared())
            .fold(0.0, f32::max)
    }

    /// Returns true if `w` is already part of the simplex
    pub fn in_simplex(&self, w: &Vector3) -> bool {
        self.simplex_w[..self.num_vertices]
            .iter()
            .any(|sw| (sw - w).norm_squared() <= EQUAL_VERTEX_THRESHOLD)
            || *w == self.last_w
    }

    /// Returns true if the simplex has four points
    pub fn full_simplex(&self) -> bool {
        self.num_vertices == MAX_VERTICES
    }

    /// Returns true if the simplex has no points
    pub fn empty_simplex(&self) -> bool {
        self.num_vertices == 0
    }

    /// Number of points in the simplex
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Witness points on A and B for the current closest point
    pub fn compute_points(&mut self) -> (Vector3, Vector3) {
        self.update_closest_vector_and_points();
        (self.cached_p1, self.cached_p2)
    }

    /// Current simplex as Minkowski points and their support points on A and B
    pub fn simplex_points(&self) -> (&[Vector3], &[Vector3], &[Vector3]) {
        let n = self.num_vertices;
        (&self.simplex_w[..n], &self.simplex_p[..n], &self.simplex_q[..n])
    }

    /// Number of times a flat tetrahedron was resolved by the closest-face fallback
    pub fn degenerate_fallbacks(&self) -> u32 {
        self.degenerate_fallbacks
    }

    fn remove_vertex(&mut self, index: usize) {
        debug_assert!(self.num_vertices > 0);
        self.num_vertices -= 1;
        let last = self.num_vertices;
        self.simplex_w[index] = self.simplex_w[last];
        self.simplex_p[index] = self.simplex_p[last];
        self.simplex_q[index] = self.simplex_q[last];
    }

    fn reduce_vertices(&mut self, used: u8) {
        if self.num_vertices >= 4 && used & VERTEX_D == 0 {
            self.remove_vertex(3);
        }
        if self.num_vertices >= 3 && used & VERTEX_C == 0 {
            self.remove_vertex(2);
        }
        if self.num_vertices >= 2 && used & VERTEX_B == 0 {
            self.remove_vertex(1);
        }
        if self.num_vertices >= 1 && used & VERTEX_A == 0 {
            self.remove_vertex(0);
        }
    }

    fn weighted_points(&self, bary: &[f32; 4], count: usize) -> (Vector3, Vector3) {
        let mut p1 = Vector3::zeros();
        let mut p2 = Vector3::zeros();
        for i in 0..count {
            p1 += self.simplex_p[i] * bary[i];
            p2 += self.simplex_q[i] * bary[i];
        }
        (p1, p2)
    }

    fn update_closest_vector_and_points(&mut self) -> bool {
        if !self.needs_update {
            return self.cached_valid_closest;
        }
        self.cached_bc = SubSimplexClosestResult::default();
        self.needs_update = false;

        match self.num_vertices {
            0 => {
                self.cached_valid_closest = false;
            }
            1 => {
                self.cached_p1 = self.simplex_p[0];
                self.cached_p2 = self.simplex_q[0];
                self.cached_v = self.cached_p1 - self.cached_p2;
                self.cached_bc.set_barycentric(1.0, 0.0, 0.0, 0.0);
                self.cached_valid_closest = self.cached_bc.is_valid();
            }
            2 => {
                let from = self.simplex_w[0];
                let to = self.simplex_w[1];
                let v = to - from;
                let mut t = v.dot(&-from);

                if t > 0.0 {
                    let dot_vv = v.norm_squared();
                    if t < dot_vv {
                        t /= dot_vv;
                        self.cached_bc.used_vertices = VERTEX_A | VERTEX_B;
                    } else {
                        t = 1.0;
                        self.cached_bc.used_vertices = VERTEX_B;
                    }
                } else {
                    t = 0.0;
                    self.cached_bc.used_vertices = VERTEX_A;
                }
                self.cached_bc.set_barycentric(1.0 - t, t, 0.0, 0.0);

                self.cached_p1 = self.simplex_p[0] + (self.simplex_p[1] - self.simplex_p[0]) * t;
                self.cached_p2 = self.simplex_q[0] + (self.simplex_q[1] - self.simplex_q[0]) * t;
                self.cached_v = self.cached_p1 - self.cached_p2;

                self.reduce_vertices(self.cached_bc.used_vertices);
                self.cached_valid_closest = self.cached_bc.is_valid();
            }
            3 => {
                let [a, b, c, _] = self.simplex_w;
                closest_pt_point_triangle(&Vector3::zeros(), &a, &b, &c, &mut self.cached_bc);

                let (p1, p2) = self.weighted_points(&self.cached_bc.barycentric, 3);
                self.cached_p1 = p1;
                self.cached_p2 = p2;
                self.cached_v = p1 - p2;

                self.reduce_vertices(self.cached_bc.used_vertices);
                self.cached_valid_closest = self.cached_bc.is_valid();
            }
            4 => {
                let [a, b, c, d] = self.simplex_w;
                let separated = closest_pt_point_tetrahedron(
                    &Vector3::zeros(),
                    &a,
                    &b,
                    &c,
                    &d,
                    self.degenerate_tolerance,
                    &mut self.cached_bc,
                );

                if !separated && !self.cached_bc.degenerate {
                    // origin inside the tetrahedron: the shapes overlap
                    self.cached_valid_closest = true;
                    self.cached_v = Vector3::zeros();
                    return true;
                }

                if self.cached_bc.degenerate {
                    self.degenerate_fallbacks += 1;
                    if flat_tetrahedron_contains_origin(&[a, b, c, d]) {
                        debug!("flat tetrahedron in simplex encloses the origin");
                        self.cached_valid_closest = true;
                        self.cached_v = Vector3::zeros();
                        return true;
                    }
                    debug!("flat tetrahedron in simplex, using closest-face fallback");
                    closest_pt_flat_tetrahedron(&a, &b, &c, &d, &mut self.cached_bc);
                }

                let (p1, p2) = self.weighted_points(&self.cached_bc.barycentric, 4);
                self.cached_p1 = p1;
                self.cached_p2 = p2;
                self.cached_v = p1 - p2;

                self.reduce_vertices(self.cached_bc.used_vertices);
                self.cached_valid_closest = self.cached_bc.is_valid();
            }
            _ => {
                self.cached_valid_closest = false;
            }
        }

        self.cached_valid_closest
    }
}

/// Closest point on segment `ab` to `p`, as the parameter along `ab`
fn closest_on_segment(p: &Vector3, a: &Vector3, b: &Vector3) -> f32 {
    let ab = b - a;
    let len_sq = ab.norm_squared();
    if len_sq <= f32::EPSILON {
        return 0.0;
    }
    ((p - a).dot(&ab) / len_sq).clamp(0.0, 1.0)
}

/// Closest point of triangle `abc` to `p` by Voronoi region classification
fn closest_pt_point_triangle(
    p: &Vector3,
    a: &Vector3,
    b: &Vector3,
    c: &Vector3,
    result: &mut SubSimplexClosestResult,
) {
    result.used_vertices = 0;

    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        result.closest_point = *a;
        result.used_vertices = VERTEX_A;
        result.set_barycentric(1.0, 0.0, 0.0, 0.0);
        return;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        result.closest_point = *b;
        result.used_vertices = VERTEX_B;
        result.set_barycentric(0.0, 1.0, 0.0, 0.0);
        return;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        result.closest_point = a + ab * v;
        result.used_vertices = VERTEX_A | VERTEX_B;
        result.set_barycentric(1.0 - v, v, 0.0, 0.0);
        return;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        result.closest_point = *c;
        result.used_vertices = VERTEX_C;
        result.set_barycentric(0.0, 0.0, 1.0, 0.0);
        return;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        result.closest_point = a + ac * w;
        result.used_vertices = VERTEX_A | VERTEX_C;
        result.set_barycentric(1.0 - w, 0.0, w, 0.0);
        return;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        result.closest_point = b + (c - b) * w;
        result.used_vertices = VERTEX_B | VERTEX_C;
        result.set_barycentric(0.0, 1.0 - w, w, 0.0);
        return;
    }

    let sum = va + vb + vc;
    if sum.abs() <= f32::EPSILON * (ab.norm_squared() * ac.norm_squared()).max(f32::MIN_POSITIVE) {
        // zero-area triangle: the answer lies on one of its edges
        closest_pt_on_edges(p, a, b, c, result);
        return;
    }

    let denom = 1.0 / sum;
    let v = vb * denom;
    let w = vc * denom;
    result.closest_point = a + ab * v + ac * w;
    result.used_vertices = VERTEX_A | VERTEX_B | VERTEX_C;
    result.set_barycentric(1.0 - v - w, v, w, 0.0);
}

fn closest_pt_on_edges(p: &Vector3, a: &Vector3, b: &Vector3, c: &Vector3, result: &mut SubSimplexClosestResult) {
    let edges = [(a, b, VERTEX_A, VERTEX_B), (a, c, VERTEX_A, VERTEX_C), (b, c, VERTEX_B, VERTEX_C)];
    let mut best = LARGE_FLOAT;
    for (from, to, first, second) in edges {
        let t = closest_on_segment(p, from, to);
        let q = from + (to - from) * t;
        let dist = (q - p).norm_squared();
        if dist < best {
            best = dist;
            result.closest_point = q;
            let mut bary = [0.0f32; 4];
            bary[first.trailing_zeros() as usize] = 1.0 - t;
            bary[second.trailing_zeros() as usize] = t;
            result.barycentric = bary;
            result.used_vertices = match (t > 0.0, t < 1.0) {
                (true, true) => first | second,
                (true, false) => second,
                _ => first,
            };
        }
    }
}

/// Which side of plane `abc` the point `p` is on, relative to the opposite vertex `d`
fn point_outside_of_plane(
    p: &Vector3,
    a: &Vector3,
    b: &Vector3,
    c: &Vector3,
    d: &Vector3,
    tolerance: f32,
) -> PlaneSide {
    let normal = (b - a).cross(&(c - a));
    let ad = d - a;
    let sign_p = (p - a).dot(&normal);
    let sign_d = ad.dot(&normal);

    // sine of the elevation of d above the face, squared
    if sign_d * sign_d <= tolerance * tolerance * normal.norm_squared() * ad.norm_squared() {
        return PlaneSide::Degenerate;
    }
    if sign_p * sign_d < 0.0 {
        PlaneSide::Outside
    } else {
        PlaneSide::Inside
    }
}

/// Maps a triangle result onto tetrahedron vertex slots
fn map_face_result(
    tri: &SubSimplexClosestResult,
    slots: [usize; 3],
    result: &mut SubSimplexClosestResult,
) {
    result.closest_point = tri.closest_point;
    result.used_vertices = 0;
    result.barycentric = [0.0; 4];
    for (i, &slot) in slots.iter().enumerate() {
        if tri.used_vertices & (1 << i) != 0 {
            result.used_vertices |= 1 << slot;
        }
        result.barycentric[slot] = tri.barycentric[i];
    }
}

const TETRA_FACES: [[usize; 4]; 4] = [
    // face vertices, then the opposite vertex
    [0, 1, 2, 3],
    [0, 2, 3, 1],
    [0, 3, 1, 2],
    [1, 3, 2, 0],
];

/// Closest point of tetrahedron `abcd` to `p`.
///
/// Returns false if `p` is inside, or if the tetrahedron is flat, in which
/// case `result.degenerate` is set.
fn closest_pt_point_tetrahedron(
    p: &Vector3,
    a: &Vector3,
    b: &Vector3,
    c: &Vector3,
    d: &Vector3,
    tolerance: f32,
    result: &mut SubSimplexClosestResult,
) -> bool {
    let verts = [a, b, c, d];
    result.closest_point = *p;
    result.used_vertices = VERTEX_A | VERTEX_B | VERTEX_C | VERTEX_D;

    let mut sides = [PlaneSide::Inside; 4];
    for (side, face) in sides.iter_mut().zip(TETRA_FACES.iter()) {
        *side = point_outside_of_plane(p, verts[face[0]], verts[face[1]], verts[face[2]], verts[face[3]], tolerance);
    }

    if sides.contains(&PlaneSide::Degenerate) {
        result.degenerate = true;
        return false;
    }
    if !sides.contains(&PlaneSide::Outside) {
        return false;
    }

    let mut best_sq = LARGE_FLOAT;
    for (side, face) in sides.iter().zip(TETRA_FACES.iter()) {
        if *side != PlaneSide::Outside {
            continue;
        }
        let mut tri = SubSimplexClosestResult::default();
        closest_pt_point_triangle(p, verts[face[0]], verts[face[1]], verts[face[2]], &mut tri);
        let sq = (tri.closest_point - p).norm_squared();
        if sq < best_sq {
            best_sq = sq;
            map_face_result(&tri, [face[0], face[1], face[2]], result);
        }
    }
    true
}

/// Whether the origin lies inside a flat tetrahedron: within the slab spanned
/// by its vertices along the best face normal, and inside its outline once
/// projected onto that plane.
fn flat_tetrahedron_contains_origin(verts: &[Vector3; 4]) -> bool {
    let normal = TETRA_FACES
        .iter()
        .map(|f| (verts[f[1]] - verts[f[0]]).cross(&(verts[f[2]] - verts[f[0]])))
        .max_by(|x, y| x.norm_squared().total_cmp(&y.norm_squared()));
    let normal = match normal.and_then(|n| n.try_normalize(f32::MIN_POSITIVE)) {
        Some(n) => n,
        // all four points on a line
        None => return false,
    };

    let heights = [0, 1, 2, 3].map(|i| verts[i].dot(&normal));
    let lowest = heights.iter().copied().fold(f32::INFINITY, f32::min);
    let highest = heights.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if lowest > 0.0 || highest < 0.0 {
        return false;
    }

    let projected = [0, 1, 2, 3].map(|i| verts[i] - normal * heights[i]);
    let extent = projected.iter().map(|q| q.norm_squared()).fold(0.0, f32::max);
    let origin = Vector3::zeros();
    TETRA_FACES.iter().any(|f| {
        let mut tri = SubSimplexClosestResult::default();
        closest_pt_point_triangle(&origin, &projected[f[0]], &projected[f[1]], &projected[f[2]], &mut tri);
        tri.closest_point.norm_squared() <= EQUAL_VERTEX_THRESHOLD * extent
    })
}

/// Closest-feature search over all four faces of a flat tetrahedron.
///
/// A nearly coplanar tetrahedron has no reliable inside/outside classification,
/// so every face is tested and the nearest point wins.
fn closest_pt_flat_tetrahedron(
    a: &Vector3,
    b: &Vector3,
    c: &Vector3,
    d: &Vector3,
    result: &mut SubSimplexClosestResult,
) {
    let verts = [a, b, c, d];
    let origin = Vector3::zeros();
    let mut best_sq = LARGE_FLOAT;
    let mut best = SubSimplexClosestResult::default();

    for face in TETRA_FACES.iter() {
        let mut tri = SubSimplexClosestResult::default();
        closest_pt_point_triangle(&origin, verts[face[0]], verts[face[1]], verts[face[2]], &mut tri);
        let sq = tri.closest_point.norm_squared();
        if sq < best_sq {
            best_sq = sq;
            map_face_result(&tri, [face[0], face[1], face[2]], &mut best);
        }
    }

    best.degenerate = true;
    *result = best;
}
