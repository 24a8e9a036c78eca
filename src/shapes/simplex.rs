use crate::math::Vector3;

/// Convex hull of one to four points: a point, segment, triangle or tetrahedron
#[derive(Debug, Clone, PartialEq)]
pub struct SimplexShape {
    vertices: Vec<Vector3>,
}

impl SimplexShape {
    pub(crate) fn new(vertices: Vec<Vector3>) -> Self {
        Self { vertices }
    }

    /// The vertices of the simplex in local space
    pub fn vertices(&self) -> &[Vector3] {
        &self.vertices
    }

    pub(crate) fn support_without_margin(&self, direction: &Vector3) -> Vector3 {
        let mut best = self.vertices[0];
        let mut best_dot = best.dot(direction);
        for vertex in &self.vertices[1..] {
            let d = vertex.dot(direction);
            if d > best_dot {
                best_dot = d;
                best = *vertex;
            }
        }
        best
    }
}
