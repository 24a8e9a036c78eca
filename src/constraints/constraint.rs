use crate::bodies::RigidBody;
use crate::constraints::{HingeConstraint, Point2PointConstraint};
use crate::core::BodyHandle;
use crate::math::{Transform, Vector3};

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Kinds of user constraints a world can create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub enum ConstraintType {
    PointToPoint,
    Hinge,
}

/// Constraint payload
#[derive(Debug, Clone)]
pub enum ConstraintKind {
    PointToPoint(Point2PointConstraint),
    Hinge(HingeConstraint),
}

impl ConstraintKind {
    pub fn constraint_type(&self) -> ConstraintType {
        match self {
            ConstraintKind::PointToPoint(_) => ConstraintType::PointToPoint,
            ConstraintKind::Hinge(_) => ConstraintType::Hinge,
        }
    }
}

/// A joint between body A and either body B or the fixed world frame
#[derive(Debug, Clone)]
pub struct Constraint {
    body_a: BodyHandle,
    body_b: Option<BodyHandle>,
    kind: ConstraintKind,
}

impl Constraint {
    pub fn new(body_a: BodyHandle, body_b: Option<BodyHandle>, kind: ConstraintKind) -> Self {
        Self { body_a, body_b, kind }
    }

    pub fn get_body_a(&self) -> BodyHandle {
        self.body_a
    }

    /// The second body, `None` when anchored to the world
    pub fn get_body_b(&self) -> Option<BodyHandle> {
        self.body_b
    }

    /// Checks if the constraint involves a specific body
    pub fn involves_body(&self, body: BodyHandle) -> bool {
        self.body_a == body || self.body_b == Some(body)
    }

    pub fn constraint_type(&self) -> ConstraintType {
        self.kind.constraint_type()
    }

    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    pub fn kind_mut(&mut self) -> &mut ConstraintKind {
        &mut self.kind
    }

    pub fn as_point_to_point(&self) -> Option<&Point2PointConstraint> {
        match &self.kind {
            ConstraintKind::PointToPoint(p2p) => Some(p2p),
            _ => None,
        }
    }

    pub fn as_point_to_point_mut(&mut self) -> Option<&mut Point2PointConstraint> {
        match &mut self.kind {
            ConstraintKind::PointToPoint(p2p) => Some(p2p),
            _ => None,
        }
    }

    pub fn as_hinge(&self) -> Option<&HingeConstraint> {
        match &self.kind {
            ConstraintKind::Hinge(hinge) => Some(hinge),
            _ => None,
        }
    }

    pub fn as_hinge_mut(&mut self) -> Option<&mut HingeConstraint> {
        match &mut self.kind {
            ConstraintKind::Hinge(hinge) => Some(hinge),
            _ => None,
        }
    }

    /// Impulse applied during the last step
    pub fn get_applied_impulse(&self) -> f32 {
        match &self.kind {
            ConstraintKind::PointToPoint(p2p) => p2p.get_applied_impulse(),
            ConstraintKind::Hinge(hinge) => hinge.get_applied_impulse(),
        }
    }

    /// World space pivots on A and on B (or the world)
    pub fn pivots_in_world(&self, a: &Transform, b: Option<&Transform>) -> (Vector3, Vector3) {
        match &self.kind {
            ConstraintKind::PointToPoint(p2p) => p2p.pivots_in_world(a, b),
            ConstraintKind::Hinge(hinge) => hinge.pivots_in_world(a, b),
        }
    }

    /// Prepares the constraint for solving
    pub(crate) fn build_jacobian(&mut self, a: &RigidBody, b: Option<&RigidBody>) {
        match &mut self.kind {
            ConstraintKind::PointToPoint(p2p) => p2p.build_jacobian(a, b),
            ConstraintKind::Hinge(hinge) => hinge.build_jacobian(a, b),
        }
    }

    /// One solver pass
    pub(crate) fn solve(&mut self, a: &mut RigidBody, b: Option<&mut RigidBody>, dt: f32) {
        match &mut self.kind {
            ConstraintKind::PointToPoint(p2p) => p2p.solve(a, b, dt),
            ConstraintKind::Hinge(hinge) => hinge.solve(a, b, dt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_type_and_bodies() {
        let a = BodyHandle::new(0, 0);
        let b = BodyHandle::new(3, 1);
        let constraint = Constraint::new(
            a,
            Some(b),
            ConstraintKind::PointToPoint(Point2PointConstraint::new(Vector3::zeros(), Vector3::zeros())),
        );
        assert_eq!(constraint.constraint_type(), ConstraintType::PointToPoint);
        assert!(constraint.involves_body(b));
        assert!(!constraint.involves_body(BodyHandle::new(3, 0)));
        assert!(constraint.as_hinge().is_none());
    }
}
