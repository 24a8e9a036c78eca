use log::debug;

use crate::bodies::ActivationState;
use crate::constraints::{Constraint, ConstraintKind, ConstraintSetting, Point2PointConstraint, PICKING_TAU};
use crate::core::{BodyHandle, ConstraintHandle, PhysicsWorld};
use crate::math::{Vector3, EPSILON};

/// The body held by the user and the soft constraint dragging it
#[derive(Debug, Clone, Copy)]
pub(crate) struct PickState {
    pub(crate) body: BodyHandle,
    pub(crate) constraint: ConstraintHandle,

    /// Distance from the ray origin to the hit point when picked
    pub(crate) distance: f32,
}

impl PhysicsWorld {
    /// Ray tests `from -> to` and pins the nearest dynamic body at the hit
    /// point to the world with a soft point-to-point constraint. Any earlier
    /// pick is released first.
    pub fn pick_body(&mut self, from: Vector3, to: Vector3) -> Option<BodyHandle> {
        self.release_pick();

        let hit = self.ray_test(from, to)?;
        let body = self.bodies.get_mut(hit.body)?;
        if !body.is_dynamic() {
            return None;
        }
        body.force_activation_state(ActivationState::DisableDeactivation);
        let pivot_in_a = body.get_transform().inverse_transform_point(&hit.point);

        let setting = ConstraintSetting {
            tau: PICKING_TAU,
            ..ConstraintSetting::default()
        };
        let p2p = Point2PointConstraint::with_setting(pivot_in_a, hit.point, setting);
        let constraint = self.insert_constraint(Constraint::new(hit.body, None, ConstraintKind::PointToPoint(p2p)));

        self.pick = Some(PickState {
            body: hit.body,
            constraint,
            distance: (hit.point - from).norm(),
        });
        debug!("picked {} at {:?}", hit.body, hit.point);
        Some(hit.body)
    }

    /// Moves the world anchor of the current pick
    pub fn move_pick(&mut self, target: Vector3) -> bool {
        let Some(pick) = self.pick else {
            return false;
        };
        let Some(p2p) = self
            .constraints
            .get_mut(pick.constraint)
            .and_then(|c| c.as_point_to_point_mut())
        else {
            return false;
        };
        p2p.set_pivot_b(target);
        true
    }

    /// Moves the pick anchor onto a new ray, at the distance it was picked from
    pub fn move_pick_along_ray(&mut self, from: Vector3, to: Vector3) -> bool {
        let Some(pick) = self.pick else {
            return false;
        };
        let direction = to - from;
        let length = direction.norm();
        if length < EPSILON {
            return false;
        }
        self.move_pick(from + direction * (pick.distance / length))
    }

    /// Drops the pick constraint and lets the body sleep again
    pub fn release_pick(&mut self) -> Option<BodyHandle> {
        let pick = self.pick.take()?;
        self.constraints.remove(pick.constraint);
        if let Some(body) = self.bodies.get_mut(pick.body) {
            body.force_activation_state(ActivationState::Active);
        }
        debug!("released {}", pick.body);
        Some(pick.body)
    }

    /// The body currently held, if any
    pub fn picked_body(&self) -> Option<BodyHandle> {
        self.pick.map(|pick| pick.body)
    }
}
