use crate::bodies::RigidBody;
use crate::collision::{ManifoldPoint, PersistentManifold};
use crate::constraints::JacobianEntry;
use crate::math::{plane_space, Vector3};

/// Per-step parameters of the contact solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactSolverInfo {
    pub time_step: f32,

    /// Baumgarte factor applied to penetration beyond the slop
    pub erp: f32,

    /// Penetration tolerated without positional correction
    pub slop: f32,

    /// Approach speed below which contacts do not bounce
    pub restitution_velocity_threshold: f32,

    /// Scale on impulses carried over from the previous step
    pub warm_starting_factor: f32,
}

impl Default for ContactSolverInfo {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 60.0,
            erp: 0.2,
            slop: 0.01,
            restitution_velocity_threshold: 0.5,
            warm_starting_factor: 0.85,
        }
    }
}

fn relative_positions(point: &ManifoldPoint, a: &RigidBody, b: &RigidBody) -> (Vector3, Vector3) {
    (
        point.position_world_on_a - a.get_position(),
        point.position_world_on_b - b.get_position(),
    )
}

fn relative_velocity(a: &RigidBody, b: &RigidBody, rel_a: &Vector3, rel_b: &Vector3) -> Vector3 {
    a.get_velocity_in_local_point(rel_a) - b.get_velocity_in_local_point(rel_b)
}

fn apply_pair_impulse(a: &mut RigidBody, b: &mut RigidBody, impulse: &Vector3, rel_a: &Vector3, rel_b: &Vector3) {
    a.apply_solver_impulse(impulse, rel_a);
    b.apply_solver_impulse(&-impulse, rel_b);
}

/// Computes the effective masses of every point and applies the scaled
/// impulses of the previous step.
pub fn prepare_manifold(manifold: &mut PersistentManifold, a: &mut RigidBody, b: &mut RigidBody, info: &ContactSolverInfo) {
    for point in manifold.points_mut() {
        let (rel_a, rel_b) = relative_positions(point, a, b);
        let normal = point.normal_world_on_b;
        let jacobian = |axis: &Vector3| {
            JacobianEntry::new(
                &rel_a,
                &rel_b,
                axis,
                a.get_inv_inertia_tensor_world(),
                a.get_inverse_mass(),
                b.get_inv_inertia_tensor_world(),
                b.get_inverse_mass(),
            )
            .diagonal_inverse()
        };

        point.jac_diag_inv = jacobian(&normal);
        let (t0, t1) = plane_space(&normal);
        point.friction_tangents = [t0, t1];
        point.friction_jac_diag_inv = [jacobian(&t0), jacobian(&t1)];

        let approach = -normal.dot(&relative_velocity(a, b, &rel_a, &rel_b));
        point.restitution_velocity = if approach > info.restitution_velocity_threshold {
            approach * point.combined_restitution
        } else {
            0.0
        };

        point.applied_impulse *= info.warm_starting_factor;
        point.applied_friction_impulse[0] *= info.warm_starting_factor;
        point.applied_friction_impulse[1] *= info.warm_starting_factor;
        let impulse = normal * point.applied_impulse
            + t0 * point.applied_friction_impulse[0]
            + t1 * point.applied_friction_impulse[1];
        apply_pair_impulse(a, b, &impulse, &rel_a, &rel_b);
    }
}

/// One sequential impulse pass over the points of a manifold.
///
/// The accumulated normal impulse never pulls the bodies together and
/// friction is clamped to the friction cone approximated by a box.
pub fn solve_manifold(manifold: &mut PersistentManifold, a: &mut RigidBody, b: &mut RigidBody, info: &ContactSolverInfo) {
    for point in manifold.points_mut() {
        let (rel_a, rel_b) = relative_positions(point, a, b);
        let normal = point.normal_world_on_b;

        let rel_vel = normal.dot(&relative_velocity(a, b, &rel_a, &rel_b));
        let penetration = -point.distance;
        let positional_error = if penetration > info.slop {
            info.erp * (penetration - info.slop) / info.time_step
        } else if point.distance > 0.0 {
            // speculative contact: allow closing the gap within this step
            -point.distance / info.time_step
        } else {
            0.0
        };
        let velocity_error = point.restitution_velocity - rel_vel;

        let delta = (positional_error + velocity_error) * point.jac_diag_inv;
        let old = point.applied_impulse;
        point.applied_impulse = (old + delta).max(0.0);
        let applied = point.applied_impulse - old;
        apply_pair_impulse(a, b, &(normal * applied), &rel_a, &rel_b);

        let limit = point.combined_friction * point.applied_impulse;
        for k in 0..2 {
            let tangent = point.friction_tangents[k];
            let rel_vel = tangent.dot(&relative_velocity(a, b, &rel_a, &rel_b));
            let delta = -rel_vel * point.friction_jac_diag_inv[k];
            let old = point.applied_friction_impulse[k];
            point.applied_friction_impulse[k] = (old + delta).clamp(-limit, limit);
            let applied = point.applied_friction_impulse[k] - old;
            apply_pair_impulse(a, b, &(tangent * applied), &rel_a, &rel_b);
        }
    }
}
