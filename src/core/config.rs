use crate::collision::{
    BroadphaseType, DispatcherInfo, GjkConfig, DEFAULT_CONTACT_BREAKING_THRESHOLD, DEFAULT_CONTACT_STALENESS_THRESHOLD,
    DEFAULT_EPA_ITERATIONS,
};
use crate::constraints::ContactSolverInfo;
use crate::error::PhysicsError;
use crate::math::{is_finite, Vector3};
use crate::Result;

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Configuration parameters for the physics simulation
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct SimulationConfig {
    /// The fixed time step used by `PhysicsWorld::step`
    pub time_step: f32,

    /// The maximum number of substeps per call to `PhysicsWorld::step`
    pub max_substeps: u32,

    /// World gravity, applied to bodies without their own override
    pub gravity: Vector3,

    /// Sequential impulse passes per step
    pub solver_iterations: u32,

    /// The linear velocity threshold below which bodies can sleep
    pub linear_sleep_threshold: f32,

    /// The angular velocity threshold below which bodies can sleep
    pub angular_sleep_threshold: f32,

    /// The time a body must be slow before it wants to sleep
    pub deactivation_time: f32,

    /// Whether bodies may fall asleep at all
    pub deactivation_enabled: bool,

    /// The bias factor for contact position correction (Baumgarte stabilization)
    pub constraint_bias_factor: f32,

    /// Penetration tolerated before position correction
    pub contact_penetration_threshold: f32,

    /// Approach speed below which contacts do not bounce
    pub restitution_velocity_threshold: f32,

    /// Scale on contact impulses carried over from the previous step
    pub warm_starting_factor: f32,

    /// Distance within which contact points are kept
    pub contact_breaking_threshold: f32,

    /// Steps a contact point may go unreported by the narrow phase before it is dropped
    pub contact_staleness_threshold: u32,

    /// Extra perturbed queries for polyhedral pairs with few contacts
    pub perturbation_iterations: u32,
    pub perturbation_min_points: usize,

    pub gjk: GjkConfig,
    pub epa_max_iterations: u32,

    /// Broadphase implementation and its capacity
    pub broadphase: BroadphaseType,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            time_step: 1.0 / 60.0,
            max_substeps: 10,
            gravity: Vector3::new(0.0, -10.0, 0.0),
            solver_iterations: 10,
            linear_sleep_threshold: 0.8,
            angular_sleep_threshold: 1.0,
            deactivation_time: 2.0,
            deactivation_enabled: true,
            constraint_bias_factor: 0.2,
            contact_penetration_threshold: 0.01,
            restitution_velocity_threshold: 0.5,
            warm_starting_factor: 0.85,
            contact_breaking_threshold: DEFAULT_CONTACT_BREAKING_THRESHOLD,
            contact_staleness_threshold: DEFAULT_CONTACT_STALENESS_THRESHOLD,
            perturbation_iterations: 4,
            perturbation_min_points: 3,
            gjk: GjkConfig::default(),
            epa_max_iterations: DEFAULT_EPA_ITERATIONS,
            broadphase: BroadphaseType::default(),
        }
    }
}

fn invalid(message: String) -> PhysicsError {
    PhysicsError::InvalidParameter(message)
}

impl SimulationConfig {
    /// Checks every field for a usable value
    pub fn validate(&self) -> Result<()> {
        if !(self.time_step.is_finite() && self.time_step > 0.0) {
            return Err(invalid(format!("time step must be positive, got {}", self.time_step)));
        }
        if self.max_substeps == 0 {
            return Err(invalid("max substeps must be at least 1".to_string()));
        }
        if !is_finite(&self.gravity) {
            return Err(invalid(format!("gravity {:?} is not finite", self.gravity)));
        }
        if !(self.deactivation_time.is_finite() && self.deactivation_time > 0.0) {
            return Err(invalid(format!(
                "deactivation time must be positive, got {}",
                self.deactivation_time
            )));
        }

        let non_negative = [
            ("linear sleep threshold", self.linear_sleep_threshold),
            ("angular sleep threshold", self.angular_sleep_threshold),
            ("constraint bias factor", self.constraint_bias_factor),
            ("contact penetration threshold", self.contact_penetration_threshold),
            ("restitution velocity threshold", self.restitution_velocity_threshold),
            ("warm starting factor", self.warm_starting_factor),
            ("contact breaking threshold", self.contact_breaking_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(format!("{} must be finite and non-negative, got {}", name, value)));
            }
        }
        if self.contact_staleness_threshold == 0 {
            return Err(invalid("contact staleness threshold must be at least 1".to_string()));
        }
        if let BroadphaseType::AxisSweep { max_proxies: 0 } = self.broadphase {
            return Err(invalid("sweep broadphase needs a non-zero capacity".to_string()));
        }
        Ok(())
    }

    /// Narrow phase settings derived from this configuration
    pub fn dispatcher_info(&self) -> DispatcherInfo {
        DispatcherInfo {
            contact_breaking_threshold: self.contact_breaking_threshold,
            perturbation_iterations: self.perturbation_iterations,
            perturbation_min_points: self.perturbation_min_points,
            contact_staleness_threshold: self.contact_staleness_threshold,
            gjk: self.gjk,
            epa_max_iterations: self.epa_max_iterations,
        }
    }

    /// Contact solver settings for a step of length `dt`
    pub fn contact_solver_info(&self, dt: f32) -> ContactSolverInfo {
        ContactSolverInfo {
            time_step: dt,
            erp: self.constraint_bias_factor,
            slop: self.contact_penetration_threshold,
            restitution_velocity_threshold: self.restitution_velocity_threshold,
            warm_starting_factor: self.warm_starting_factor,
        }
    }
}
