#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

/// Sleep state of a rigid body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
#[repr(u8)]
pub enum ActivationState {
    /// Simulated normally
    Active = 1,

    /// Put to sleep together with its island; not integrated
    IslandSleeping = 2,

    /// Slow for long enough; sleeps once its whole island agrees
    WantsDeactivation = 3,

    /// Never sleeps, used while a body is driven from outside
    DisableDeactivation = 4,
}

impl ActivationState {
    /// Returns true if the body takes part in integration
    #[inline]
    pub fn is_active(self) -> bool {
        self != ActivationState::IslandSleeping
    }

    /// Returns true for the two states that let an island fall asleep
    #[inline]
    pub fn is_sleepy(self) -> bool {
        matches!(self, ActivationState::IslandSleeping | ActivationState::WantsDeactivation)
    }
}

impl Default for ActivationState {
    fn default() -> Self {
        ActivationState::Active
    }
}
