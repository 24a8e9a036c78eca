use bitflags::bitflags;

use crate::math::Vector3;

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

bitflags! {
    /// What the world reports to a debug drawer
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    #[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
    pub struct DebugMode: u32 {
        const NO_DEBUG = 0;
        const DRAW_WIREFRAME = 1;
        const DRAW_AABB = 2;
        const DRAW_FEATURES_TEXT = 4;
        const DRAW_CONTACT_POINTS = 8;
        /// Keeps every body awake
        const NO_DEACTIVATION = 16;
        const NO_HELP_TEXT = 32;
        const DRAW_TEXT = 64;
        const PROFILE_TIMINGS = 128;
        const DRAW_CONSTRAINTS = 2048;
    }
}

/// Receiver of diagnostic geometry. Nothing drawn is read back by the world.
pub trait DebugDrawer: Send {
    fn draw_line(&mut self, from: &Vector3, to: &Vector3, color: &Vector3);

    fn draw_contact_point(
        &mut self,
        point_on_b: &Vector3,
        normal_on_b: &Vector3,
        distance: f32,
        lifetime: u32,
        color: &Vector3,
    );

    fn report_text(&mut self, text: &str);

    fn debug_mode(&self) -> DebugMode;
}
