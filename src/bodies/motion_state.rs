use crate::math::Transform;

/// Link between a body and the outside scene.
///
/// The world reads the transform once when the body is added (and every step
/// for kinematic bodies) and writes it after each step.
pub trait MotionState: Send {
    /// Transform the scene wants the body to have
    fn get_world_transform(&self) -> Transform;

    /// Receives the simulated transform
    fn set_world_transform(&mut self, transform: &Transform);
}

/// Motion state that simply stores the last transform
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DefaultMotionState {
    /// Transform most recently written by the world or the user
    pub world_transform: Transform,

    /// Transform the state was created with
    pub start_transform: Transform,
}

impl DefaultMotionState {
    pub fn new(start_transform: Transform) -> Self {
        Self {
            world_transform: start_transform,
            start_transform,
        }
    }

    /// Restores the start transform
    pub fn reset(&mut self) {
        self.world_transform = self.start_transform;
    }
}

impl MotionState for DefaultMotionState {
    fn get_world_transform(&self) -> Transform {
        self.world_transform
    }

    fn set_world_transform(&mut self, transform: &Transform) {
        self.world_transform = *transform;
    }
}
