use bitflags::bitflags;

#[cfg(feature = "serialize")]
use serde::{Serialize, Deserialize};

bitflags! {
    /// Collision groups a broadphase proxy belongs to or accepts
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    #[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
    pub struct CollisionGroups: u32 {
        /// Default group for dynamic bodies
        const DEFAULT   = 0x0000_0001;

        /// Static world geometry
        const STATIC    = 0x0000_0002;

        /// Bodies driven by a motion state
        const KINEMATIC = 0x0000_0004;

        /// Small bodies that only need to collide with the world
        const DEBRIS    = 0x0000_0008;

        /// Projectiles shot into the scene
        const PROJECTILE = 0x0000_0010;

        /// All groups
        const ALL       = 0xFFFF_FFFF;
    }
}

/// Group/mask pair stored on a broadphase proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(Serialize, Deserialize))]
pub struct CollisionFilter {
    /// Groups this proxy belongs to
    pub group: CollisionGroups,

    /// Groups this proxy collides with
    pub mask: CollisionGroups,
}

impl Default for CollisionFilter {
    fn default() -> Self {
        Self::dynamic()
    }
}

impl CollisionFilter {
    /// Creates a filter from a group and a mask
    pub fn new(group: CollisionGroups, mask: CollisionGroups) -> Self {
        Self { group, mask }
    }

    /// Filter for dynamic bodies: collides with everything
    pub fn dynamic() -> Self {
        Self::new(CollisionGroups::DEFAULT, CollisionGroups::ALL)
    }

    /// Filter for static bodies: never pairs with other static bodies
    pub fn fixed() -> Self {
        Self::new(CollisionGroups::STATIC, CollisionGroups::ALL ^ CollisionGroups::STATIC)
    }

    /// Filter for kinematic bodies: collides with dynamic bodies only
    pub fn kinematic() -> Self {
        Self::new(
            CollisionGroups::KINEMATIC,
            CollisionGroups::ALL ^ (CollisionGroups::STATIC | CollisionGroups::KINEMATIC),
        )
    }

    /// Returns true if the two proxies should form a pair
    #[inline]
    pub fn should_collide(&self, other: &Self) -> bool {
        self.group.intersects(other.mask) && other.group.intersects(self.mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_bodies_do_not_pair() {
        assert!(!CollisionFilter::fixed().should_collide(&CollisionFilter::fixed()));
        assert!(CollisionFilter::fixed().should_collide(&CollisionFilter::dynamic()));
        assert!(!CollisionFilter::kinematic().should_collide(&CollisionFilter::fixed()));
        assert!(CollisionFilter::kinematic().should_collide(&CollisionFilter::dynamic()));
    }
}
