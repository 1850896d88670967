//! Spatial partition keys.

use std::fmt;

use ringfall_model::{BlockPos, Location, WorldId};

/// Identifies one square spatial partition of a world.
///
/// A region spans `2^shift` blocks along each horizontal axis; height
/// does not matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegionKey {
    pub world: WorldId,
    pub x: i32,
    pub z: i32,
}

impl RegionKey {
    /// The region containing `pos` for a partition size of `2^shift` blocks.
    pub fn of_block(pos: &BlockPos, shift: u32) -> Self {
        // Arithmetic shift floors negative coordinates.
        Self {
            world: pos.world.clone(),
            x: pos.x >> shift,
            z: pos.z >> shift,
        }
    }

    /// The region containing `at` for a partition size of `2^shift` blocks.
    pub fn of(at: &Location, shift: u32) -> Self {
        Self::of_block(&at.block(), shift)
    }
}

impl fmt::Display for RegionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{},{}]", self.world, self.x, self.z)
    }
}
