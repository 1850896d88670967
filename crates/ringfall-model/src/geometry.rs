//! Positions inside a world and what occupies them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::WorldId;

// ---------------------------------------------------------------------------
// Location
// ---------------------------------------------------------------------------

/// A precise position in a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub world: WorldId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Location {
    pub fn new(world: impl Into<WorldId>, x: f64, y: f64, z: f64) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// The block this location is inside of.
    pub fn block(&self) -> BlockPos {
        BlockPos {
            world: self.world.clone(),
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }

    /// Returns a copy shifted by the given offsets.
    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            world: self.world.clone(),
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Returns a copy with a different height.
    pub fn with_y(&self, y: f64) -> Self {
        Self {
            world: self.world.clone(),
            x: self.x,
            y,
            z: self.z,
        }
    }

    /// Returns a copy moved into another world, keeping coordinates.
    pub fn in_world(&self, world: WorldId) -> Self {
        Self {
            world,
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    /// Horizontal distance to `other`, ignoring height and world.
    pub fn horizontal_distance(&self, other: &Location) -> f64 {
        let dx = self.x - other.x;
        let dz = self.z - other.z;
        (dx * dx + dz * dz).sqrt()
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:.1}, {:.1}, {:.1})", self.world, self.x, self.y, self.z)
    }
}

// ---------------------------------------------------------------------------
// BlockPos
// ---------------------------------------------------------------------------

/// Integer coordinates of a single block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub world: WorldId,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(world: impl Into<WorldId>, x: i32, y: i32, z: i32) -> Self {
        Self {
            world: world.into(),
            x,
            y,
            z,
        }
    }

    /// Returns the block `dy` above (negative for below).
    pub fn up(&self, dy: i32) -> Self {
        Self {
            world: self.world.clone(),
            x: self.x,
            y: self.y + dy,
            z: self.z,
        }
    }

    /// Returns a copy shifted horizontally.
    pub fn shifted(&self, dx: i32, dz: i32) -> Self {
        Self {
            world: self.world.clone(),
            x: self.x + dx,
            y: self.y,
            z: self.z + dz,
        }
    }

    /// The location at the center of this block's top face.
    pub fn top_center(&self) -> Location {
        Location {
            world: self.world.clone(),
            x: self.x as f64 + 0.5,
            y: self.y as f64 + 1.0,
            z: self.z as f64 + 0.5,
        }
    }
}

// ---------------------------------------------------------------------------
// Block
// ---------------------------------------------------------------------------

/// The coarse classification of a block the match core cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Block {
    Air,
    /// Any block a player can stand on that the match did not place.
    Solid,
    /// Placed under a platform so that it cannot be dug out.
    Bedrock,
    /// Platform surface.
    Glass,
    /// Water or lava. Not a safe surface.
    Liquid,
    /// Marks an airdrop from afar.
    Beacon,
    /// A container players can loot.
    Chest,
}

impl Block {
    pub fn is_air(self) -> bool {
        matches!(self, Self::Air)
    }

    /// Whether a player may be placed on top of this block.
    pub fn is_standable(self) -> bool {
        matches!(self, Self::Solid | Self::Bedrock | Self::Glass | Self::Beacon | Self::Chest)
    }
}

// ---------------------------------------------------------------------------
// VerticalBounds
// ---------------------------------------------------------------------------

/// The buildable height range of a world: `min_y` inclusive, `max_y` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerticalBounds {
    pub min_y: i32,
    pub max_y: i32,
}

impl VerticalBounds {
    pub fn contains(&self, y: i32) -> bool {
        y >= self.min_y && y < self.max_y
    }
}
