//! Where players are placed when a round starts.

use std::f64::consts::TAU;

use ringfall_model::{Block, BlockPos, Location, VerticalBounds};

/// Players are never spread further than this from the anchor.
pub const MAX_RING_RADIUS: f64 = 20.0;

/// Radius of the spawn circle for an arena of `radius`.
pub fn ring_radius(radius: u32) -> f64 {
    (f64::from(radius) / 2.0).min(MAX_RING_RADIUS)
}

/// `count` points evenly spaced on a circle around `anchor`.
pub fn spawn_ring(anchor: &Location, radius: u32, count: usize) -> Vec<Location> {
    if count == 0 {
        return Vec::new();
    }
    let r = ring_radius(radius);
    let step = TAU / count as f64;
    (0..count)
        .map(|i| {
            let angle = step * i as f64;
            anchor.offset(r * angle.cos(), 0.0, r * angle.sin())
        })
        .collect()
}

/// A protected spawn platform.
#[derive(Debug, Clone, PartialEq)]
pub struct Platform {
    /// Blocks to place, pillar first.
    pub blocks: Vec<(BlockPos, Block)>,
    /// Where the player stands.
    pub stand: Location,
}

/// A bedrock pillar `height` blocks tall under `point`, topped with a 3×3
/// glass platform. The pillar is shortened so the player still fits under
/// the world ceiling.
pub fn platform_at(point: &Location, height: u32, bounds: Option<VerticalBounds>) -> Platform {
    let base = point.block();
    let mut height = i32::try_from(height).unwrap_or(i32::MAX);
    if let Some(bounds) = bounds {
        height = height.min(bounds.max_y - 3 - base.y).max(0);
    }

    let mut blocks: Vec<(BlockPos, Block)> =
        (0..height).map(|dy| (base.up(dy), Block::Bedrock)).collect();
    let top = base.up(height);
    for dx in -1..=1 {
        for dz in -1..=1 {
            blocks.push((top.shifted(dx, dz), Block::Glass));
        }
    }

    Platform {
        stand: top.top_center(),
        blocks,
    }
}
