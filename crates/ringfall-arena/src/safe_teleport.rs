//! Finding a location a player can safely be returned to.
//!
//! Every restoration path (stop, forced stop, leave, disconnect cleanup)
//! goes through [`SafeTeleportResolver`]. A resolved location is inside the
//! current zone, inside the world's vertical bounds, and one block above a
//! standable surface in a loaded, non-empty column.

use ringfall_model::{BlockPos, Location, WorldId};
use tracing::debug;

use crate::GameWorld;

/// The horizontal extent of a zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneBounds {
    pub world: WorldId,
    pub center_x: f64,
    pub center_z: f64,
    pub diameter: f64,
}

impl ZoneBounds {
    pub fn new(center: &Location, diameter: f64) -> Self {
        Self {
            world: center.world.clone(),
            center_x: center.x,
            center_z: center.z,
            diameter,
        }
    }

    /// `at` pulled one block inside the zone edge. Locations in other
    /// worlds are returned unchanged.
    pub fn clamp(&self, at: &Location) -> Location {
        if at.world != self.world {
            return at.clone();
        }
        let reach = (self.diameter / 2.0 - 1.0).max(0.0);
        Location {
            world: at.world.clone(),
            x: at.x.clamp(self.center_x - reach, self.center_x + reach),
            y: at.y,
            z: at.z.clamp(self.center_z - reach, self.center_z + reach),
        }
    }
}

/// Resolves candidate locations against the live world.
pub struct SafeTeleportResolver<'w> {
    world: &'w dyn GameWorld,
}

impl<'w> SafeTeleportResolver<'w> {
    pub fn new(world: &'w dyn GameWorld) -> Self {
        Self { world }
    }

    /// A safe location derived from `candidate`, or `None` when its column
    /// is unloaded, empty, or tops out on something that cannot be stood on.
    pub fn resolve(&self, candidate: &Location, zone: Option<&ZoneBounds>) -> Option<Location> {
        let at = match zone {
            Some(zone) => zone.clamp(candidate),
            None => candidate.clone(),
        };
        let bounds = self.world.vertical_bounds(&at.world)?;
        let pos = at.block();

        let surface = if bounds.contains(pos.y) {
            match self.world.block(&pos)? {
                block if block.is_air() => self
                    .descend(&pos, bounds.min_y)
                    .or_else(|| self.world.highest_block_y(&at.world, pos.x, pos.z))?,
                _ => self.climb(&pos, bounds.max_y)?,
            }
        } else {
            self.world.highest_block_y(&at.world, pos.x, pos.z)?
        };

        let ground = BlockPos::new(at.world.clone(), pos.x, surface, pos.z);
        if !self.world.block(&ground)?.is_standable() || surface + 1 >= bounds.max_y {
            debug!(%at, surface, "no standable surface");
            return None;
        }
        Some(ground.top_center())
    }

    /// The first candidate that resolves.
    pub fn resolve_first<'a, I>(&self, candidates: I, zone: Option<&ZoneBounds>) -> Option<Location>
    where
        I: IntoIterator<Item = &'a Location>,
    {
        candidates
            .into_iter()
            .find_map(|candidate| self.resolve(candidate, zone))
    }

    /// The resolved spawn point of `world`, the last resort of every
    /// restoration chain.
    pub fn world_spawn(&self, world: &WorldId) -> Option<Location> {
        let spawn = self.world.spawn_point(world)?;
        self.resolve(&spawn, None)
    }

    /// First non-air block strictly below `pos`.
    fn descend(&self, pos: &BlockPos, min_y: i32) -> Option<i32> {
        (min_y..pos.y)
            .rev()
            .find(|&y| self.world.block(&pos.up(y - pos.y)).is_some_and(|b| !b.is_air()))
    }

    /// First block at or above `pos` with two blocks of air over it.
    fn climb(&self, pos: &BlockPos, max_y: i32) -> Option<i32> {
        (pos.y..max_y - 1).find(|&y| {
            let above = |dy| {
                if y + dy >= max_y {
                    return true;
                }
                self.world
                    .block(&pos.up(y + dy - pos.y))
                    .is_some_and(|b| b.is_air())
            };
            above(1) && above(2)
        })
    }
}

#[cfg(test)]
mod tests {
    use ringfall_model::{Block, VerticalBounds};

    use super::*;
    use crate::memory::MemoryWorld;

    fn world() -> MemoryWorld {
        let world = MemoryWorld::new();
        world.add_world("arena", VerticalBounds { min_y: 0, max_y: 256 }, Some(63));
        world.add_world("void", VerticalBounds { min_y: 0, max_y: 256 }, None);
        world
    }

    #[test]
    fn test_candidate_in_air_lands_on_ground() {
        let w = world();
        let r = SafeTeleportResolver::new(&w);
        let got = r.resolve(&Location::new("arena", 3.2, 100.0, -7.9), None).unwrap();
        assert_eq!(got, Location::new("arena", 3.5, 64.0, -7.5));
    }

    #[test]
    fn test_candidate_inside_terrain_climbs_out() {
        let w = world();
        let r = SafeTeleportResolver::new(&w);
        let got = r.resolve(&Location::new("arena", 0.0, 40.0, 0.0), None).unwrap();
        assert_eq!(got.y, 64.0);
    }

    #[test]
    fn test_below_world_uses_highest_block() {
        let w = world();
        let r = SafeTeleportResolver::new(&w);
        let got = r.resolve(&Location::new("arena", 0.0, -30.0, 0.0), None).unwrap();
        assert_eq!(got.y, 64.0);
    }

    #[test]
    fn test_platform_above_void_is_found() {
        let w = world();
        w.set_block_at(&BlockPos::new("void", 5, 120, 5), Block::Glass);
        let r = SafeTeleportResolver::new(&w);
        let got = r.resolve(&Location::new("void", 5.4, 200.0, 5.4), None).unwrap();
        assert_eq!(got, Location::new("void", 5.5, 121.0, 5.5));
    }

    #[test]
    fn test_empty_column_is_rejected() {
        let w = world();
        let r = SafeTeleportResolver::new(&w);
        assert!(r.resolve(&Location::new("void", 0.0, 80.0, 0.0), None).is_none());
    }

    #[test]
    fn test_unloaded_column_is_rejected() {
        let w = world();
        w.unload_column("arena", 9, 9);
        let r = SafeTeleportResolver::new(&w);
        assert!(r.resolve(&Location::new("arena", 9.5, 70.0, 9.5), None).is_none());
    }

    #[test]
    fn test_liquid_surface_is_rejected() {
        let w = world();
        w.set_block_at(&BlockPos::new("arena", 2, 64, 2), Block::Liquid);
        let r = SafeTeleportResolver::new(&w);
        assert!(r.resolve(&Location::new("arena", 2.5, 90.0, 2.5), None).is_none());
    }

    #[test]
    fn test_zone_clamps_horizontally() {
        let w = world();
        let zone = ZoneBounds::new(&Location::new("arena", 0.0, 64.0, 0.0), 20.0);
        let r = SafeTeleportResolver::new(&w);
        let got = r.resolve(&Location::new("arena", 500.0, 80.0, -500.0), Some(&zone)).unwrap();
        assert_eq!(got, Location::new("arena", 9.5, 64.0, -8.5));
    }

    #[test]
    fn test_resolve_first_falls_through() {
        let w = world();
        let r = SafeTeleportResolver::new(&w);
        let bad = Location::new("void", 0.0, 80.0, 0.0);
        let good = Location::new("arena", 1.0, 80.0, 1.0);
        let got = r.resolve_first([&bad, &good], None).unwrap();
        assert_eq!(got.world.as_str(), "arena");
    }

    #[test]
    fn test_unknown_world_is_rejected() {
        let w = world();
        let r = SafeTeleportResolver::new(&w);
        assert!(r.resolve(&Location::new("nowhere", 0.0, 64.0, 0.0), None).is_none());
    }
}
