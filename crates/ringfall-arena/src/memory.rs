//! In-memory collaborators for tests and local runs.
//!
//! [`MemoryWorld`] models worlds as flat ground plus explicitly placed
//! blocks, records every mutation and notice, and counts mutations made
//! outside the region that owns their location.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use ringfall_model::{
    Block, BlockPos, EntityKind, GameMode, Health, Inventory, ItemStack, Location, Notice,
    PlayerId, StatusEffect, VerticalBounds, WorldId,
};
use ringfall_region::{RegionConfig, RegionKey, current_region};
use tracing::warn;

use crate::{
    EnvironmentError, EnvironmentProvider, GameWorld, InstanceHandle, StatEvent, StatsError,
    StatsStore,
};

// ---------------------------------------------------------------------------
// MemoryWorld
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct WorldData {
    bounds: VerticalBounds,
    /// Every block at or below this height is solid.
    ground: Option<i32>,
}

#[derive(Debug, Clone)]
struct PlayerData {
    location: Location,
    online: bool,
    mode: GameMode,
    inventory: Inventory,
    health: Health,
    effects: Vec<StatusEffect>,
}

/// A border change recorded by [`MemoryWorld`].
#[derive(Debug, Clone, PartialEq)]
pub struct BorderChange {
    pub world: WorldId,
    pub diameter: f64,
    pub transition: Duration,
}

#[derive(Debug, Default)]
struct State {
    worlds: HashMap<WorldId, WorldData>,
    blocks: HashMap<BlockPos, Block>,
    containers: HashMap<BlockPos, Vec<ItemStack>>,
    unloaded: HashSet<(WorldId, i32, i32)>,
    players: HashMap<PlayerId, PlayerData>,
    teleports: Vec<(PlayerId, Location)>,
    entities: Vec<(Location, EntityKind, Option<StatusEffect>)>,
    explosions: Vec<(Location, f32)>,
    borders: Vec<BorderChange>,
    border_resets: Vec<WorldId>,
    notices: Vec<(Vec<PlayerId>, Notice)>,
    off_region: u64,
}

/// A [`GameWorld`] held entirely in memory.
#[derive(Debug)]
pub struct MemoryWorld {
    state: Mutex<State>,
    region_shift: u32,
}

impl Default for MemoryWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWorld {
    /// A world whose region size matches [`RegionConfig::default`].
    pub fn new() -> Self {
        Self::with_region_shift(RegionConfig::default().region_shift)
    }

    pub fn with_region_shift(region_shift: u32) -> Self {
        Self {
            state: Mutex::new(State::default()),
            region_shift,
        }
    }

    // ---- setup ----------------------------------------------------------

    /// Adds a world. With `ground`, every column is solid up to that height.
    pub fn add_world(&self, name: &str, bounds: VerticalBounds, ground: Option<i32>) {
        self.state
            .lock()
            .worlds
            .insert(WorldId::new(name), WorldData { bounds, ground });
    }

    /// Adds an online player in survival with 20/20 health.
    pub fn add_player(&self, player: PlayerId, at: Location) {
        self.state.lock().players.insert(
            player,
            PlayerData {
                location: at,
                online: true,
                mode: GameMode::Survival,
                inventory: Inventory::default(),
                health: Health {
                    current: 20.0,
                    max: 20.0,
                },
                effects: Vec::new(),
            },
        );
    }

    pub fn set_online(&self, player: PlayerId, online: bool) {
        if let Some(p) = self.state.lock().players.get_mut(&player) {
            p.online = online;
        }
    }

    pub fn set_player_inventory(&self, player: PlayerId, inventory: Inventory) {
        if let Some(p) = self.state.lock().players.get_mut(&player) {
            p.inventory = inventory;
        }
    }

    pub fn set_player_health(&self, player: PlayerId, current: f64) {
        if let Some(p) = self.state.lock().players.get_mut(&player) {
            p.health.current = current;
        }
    }

    /// Places a block without any region check.
    pub fn set_block_at(&self, pos: &BlockPos, block: Block) {
        self.state.lock().blocks.insert(pos.clone(), block);
    }

    pub fn unload_column(&self, world: &str, x: i32, z: i32) {
        self.state.lock().unloaded.insert((WorldId::new(world), x, z));
    }

    // ---- inspection -----------------------------------------------------

    pub fn teleports(&self) -> Vec<(PlayerId, Location)> {
        self.state.lock().teleports.clone()
    }

    pub fn teleports_of(&self, player: PlayerId) -> Vec<Location> {
        self.state
            .lock()
            .teleports
            .iter()
            .filter(|(p, _)| *p == player)
            .map(|(_, at)| at.clone())
            .collect()
    }

    pub fn entities(&self) -> Vec<(Location, EntityKind, Option<StatusEffect>)> {
        self.state.lock().entities.clone()
    }

    /// Every block placed through [`GameWorld::set_block`] that is `kind`.
    pub fn placed(&self, kind: Block) -> Vec<BlockPos> {
        self.state
            .lock()
            .blocks
            .iter()
            .filter(|(_, b)| **b == kind)
            .map(|(pos, _)| pos.clone())
            .collect()
    }

    pub fn container(&self, pos: &BlockPos) -> Option<Vec<ItemStack>> {
        self.state.lock().containers.get(pos).cloned()
    }

    pub fn explosions(&self) -> Vec<(Location, f32)> {
        self.state.lock().explosions.clone()
    }

    pub fn borders(&self) -> Vec<BorderChange> {
        self.state.lock().borders.clone()
    }

    pub fn border_resets(&self) -> Vec<WorldId> {
        self.state.lock().border_resets.clone()
    }

    pub fn notices(&self) -> Vec<(Vec<PlayerId>, Notice)> {
        self.state.lock().notices.clone()
    }

    /// How many notices matched `pred`.
    pub fn count_notices(&self, pred: impl Fn(&Notice) -> bool) -> usize {
        self.state
            .lock()
            .notices
            .iter()
            .filter(|(_, n)| pred(n))
            .count()
    }

    pub fn items_of(&self, player: PlayerId) -> Vec<ItemStack> {
        self.state
            .lock()
            .players
            .get(&player)
            .map(|p| p.inventory.items.clone())
            .unwrap_or_default()
    }

    pub fn effects_of(&self, player: PlayerId) -> Vec<StatusEffect> {
        self.state
            .lock()
            .players
            .get(&player)
            .map(|p| p.effects.clone())
            .unwrap_or_default()
    }

    /// Mutations that ran outside the region owning their location.
    pub fn off_region_mutations(&self) -> u64 {
        self.state.lock().off_region
    }

    fn check_region(&self, state: &mut State, at: &Location, what: &str) {
        let owner = RegionKey::of(at, self.region_shift);
        if current_region().as_ref() != Some(&owner) {
            state.off_region += 1;
            warn!(%owner, what, "mutation outside owning region");
        }
    }

    fn block_in(state: &State, pos: &BlockPos) -> Option<Block> {
        let world = state.worlds.get(&pos.world)?;
        if state.unloaded.contains(&(pos.world.clone(), pos.x, pos.z)) {
            return None;
        }
        if let Some(block) = state.blocks.get(pos) {
            return Some(*block);
        }
        if !world.bounds.contains(pos.y) {
            return Some(Block::Air);
        }
        match world.ground {
            Some(ground) if pos.y <= ground => Some(Block::Solid),
            _ => Some(Block::Air),
        }
    }

    /// Runs `f` on an online player's data after checking the region of
    /// their current location.
    fn with_player(&self, player: PlayerId, what: &str, f: impl FnOnce(&mut PlayerData)) {
        let mut state = self.state.lock();
        let Some(at) = state
            .players
            .get(&player)
            .filter(|p| p.online)
            .map(|p| p.location.clone())
        else {
            return;
        };
        self.check_region(&mut state, &at, what);
        if let Some(data) = state.players.get_mut(&player) {
            f(data);
        }
    }
}

impl GameWorld for MemoryWorld {
    fn is_online(&self, player: PlayerId) -> bool {
        self.state
            .lock()
            .players
            .get(&player)
            .is_some_and(|p| p.online)
    }

    fn online_players(&self) -> Vec<PlayerId> {
        let mut online: Vec<PlayerId> = self
            .state
            .lock()
            .players
            .iter()
            .filter(|(_, p)| p.online)
            .map(|(id, _)| *id)
            .collect();
        online.sort();
        online
    }

    fn location(&self, player: PlayerId) -> Option<Location> {
        let state = self.state.lock();
        let p = state.players.get(&player).filter(|p| p.online)?;
        Some(p.location.clone())
    }

    fn game_mode(&self, player: PlayerId) -> Option<GameMode> {
        let state = self.state.lock();
        state.players.get(&player).filter(|p| p.online).map(|p| p.mode)
    }

    fn inventory(&self, player: PlayerId) -> Option<Inventory> {
        let state = self.state.lock();
        state
            .players
            .get(&player)
            .filter(|p| p.online)
            .map(|p| p.inventory.clone())
    }

    fn health(&self, player: PlayerId) -> Option<Health> {
        let state = self.state.lock();
        state.players.get(&player).filter(|p| p.online).map(|p| p.health)
    }

    fn vertical_bounds(&self, world: &WorldId) -> Option<VerticalBounds> {
        self.state.lock().worlds.get(world).map(|w| w.bounds)
    }

    fn block(&self, pos: &BlockPos) -> Option<Block> {
        Self::block_in(&self.state.lock(), pos)
    }

    fn highest_block_y(&self, world: &WorldId, x: i32, z: i32) -> Option<i32> {
        let state = self.state.lock();
        let bounds = state.worlds.get(world)?.bounds;
        (bounds.min_y..bounds.max_y).rev().find(|&y| {
            Self::block_in(&state, &BlockPos::new(world.clone(), x, y, z))
                .is_some_and(|b| !b.is_air())
        })
    }

    fn spawn_point(&self, world: &WorldId) -> Option<Location> {
        let state = self.state.lock();
        let data = state.worlds.get(world)?;
        let ground = data.ground.unwrap_or(data.bounds.min_y);
        Some(Location::new(world.clone(), 0.5, f64::from(ground + 1), 0.5))
    }

    fn teleport(&self, player: PlayerId, to: &Location) -> bool {
        let mut state = self.state.lock();
        if !state.worlds.contains_key(&to.world) {
            return false;
        }
        let Some(from) = state
            .players
            .get(&player)
            .filter(|p| p.online)
            .map(|p| p.location.clone())
        else {
            return false;
        };
        self.check_region(&mut state, &from, "teleport");
        if let Some(p) = state.players.get_mut(&player) {
            p.location = to.clone();
        }
        state.teleports.push((player, to.clone()));
        true
    }

    fn set_game_mode(&self, player: PlayerId, mode: GameMode) {
        self.with_player(player, "set_game_mode", |p| p.mode = mode);
    }

    fn set_inventory(&self, player: PlayerId, inventory: Inventory) {
        self.with_player(player, "set_inventory", |p| p.inventory = inventory);
    }

    fn give_item(&self, player: PlayerId, item: ItemStack) {
        self.with_player(player, "give_item", |p| p.inventory.items.push(item));
    }

    fn set_health(&self, player: PlayerId, health: f64) {
        self.with_player(player, "set_health", |p| {
            p.health.current = health.clamp(0.0, p.health.max);
        });
    }

    fn apply_effect(&self, player: PlayerId, effect: StatusEffect) {
        self.with_player(player, "apply_effect", |p| p.effects.push(effect));
    }

    fn set_block(&self, pos: &BlockPos, block: Block) {
        let mut state = self.state.lock();
        let at = Location::new(pos.world.clone(), f64::from(pos.x), f64::from(pos.y), f64::from(pos.z));
        self.check_region(&mut state, &at, "set_block");
        if block != Block::Chest {
            state.containers.remove(pos);
        }
        state.blocks.insert(pos.clone(), block);
    }

    fn fill_container(&self, pos: &BlockPos, items: Vec<ItemStack>) {
        let mut state = self.state.lock();
        let at = Location::new(pos.world.clone(), f64::from(pos.x), f64::from(pos.y), f64::from(pos.z));
        self.check_region(&mut state, &at, "fill_container");
        if Self::block_in(&state, pos) == Some(Block::Chest) {
            state.containers.insert(pos.clone(), items);
        }
    }

    fn spawn_entity(&self, at: &Location, kind: EntityKind, effect: Option<StatusEffect>) {
        let mut state = self.state.lock();
        self.check_region(&mut state, at, "spawn_entity");
        state.entities.push((at.clone(), kind, effect));
    }

    fn explode(&self, at: &Location, power: f32) {
        let mut state = self.state.lock();
        self.check_region(&mut state, at, "explode");
        state.explosions.push((at.clone(), power));
    }

    fn set_border(&self, world: &WorldId, center: &Location, diameter: f64, transition: Duration) {
        let mut state = self.state.lock();
        self.check_region(&mut state, center, "set_border");
        state.borders.push(BorderChange {
            world: world.clone(),
            diameter,
            transition,
        });
    }

    fn set_border_damage(&self, _world: &WorldId, _damage: f64) {}

    fn reset_border(&self, world: &WorldId) {
        self.state.lock().border_resets.push(world.clone());
    }

    fn notify(&self, players: &[PlayerId], notice: &Notice) {
        self.state
            .lock()
            .notices
            .push((players.to_vec(), notice.clone()));
    }

    fn broadcast(&self, notice: &Notice) {
        self.state.lock().notices.push((Vec::new(), notice.clone()));
    }
}

// ---------------------------------------------------------------------------
// MemoryStats
// ---------------------------------------------------------------------------

/// A [`StatsStore`] that keeps every record in order.
#[derive(Debug, Default)]
pub struct MemoryStats {
    records: Mutex<Vec<(PlayerId, StatEvent)>>,
    unavailable: AtomicBool,
}

impl MemoryStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `record` fail.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    pub fn records(&self) -> Vec<(PlayerId, StatEvent)> {
        self.records.lock().clone()
    }

    pub fn count(&self, player: PlayerId, event: StatEvent) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|(p, e)| *p == player && *e == event)
            .count()
    }

    pub fn total(&self, event: StatEvent) -> usize {
        self.records.lock().iter().filter(|(_, e)| *e == event).count()
    }
}

#[async_trait]
impl StatsStore for MemoryStats {
    async fn record(&self, player: PlayerId, event: StatEvent) -> Result<(), StatsError> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(StatsError::Unavailable("memory store disabled".into()));
        }
        self.records.lock().push((player, event));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryEnvironment
// ---------------------------------------------------------------------------

/// An [`EnvironmentProvider`] that clones worlds inside a [`MemoryWorld`].
#[derive(Debug)]
pub struct MemoryEnvironment {
    world: Arc<MemoryWorld>,
    failing: AtomicBool,
    live: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
}

impl MemoryEnvironment {
    pub fn new(world: Arc<MemoryWorld>) -> Self {
        Self {
            world,
            failing: AtomicBool::new(false),
            live: Mutex::new(Vec::new()),
            destroyed: Mutex::new(Vec::new()),
        }
    }

    /// Makes every subsequent `create_instance` fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Keys of instances created and not yet destroyed.
    pub fn live_instances(&self) -> Vec<String> {
        self.live.lock().clone()
    }

    pub fn destroyed_instances(&self) -> Vec<String> {
        self.destroyed.lock().clone()
    }
}

impl EnvironmentProvider for MemoryEnvironment {
    fn create_instance(&self, template: &str, key: &str) -> Result<InstanceHandle, EnvironmentError> {
        if self.failing.load(Ordering::Acquire) {
            return Err(EnvironmentError::Failed(format!("cannot clone {template}")));
        }
        let source = self
            .world
            .state
            .lock()
            .worlds
            .get(&WorldId::new(template))
            .cloned()
            .ok_or_else(|| EnvironmentError::TemplateMissing(template.to_string()))?;
        self.world.add_world(key, source.bounds, source.ground);
        self.live.lock().push(key.to_string());
        Ok(InstanceHandle {
            key: key.to_string(),
            world: WorldId::new(key),
        })
    }

    fn destroy_instance(&self, handle: &InstanceHandle) -> bool {
        let mut live = self.live.lock();
        let Some(index) = live.iter().position(|k| *k == handle.key) else {
            return false;
        };
        live.remove(index);
        self.destroyed.lock().push(handle.key.clone());
        true
    }
}
