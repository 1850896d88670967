//! The host world as seen by the match core.

use std::time::Duration;

use ringfall_model::{
    Block, BlockPos, EntityKind, GameMode, Health, Inventory, ItemStack, Location, Notice,
    PlayerId, StatusEffect, VerticalBounds, WorldId,
};

/// Facade over the host game world.
///
/// Queries may be called from any context. Mutations touch a location and
/// must be called from the region that owns it, i.e. from inside a job
/// sent through [`RegionDispatcher::execute`](ringfall_region::RegionDispatcher::execute).
/// Every call about an offline player is a silent no-op.
pub trait GameWorld: Send + Sync + 'static {
    // ---- queries ----------------------------------------------------------

    fn is_online(&self, player: PlayerId) -> bool;

    fn online_players(&self) -> Vec<PlayerId>;

    fn location(&self, player: PlayerId) -> Option<Location>;

    fn game_mode(&self, player: PlayerId) -> Option<GameMode>;

    fn inventory(&self, player: PlayerId) -> Option<Inventory>;

    fn health(&self, player: PlayerId) -> Option<Health>;

    /// Buildable height range of `world`, or `None` if it does not exist.
    fn vertical_bounds(&self, world: &WorldId) -> Option<VerticalBounds>;

    /// The block at `pos`, or `None` if its chunk is not loaded.
    fn block(&self, pos: &BlockPos) -> Option<Block>;

    /// Y of the highest non-air block in a column, or `None` if the
    /// column is empty or not loaded.
    fn highest_block_y(&self, world: &WorldId, x: i32, z: i32) -> Option<i32>;

    fn spawn_point(&self, world: &WorldId) -> Option<Location>;

    // ---- region-bound mutations -------------------------------------------

    /// Moves a player. Returns `false` if the player is offline or the
    /// destination is unusable.
    fn teleport(&self, player: PlayerId, to: &Location) -> bool;

    fn set_game_mode(&self, player: PlayerId, mode: GameMode);

    fn set_inventory(&self, player: PlayerId, inventory: Inventory);

    fn give_item(&self, player: PlayerId, item: ItemStack);

    fn set_health(&self, player: PlayerId, health: f64);

    fn apply_effect(&self, player: PlayerId, effect: StatusEffect);

    fn set_block(&self, pos: &BlockPos, block: Block);

    /// Replaces the contents of the container block at `pos`.
    fn fill_container(&self, pos: &BlockPos, items: Vec<ItemStack>);

    fn spawn_entity(&self, at: &Location, kind: EntityKind, effect: Option<StatusEffect>);

    fn explode(&self, at: &Location, power: f32);

    /// Moves `world`'s border to `diameter` around `center` over `transition`.
    fn set_border(&self, world: &WorldId, center: &Location, diameter: f64, transition: Duration);

    /// Damage per second dealt to players outside `world`'s border.
    fn set_border_damage(&self, world: &WorldId, damage: f64);

    fn reset_border(&self, world: &WorldId);

    // ---- feedback -------------------------------------------------------

    fn notify(&self, players: &[PlayerId], notice: &Notice);

    fn broadcast(&self, notice: &Notice);
}
