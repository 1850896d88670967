//! Supply drops inside the zone.
//!
//! Each drop picks a column within 70% of the zone radius, warns the
//! audience, then lands a beacon with a loot chest on top a few seconds
//! later. Every landed drop is undone when the round stops.

use std::sync::Arc;

use rand::Rng;
use rand::seq::IndexedRandom;
use ringfall_model::{Block, BlockPos, Cue, ItemKind, ItemStack, Notice};
use ringfall_tick::{TaskFlow, TaskHandle, Ticks};
use tracing::{debug, info};

use crate::{ArenaContext, GameWorld, MatchSession, MatchSettings};

/// Time between the warning and the landing.
const LANDING_DELAY: Ticks = Ticks(60);
const SPREAD_FRACTION: f64 = 0.7;
const MIN_SPREAD: i32 = 10;
const MIN_DRAWS: usize = 5;
const MAX_DRAWS: usize = 8;

const RARE_LOOT: [(ItemKind, u32); 19] = [
    (ItemKind::DiamondSword, 1),
    (ItemKind::DiamondAxe, 1),
    (ItemKind::Bow, 1),
    (ItemKind::Crossbow, 1),
    (ItemKind::DiamondHelmet, 1),
    (ItemKind::DiamondChestplate, 1),
    (ItemKind::DiamondLeggings, 1),
    (ItemKind::DiamondBoots, 1),
    (ItemKind::Shield, 1),
    (ItemKind::TotemOfUndying, 1),
    (ItemKind::GoldenApple, 3),
    (ItemKind::EnchantedGoldenApple, 1),
    (ItemKind::EnderPearl, 3),
    (ItemKind::Tnt, 5),
    (ItemKind::EndCrystal, 2),
    (ItemKind::FireCharge, 8),
    (ItemKind::Arrow, 32),
    (ItemKind::SpectralArrow, 16),
    (ItemKind::NetheriteIngot, 1),
];

/// One of these is in every chest.
const GUARANTEED_LOOT: [(ItemKind, u32); 3] = [
    (ItemKind::TotemOfUndying, 1),
    (ItemKind::EnchantedGoldenApple, 2),
    (ItemKind::NetheriteIngot, 1),
];

/// A drop that landed and must be undone when the round stops.
#[derive(Debug, Clone, PartialEq)]
pub struct Airdrop {
    pub beacon: BlockPos,
    pub chest: BlockPos,
    /// What the beacon replaced.
    pub replaced: Block,
}

impl Airdrop {
    fn undo(&self, w: &dyn GameWorld) {
        w.set_block(&self.chest, Block::Air);
        w.set_block(&self.beacon, self.replaced);
    }
}

/// Horizontal offset of a drop from the zone center, each axis in
/// `-spread..spread` where `spread` is 70% of `radius` but at least 10.
pub fn drop_offset<R: Rng + ?Sized>(radius: f64, rng: &mut R) -> (i32, i32) {
    let spread = ((radius * SPREAD_FRACTION) as i32).max(MIN_SPREAD);
    (rng.random_range(-spread..spread), rng.random_range(-spread..spread))
}

/// Five to eight rare picks plus one guaranteed item.
pub fn fill_chest<R: Rng + ?Sized>(rng: &mut R) -> Vec<ItemStack> {
    let draws = rng.random_range(MIN_DRAWS..=MAX_DRAWS);
    let mut loot: Vec<ItemStack> = (0..draws)
        .filter_map(|_| RARE_LOOT.choose(rng))
        .map(|&(kind, amount)| ItemStack::new(kind, amount))
        .collect();
    if let Some(&(kind, amount)) = GUARANTEED_LOOT.choose(rng) {
        loot.push(ItemStack::new(kind, amount));
    }
    loot
}

/// Starts dropping supplies for `session`'s current round.
pub(crate) fn start(session: &Arc<MatchSession>, settings: &MatchSettings) -> TaskHandle {
    let weak = Arc::downgrade(session);
    session.ctx().scheduler.run_timer(
        settings.airdrop_delay,
        settings.airdrop_interval,
        move || {
            let Some(session) = weak.upgrade() else {
                return TaskFlow::Stop;
            };
            if !session.is_running() {
                return TaskFlow::Stop;
            }
            let Some((center, diameter)) = session.zone_center() else {
                return TaskFlow::Stop;
            };

            let (dx, dz) = drop_offset(diameter / 2.0, &mut rand::rng());
            let column = center.offset(f64::from(dx), 0.0, f64::from(dz)).block();
            let col = column.clone();
            let weak = Arc::downgrade(&session);
            session
                .ctx()
                .at(&column.top_center(), move |w| {
                    w.highest_block_y(&col.world, col.x, col.z)
                })
                .then(move |ground| {
                    let Some(session) = weak.upgrade() else {
                        return;
                    };
                    match ground {
                        Some(y) => announce(&session, BlockPos { y, ..column }),
                        None => debug!(arena = %session.name(), "airdrop column empty or unloaded"),
                    }
                });
            TaskFlow::Continue
        },
    )
}

/// Warns the audience, then lands the drop on top of `ground`.
fn announce(session: &Arc<MatchSession>, ground: BlockPos) {
    if !session.is_running() {
        return;
    }
    let ctx = session.ctx();
    let audience = session.audience();
    let line = format!(
        "A supply drop is landing at {}, {}, {}!",
        ground.x,
        ground.y + 1,
        ground.z
    );
    ctx.notify(&audience, Notice::chat(line));
    ctx.notify(&audience, Notice::cue(Cue::Airdrop));
    info!(arena = %session.name(), x = ground.x, y = ground.y + 1, z = ground.z, "airdrop incoming");

    let weak = Arc::downgrade(session);
    let handle = ctx.scheduler.run_later(LANDING_DELAY, move || {
        if let Some(session) = weak.upgrade() {
            land(&session, ground);
        }
    });
    session.track_round_task(handle);
}

fn land(session: &Arc<MatchSession>, ground: BlockPos) {
    if !session.is_running() {
        return;
    }
    let loot = fill_chest(&mut rand::rng());
    let weak = Arc::downgrade(session);
    let at = ground.top_center();
    session
        .ctx()
        .at(&at, move |w| {
            let Some(session) = weak.upgrade() else {
                return;
            };
            let landed = Airdrop {
                chest: ground.up(1),
                replaced: w.block(&ground).unwrap_or(Block::Solid),
                beacon: ground,
            };
            w.set_block(&landed.beacon, Block::Beacon);
            w.set_block(&landed.chest, Block::Chest);
            w.fill_container(&landed.chest, loot);
            if !session.record_airdrop(landed.clone()) {
                landed.undo(w);
                debug!(arena = %session.name(), "round stopped before the airdrop landed");
            }
        })
        .detach();
}

/// Removes every chest and restores every block under a beacon.
pub(crate) fn clear(ctx: &ArenaContext, drops: Vec<Airdrop>) {
    for landed in drops {
        let at = landed.beacon.top_center();
        ctx.at(&at, move |w| landed.undo(w)).detach();
    }
}
