//! Weighted item grants.

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use rand::seq::IndexedRandom;
use ringfall_model::{ItemKind, ItemStack, PotionKind};
use ringfall_tick::{TaskFlow, TaskHandle, Ticks};
use tracing::{debug, warn};

use crate::MatchSession;

// ---------------------------------------------------------------------------
// WeightedPool
// ---------------------------------------------------------------------------

/// Draws entries with probability `weight / total`.
///
/// Entries with a weight of zero or less are dropped on construction and
/// can never be drawn.
#[derive(Debug, Clone)]
pub struct WeightedPool<T> {
    entries: Vec<(T, u64)>,
    total: u64,
}

impl<T> WeightedPool<T> {
    pub fn new(entries: impl IntoIterator<Item = (T, i64)>) -> Self {
        let entries: Vec<(T, u64)> = entries
            .into_iter()
            .filter_map(|(item, weight)| u64::try_from(weight).ok().filter(|w| *w > 0).map(|w| (item, w)))
            .collect();
        let total = entries.iter().map(|(_, w)| w).sum();
        Self { entries, total }
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    /// Rolls in `[0, total)` and walks the cumulative weights.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&T> {
        if self.total == 0 {
            return None;
        }
        let roll = rng.random_range(0..self.total);
        let mut cumulative = 0;
        for (item, weight) in &self.entries {
            cumulative += weight;
            if roll < cumulative {
                return Some(item);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// ItemTable / ItemEconomy
// ---------------------------------------------------------------------------

/// The configured item pool, with identifiers parsed.
#[derive(Debug, Clone)]
pub struct ItemTable {
    pool: WeightedPool<ItemKind>,
}

impl ItemTable {
    /// Parses `{identifier: weight}`. Unknown identifiers and non-positive
    /// weights are logged and left out.
    pub fn from_raw(raw: &BTreeMap<String, i64>) -> Self {
        let mut parsed = Vec::with_capacity(raw.len());
        for (id, &weight) in raw {
            match id.parse::<ItemKind>() {
                Ok(_) if weight <= 0 => warn!(item = %id, weight, "non-positive item weight, excluded"),
                Ok(kind) => parsed.push((kind, weight)),
                Err(err) => warn!(item = %id, error = %err, "unknown item in table, excluded"),
            }
        }
        Self {
            pool: WeightedPool::new(parsed),
        }
    }

    pub fn pool(&self) -> &WeightedPool<ItemKind> {
        &self.pool
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

/// Turns weighted draws into item stacks.
#[derive(Debug, Clone)]
pub struct ItemEconomy {
    table: ItemTable,
}

impl ItemEconomy {
    pub fn new(table: ItemTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ItemTable {
        &self.table
    }

    /// One item from the pool. Potions carry a random effect from
    /// [`PotionKind::ALLOWED`].
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<ItemStack> {
        let kind = *self.table.pool().draw(rng)?;
        let stack = ItemStack::one(kind);
        if kind.is_potion() {
            if let Some(potion) = PotionKind::ALLOWED.choose(rng) {
                return Some(stack.with_potion(*potion));
            }
        }
        Some(stack)
    }
}

/// Starts the item grant timer for `session`'s current round.
pub(crate) fn start(
    session: &Arc<MatchSession>,
    economy: Arc<ItemEconomy>,
    interval: Ticks,
) -> TaskHandle {
    let weak = Arc::downgrade(session);
    session.ctx().scheduler.run_timer(interval, interval, move || {
        let Some(session) = weak.upgrade() else {
            return TaskFlow::Stop;
        };
        if !session.is_running() {
            return TaskFlow::Stop;
        }
        if economy.table().is_empty() {
            debug!(arena = %session.name(), "item pool empty, skipping grant");
            return TaskFlow::Continue;
        }

        let ctx = session.ctx();
        let alive = session.alive_players();
        let grants: Vec<_> = {
            let mut rng = rand::rng();
            alive
                .into_iter()
                .filter_map(|player| economy.draw(&mut rng).map(|item| (player, item)))
                .collect()
        };
        debug!(arena = %session.name(), players = grants.len(), "granting items");
        for (player, item) in grants {
            if let Some(job) = ctx.at_player(player, move |w| w.give_item(player, item)) {
                job.detach();
            }
        }
        TaskFlow::Continue
    })
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    fn test_draw_frequencies_follow_weights() {
        let pool = WeightedPool::new([("a", 1), ("b", 3), ("c", 6)]);
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = BTreeMap::new();
        let trials = 60_000;
        for _ in 0..trials {
            *counts.entry(*pool.draw(&mut rng).unwrap()).or_insert(0u32) += 1;
        }
        for (item, weight) in [("a", 0.1), ("b", 0.3), ("c", 0.6)] {
            let observed = f64::from(counts[item]) / trials as f64;
            assert!((observed - weight).abs() < 0.02, "{item}: {observed}");
        }
    }

    #[test]
    fn test_non_positive_weights_never_drawn() {
        let pool = WeightedPool::new([("zero", 0), ("neg", -5), ("ok", 2)]);
        assert_eq!(pool.len(), 1);
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..1000 {
            assert_eq!(pool.draw(&mut rng), Some(&"ok"));
        }
    }

    #[test]
    fn test_empty_pool_draws_nothing() {
        let pool: WeightedPool<&str> = WeightedPool::new([("x", 0)]);
        assert!(pool.is_empty());
        assert!(pool.draw(&mut StdRng::seed_from_u64(1)).is_none());
    }

    #[test]
    fn test_table_drops_unknown_identifiers() {
        let raw: BTreeMap<String, i64> = [
            ("minecraft:bow".to_string(), 4),
            ("laser_cannon".to_string(), 9),
            ("arrow".to_string(), 0),
        ]
        .into_iter()
        .collect();
        let table = ItemTable::from_raw(&raw);
        assert_eq!(table.pool().len(), 1);
        assert_eq!(table.pool().total_weight(), 4);
    }

    #[test]
    fn test_potions_carry_an_allowed_effect() {
        let raw: BTreeMap<String, i64> = [("splash_potion".to_string(), 1)].into_iter().collect();
        let economy = ItemEconomy::new(ItemTable::from_raw(&raw));
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let stack = economy.draw(&mut rng).unwrap();
            assert_eq!(stack.kind, ItemKind::SplashPotion);
            assert!(PotionKind::ALLOWED.contains(&stack.potion.unwrap()));
        }
    }

    #[test]
    fn test_plain_items_have_no_potion() {
        let raw: BTreeMap<String, i64> = [("iron_sword".to_string(), 1)].into_iter().collect();
        let economy = ItemEconomy::new(ItemTable::from_raw(&raw));
        let stack = economy.draw(&mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(stack, ItemStack::one(ItemKind::IronSword));
    }
}
