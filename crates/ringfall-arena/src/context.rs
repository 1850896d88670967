//! Collaborators shared by every arena.

use std::sync::Arc;

use ringfall_model::{Location, Notice, PlayerId};
use ringfall_region::{Dispatch, RegionDispatcher};
use ringfall_tick::Scheduler;
use tracing::warn;

use crate::{
    ConfigSnapshot, ConfigurationProvider, EnvironmentProvider, GameWorld, StatEvent, StatsStore,
};

/// Everything an arena needs from the outside, built once at startup and
/// cloned into every arena.
#[derive(Clone)]
pub struct ArenaContext {
    pub world: Arc<dyn GameWorld>,
    pub stats: Arc<dyn StatsStore>,
    pub environment: Arc<dyn EnvironmentProvider>,
    pub config: Arc<dyn ConfigurationProvider>,
    pub regions: RegionDispatcher,
    pub scheduler: Scheduler,
}

impl ArenaContext {
    pub fn snapshot(&self) -> Arc<ConfigSnapshot> {
        self.config.snapshot()
    }

    /// Records a stat in the background. Failures are logged.
    pub fn record(&self, player: PlayerId, event: StatEvent) {
        let stats = Arc::clone(&self.stats);
        self.scheduler.spawn(async move {
            if let Err(err) = stats.record(player, event).await {
                warn!(%player, ?event, error = %err, "stat not recorded");
            }
        });
    }

    pub fn notify(&self, players: &[PlayerId], notice: Notice) {
        if !players.is_empty() {
            self.world.notify(players, &notice);
        }
    }

    /// Runs `f` in the region that owns `at`.
    pub fn at<F, T>(&self, at: &Location, f: F) -> Dispatch<T>
    where
        F: FnOnce(&dyn GameWorld) -> T + Send + 'static,
        T: Send + 'static,
    {
        let world = Arc::clone(&self.world);
        self.regions.execute(at, move || f(world.as_ref()))
    }

    /// Runs `f` in the region where `player` currently stands. Skipped
    /// when the player is offline.
    pub fn at_player<F, T>(&self, player: PlayerId, f: F) -> Option<Dispatch<T>>
    where
        F: FnOnce(&dyn GameWorld) -> T + Send + 'static,
        T: Send + 'static,
    {
        let here = self.world.location(player)?;
        Some(self.at(&here, f))
    }
}
