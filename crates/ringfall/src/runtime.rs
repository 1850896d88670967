//! `Ringfall` builder and runtime.
//!
//! Wires the host's collaborators into an [`ArenaContext`], creates the
//! registry, and runs the periodic status sync.

use std::sync::Arc;

use ringfall_arena::{
    ArenaContext, ArenaRegistry, ConfigSnapshot, ConfigurationProvider, EnvironmentProvider,
    GameWorld, NoopEnvironment, SharedConfig, StatsStore,
};
use ringfall_region::{RegionConfig, RegionDispatcher};
use ringfall_tick::{Scheduler, SchedulerConfig, TaskFlow, TaskHandle, Ticks};
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::{Command, CommandSurface, Reply, RingfallError};

/// How often recorded arena statuses are checked against their sessions.
pub const DEFAULT_SYNC_INTERVAL: Ticks = Ticks::from_secs(5);

/// Builder for a [`Ringfall`] runtime.
///
/// The world and the stats store are required. Configuration defaults to
/// [`ConfigSnapshot::default`] and the environment to [`NoopEnvironment`].
pub struct RingfallBuilder {
    world: Option<Arc<dyn GameWorld>>,
    stats: Option<Arc<dyn StatsStore>>,
    environment: Arc<dyn EnvironmentProvider>,
    config: Option<Arc<dyn ConfigurationProvider>>,
    regions: RegionConfig,
    scheduler: SchedulerConfig,
    sync_interval: Ticks,
}

impl RingfallBuilder {
    pub fn new() -> Self {
        Self {
            world: None,
            stats: None,
            environment: Arc::new(NoopEnvironment),
            config: None,
            regions: RegionConfig::default(),
            scheduler: SchedulerConfig::default(),
            sync_interval: DEFAULT_SYNC_INTERVAL,
        }
    }

    pub fn world(mut self, world: Arc<dyn GameWorld>) -> Self {
        self.world = Some(world);
        self
    }

    pub fn stats(mut self, stats: Arc<dyn StatsStore>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn environment(mut self, environment: Arc<dyn EnvironmentProvider>) -> Self {
        self.environment = environment;
        self
    }

    pub fn config(mut self, config: Arc<dyn ConfigurationProvider>) -> Self {
        self.config = Some(config);
        self
    }

    /// Loads the configuration from a JSON document.
    pub fn config_json(self, text: &str) -> Result<Self, RingfallError> {
        let snapshot = ConfigSnapshot::from_json(text)?;
        Ok(self.config(Arc::new(SharedConfig::new(snapshot))))
    }

    pub fn regions(mut self, regions: RegionConfig) -> Self {
        self.regions = regions;
        self
    }

    pub fn scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn sync_interval(mut self, interval: Ticks) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Builds the runtime on the current Tokio runtime.
    pub fn build(self) -> Result<Ringfall, RingfallError> {
        let runtime = Handle::try_current().map_err(|_| RingfallError::NoRuntime)?;
        let world = self.world.ok_or(RingfallError::MissingCollaborator("world"))?;
        let stats = self.stats.ok_or(RingfallError::MissingCollaborator("stats"))?;
        let config = self
            .config
            .unwrap_or_else(|| Arc::new(SharedConfig::default()));

        let ctx = ArenaContext {
            world,
            stats,
            environment: self.environment,
            config,
            regions: RegionDispatcher::with_runtime(runtime.clone(), self.regions),
            scheduler: Scheduler::with_runtime(runtime, self.scheduler),
        };
        let registry = ArenaRegistry::new(ctx);
        let sync = start_status_sync(&registry, self.sync_interval);
        info!(sync_interval = %self.sync_interval, "ringfall started");

        Ok(Ringfall {
            commands: CommandSurface::new(Arc::clone(&registry)),
            registry,
            sync,
        })
    }
}

impl Default for RingfallBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn start_status_sync(registry: &Arc<ArenaRegistry>, interval: Ticks) -> TaskHandle {
    let weak = Arc::downgrade(registry);
    registry
        .context()
        .scheduler
        .run_timer(interval, interval, move || {
            let Some(registry) = weak.upgrade() else {
                return TaskFlow::Stop;
            };
            let repaired = registry.sync_statuses();
            if repaired > 0 {
                debug!(repaired, "arena statuses repaired");
            }
            TaskFlow::Continue
        })
}

/// A running Ringfall instance.
pub struct Ringfall {
    registry: Arc<ArenaRegistry>,
    commands: CommandSurface,
    sync: TaskHandle,
}

impl Ringfall {
    pub fn builder() -> RingfallBuilder {
        RingfallBuilder::new()
    }

    pub fn registry(&self) -> &Arc<ArenaRegistry> {
        &self.registry
    }

    pub fn commands(&self) -> &CommandSurface {
        &self.commands
    }

    pub fn execute(&self, command: Command) -> Result<Reply, RingfallError> {
        self.commands.execute(command)
    }

    /// Deletes every arena, returning all players, then stops the region
    /// workers once their queues drain.
    pub fn shutdown(self) {
        self.sync.cancel();
        let names = self.registry.arena_names();
        for name in &names {
            self.registry.delete_arena(name);
        }
        self.registry.context().regions.shutdown();
        info!(arenas = names.len(), "ringfall shut down");
    }
}
