//! Match settings, map definitions, and the configuration provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use ringfall_model::Location;
use ringfall_tick::Ticks;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::{ConfigError, Hazard};

// ---------------------------------------------------------------------------
// MatchSettings
// ---------------------------------------------------------------------------

/// A `min..=max` range of game ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: Ticks,
    pub max: Ticks,
}

impl DelayRange {
    pub const fn new(min: u64, max: u64) -> Self {
        Self {
            min: Ticks(min),
            max: Ticks(max),
        }
    }
}

/// Every tunable of a round.
///
/// Missing fields in a configuration document take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    /// Arena radius in blocks. The zone starts at twice this.
    pub radius: u32,
    /// Players required to start a round.
    pub min_players: usize,
    /// Countdown length before a round starts.
    pub countdown_secs: u32,
    /// Delay between reaching `min_players` and the countdown starting.
    pub auto_start_delay_secs: u32,
    /// Damage per second outside the zone.
    pub border_damage: f64,
    /// Time between item grants.
    pub item_interval: Ticks,
    /// Item identifier to draw weight.
    pub items: BTreeMap<String, i64>,
    /// Delay between hazard events.
    pub event_delay: DelayRange,
    /// Delay between hazard events once the zone is nearly closed.
    pub final_event_delay: DelayRange,
    /// Hazards the director picks from. Empty means all of them.
    pub hazards: Vec<Hazard>,
    /// Drop supply chests inside the zone while a round runs.
    pub airdrops: bool,
    /// Time before the first airdrop.
    pub airdrop_delay: Ticks,
    /// Time between airdrops.
    pub airdrop_interval: Ticks,
    /// Diameter removed per shrink step.
    pub shrink_amount: f64,
    /// Time between shrink steps.
    pub shrink_interval: Ticks,
    /// Time before the first shrink step.
    pub shrink_delay: Ticks,
    /// The zone never shrinks below this diameter.
    pub min_diameter: f64,
    /// Height of the pillar under each spawn platform.
    pub pillar_height: u32,
    /// Slow-fall granted once a player lands on their platform.
    pub landing_buff: Ticks,
    /// Pause between the deciding elimination and cleanup.
    pub end_grace: Ticks,
    /// Pause between returning players and releasing the environment.
    pub cleanup_grace: Ticks,
    /// Turn nearby bystanders into spectators at round start.
    pub capture_spectators: bool,
    /// Grant streak and bounty rewards on kills.
    pub rewards: bool,
}

impl Default for MatchSettings {
    fn default() -> Self {
        let items = [
            ("iron_sword", 10),
            ("bow", 10),
            ("arrow", 20),
            ("golden_apple", 5),
            ("cobblestone", 15),
        ]
        .into_iter()
        .map(|(id, w)| (id.to_string(), w))
        .collect();

        Self {
            radius: 48,
            min_players: 2,
            countdown_secs: 10,
            auto_start_delay_secs: 10,
            border_damage: 3.0,
            item_interval: Ticks(60),
            items,
            event_delay: DelayRange::new(600, 1200),
            final_event_delay: DelayRange::new(200, 600),
            hazards: Hazard::ALL.to_vec(),
            airdrops: true,
            airdrop_delay: Ticks(400),
            airdrop_interval: Ticks(800),
            shrink_amount: 4.0,
            shrink_interval: Ticks(100),
            shrink_delay: Ticks(200),
            min_diameter: 10.0,
            pillar_height: 128,
            landing_buff: Ticks(100),
            end_grace: Ticks(100),
            cleanup_grace: Ticks(100),
            capture_spectators: true,
            rewards: true,
        }
    }
}

impl MatchSettings {
    /// Clamp out-of-range values so the settings are safe to use.
    pub fn validated(mut self) -> Self {
        if self.min_players == 0 {
            warn!("min_players of 0 is invalid, using 1");
            self.min_players = 1;
        }
        if self.radius == 0 {
            warn!("radius of 0 is invalid, using 1");
            self.radius = 1;
        }
        if !(self.min_diameter > 0.0) {
            warn!(min_diameter = self.min_diameter, "min_diameter must be positive, using 1");
            self.min_diameter = 1.0;
        }
        let initial = self.initial_diameter();
        if self.min_diameter > initial {
            warn!(
                min_diameter = self.min_diameter,
                initial, "min_diameter exceeds starting zone, clamping"
            );
            self.min_diameter = initial;
        }
        if !(self.shrink_amount > 0.0) {
            warn!(shrink_amount = self.shrink_amount, "shrink_amount must be positive, using 1");
            self.shrink_amount = 1.0;
        }
        if self.item_interval.is_zero() {
            warn!("item_interval of 0 is invalid, using 1 tick");
            self.item_interval = Ticks::ONE;
        }
        if self.shrink_interval.is_zero() {
            warn!("shrink_interval of 0 is invalid, using 1 tick");
            self.shrink_interval = Ticks::ONE;
        }
        if self.airdrop_interval.is_zero() {
            warn!("airdrop_interval of 0 is invalid, using 1 tick");
            self.airdrop_interval = Ticks::ONE;
        }
        if self.hazards.is_empty() {
            warn!("no hazards configured, using all of them");
            self.hazards = Hazard::ALL.to_vec();
        }
        for (label, range) in [
            ("event_delay", &mut self.event_delay),
            ("final_event_delay", &mut self.final_event_delay),
        ] {
            if range.min.is_zero() {
                warn!(setting = label, "delay minimum of 0 is invalid, using 1 tick");
                range.min = Ticks::ONE;
            }
            if range.max < range.min {
                warn!(setting = label, min = %range.min, max = %range.max, "delay max below min, raising");
                range.max = range.min;
            }
        }
        self
    }

    /// The zone diameter at round start.
    pub fn initial_diameter(&self) -> f64 {
        f64::from(self.radius) * 2.0
    }
}

// ---------------------------------------------------------------------------
// Maps and lobby
// ---------------------------------------------------------------------------

/// A playable map: where the arena is anchored and what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDefinition {
    /// Human-readable name shown to players.
    #[serde(default)]
    pub name: Option<String>,
    /// The arena center and gather point.
    pub spawn: Location,
    /// Template world to clone an isolated instance from.
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub radius: Option<u32>,
    #[serde(default)]
    pub min_players: Option<usize>,
    #[serde(default)]
    pub countdown_secs: Option<u32>,
}

impl MapDefinition {
    /// `base` with this map's overrides applied.
    pub fn apply(&self, base: &MatchSettings) -> MatchSettings {
        let mut settings = base.clone();
        if let Some(radius) = self.radius {
            settings.radius = radius;
        }
        if let Some(min) = self.min_players {
            settings.min_players = min;
        }
        if let Some(secs) = self.countdown_secs {
            settings.countdown_secs = secs;
        }
        settings
    }
}

/// Where players go after a round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    pub enabled: bool,
    pub location: Option<Location>,
}

impl LobbyConfig {
    /// The lobby location, if the lobby is enabled and set.
    pub fn target(&self) -> Option<&Location> {
        if self.enabled { self.location.as_ref() } else { None }
    }
}

// ---------------------------------------------------------------------------
// ConfigSnapshot
// ---------------------------------------------------------------------------

/// An immutable view of the whole configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigSnapshot {
    pub settings: MatchSettings,
    /// Maps keyed by id.
    pub maps: BTreeMap<String, MapDefinition>,
    pub lobby: LobbyConfig,
    /// Spawn point for arenas created without a map.
    pub default_spawn: Option<Location>,
}

impl ConfigSnapshot {
    /// Parses a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validated settings for `map`, or the base settings when the map is
    /// unset or unknown.
    pub fn settings_for(&self, map: Option<&str>) -> MatchSettings {
        match map.and_then(|id| self.maps.get(id)) {
            Some(def) => def.apply(&self.settings).validated(),
            None => self.settings.clone().validated(),
        }
    }

    pub fn map(&self, id: &str) -> Option<&MapDefinition> {
        self.maps.get(id)
    }
}

// ---------------------------------------------------------------------------
// ConfigurationProvider
// ---------------------------------------------------------------------------

/// Supplies configuration as a read-only snapshot per operation.
///
/// Implementations may swap the snapshot at any time; callers never hold
/// on to one across a round boundary.
pub trait ConfigurationProvider: Send + Sync + 'static {
    fn snapshot(&self) -> Arc<ConfigSnapshot>;
}

/// A hot-reloadable in-memory configuration.
#[derive(Debug, Default)]
pub struct SharedConfig {
    current: RwLock<Arc<ConfigSnapshot>>,
}

impl SharedConfig {
    pub fn new(snapshot: ConfigSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Replaces the configuration. Running rounds keep the snapshot they
    /// started with; the next operation sees the new one.
    pub fn reload(&self, snapshot: ConfigSnapshot) {
        *self.current.write() = Arc::new(snapshot);
        tracing::info!("configuration reloaded");
    }
}

impl ConfigurationProvider for SharedConfig {
    fn snapshot(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.current.read())
    }
}
