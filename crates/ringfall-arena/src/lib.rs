//! Arena registry and match orchestration for Ringfall.
//!
//! This crate runs many independent arenas side by side. Each arena cycles
//! through `WAITING → PREPARING → RUNNING → ENDING → WAITING`, and while a
//! round runs it drives its controllers: the shrinking zone, periodic
//! item grants, supply drops, and randomly timed hazard events.
//!
//! # Key types
//!
//! - [`ArenaRegistry`]: creates and deletes arenas, routes players, debounces auto-start
//! - [`MatchSession`]: one arena's roster, snapshots, and round lifecycle
//! - [`ArenaStatus`]: the lifecycle state machine
//! - [`ZoneShrink`], [`ItemEconomy`] / [`WeightedPool`], [`Hazard`]: the controllers' logic
//! - [`SafeTeleportResolver`]: finds a safe location to return a player to
//! - [`ArenaContext`]: the collaborators every arena shares
//!
//! # Collaborators
//!
//! The host supplies a [`GameWorld`], a [`StatsStore`], an
//! [`EnvironmentProvider`] and a [`ConfigurationProvider`]. With the
//! `testing` feature, the `memory` module has in-memory versions of each.

mod airdrop;
mod arena;
mod config;
mod context;
mod error;
mod events;
mod items;
mod layout;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
mod registry;
mod resolution;
mod rewards;
mod safe_teleport;
mod services;
mod session;
mod status;
mod vote;
mod world;
mod zone;

pub use airdrop::{Airdrop, drop_offset, fill_chest};
pub use arena::{Arena, ArenaCore, ArenaReport};
pub use config::{
    ConfigSnapshot, ConfigurationProvider, DelayRange, LobbyConfig, MapDefinition, MatchSettings,
    SharedConfig,
};
pub use context::ArenaContext;
pub use error::{ArenaError, ConfigError, EnvironmentError, StatsError};
pub use events::{Hazard, next_delay};
pub use items::{ItemEconomy, ItemTable, WeightedPool};
pub use layout::{Platform, platform_at, ring_radius, spawn_ring};
pub use registry::{ArenaRegistry, MAX_NAME_LEN, validate_name};
pub use resolution::{Elimination, EliminationCause, RoundOutcome, outcome_for};
pub use rewards::{Grant, KillOutcome, Streak, StreakBook, kill_rewards};
pub use safe_teleport::{SafeTeleportResolver, ZoneBounds};
pub use services::{
    EnvironmentProvider, InstanceHandle, NoopEnvironment, RoomDirectory, StatEvent, StatsStore,
    instance_key,
};
pub use session::{MatchSession, Snapshot};
pub use status::ArenaStatus;
pub use vote::MapVote;
pub use world::GameWorld;
pub use zone::{ActiveZone, ShrinkStep, ZoneShrink};
