//! External collaborators: statistics, isolated environments, and the
//! room directory used for roster reconciliation.

use async_trait::async_trait;
use ringfall_model::{PlayerId, WorldId};
use serde::{Deserialize, Serialize};

use crate::{EnvironmentError, StatsError};

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// A counter update for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatEvent {
    Win,
    Loss,
    Kill,
    Death,
}

/// Persistent win/loss/kill/death counters.
///
/// The match core always calls this from a spawned task and never waits
/// on the result.
#[async_trait]
pub trait StatsStore: Send + Sync + 'static {
    async fn record(&self, player: PlayerId, event: StatEvent) -> Result<(), StatsError>;
}

// ---------------------------------------------------------------------------
// Environments
// ---------------------------------------------------------------------------

/// An isolated world instance created for one arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceHandle {
    /// The key the instance was created under.
    pub key: String,
    /// The world the instance lives in.
    pub world: WorldId,
}

/// Clones and destroys per-arena worlds.
pub trait EnvironmentProvider: Send + Sync + 'static {
    fn create_instance(&self, template: &str, key: &str) -> Result<InstanceHandle, EnvironmentError>;

    /// Returns `false` if the instance could not be destroyed.
    fn destroy_instance(&self, handle: &InstanceHandle) -> bool;
}

/// The provider used when the host has no way to clone worlds. Arenas
/// play in the shared template world.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEnvironment;

impl EnvironmentProvider for NoopEnvironment {
    fn create_instance(&self, _template: &str, _key: &str) -> Result<InstanceHandle, EnvironmentError> {
        Err(EnvironmentError::Unsupported)
    }

    fn destroy_instance(&self, _handle: &InstanceHandle) -> bool {
        false
    }
}

/// The instance key for `arena` cloned from `template`:
/// `<template>_<arena name lowercased, non-alphanumerics as '_'>`.
pub fn instance_key(template: &str, arena: &str) -> String {
    let normalized: String = arena
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("{template}_{normalized}")
}

// ---------------------------------------------------------------------------
// Room directory
// ---------------------------------------------------------------------------

/// The authoritative record of who is in which arena.
pub trait RoomDirectory: Send + Sync {
    fn members_of(&self, arena: &str) -> Vec<PlayerId>;

    fn arena_of(&self, player: PlayerId) -> Option<String>;
}
