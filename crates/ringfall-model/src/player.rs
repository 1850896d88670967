//! Player state that a match reads, changes, and restores.

use serde::{Deserialize, Serialize};

use crate::ItemStack;

/// How a player interacts with the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    Survival,
    Adventure,
    Creative,
    Spectator,
}

/// A full copy of a player's inventory contents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub items: Vec<ItemStack>,
}

impl Inventory {
    pub fn new(items: Vec<ItemStack>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Current and maximum health, in half-hearts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub current: f64,
    pub max: f64,
}

impl Health {
    /// Health after healing by `amount`, never above `max`.
    pub fn healed(&self, amount: f64) -> f64 {
        (self.current + amount).min(self.max)
    }
}

/// Timed status effects a match applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    SlowFalling,
    Levitation,
    Speed,
    Glowing,
    Slowness,
    Resistance,
}

/// A status effect with a duration in game ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEffect {
    pub kind: EffectKind,
    pub duration_ticks: u64,
    pub amplifier: u8,
}

impl StatusEffect {
    pub fn new(kind: EffectKind, duration_ticks: u64) -> Self {
        Self {
            kind,
            duration_ticks,
            amplifier: 0,
        }
    }

    pub fn amplified(mut self, amplifier: u8) -> Self {
        self.amplifier = amplifier;
        self
    }
}

/// Entities spawned by hazard events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Arrow,
    Ghast,
    Zombie,
    Creeper,
    EndCrystal,
}
