//! Game-tick scheduling for Ringfall.
//!
//! Match timings are expressed in game ticks ([`Ticks`], 20 per second)
//! rather than wall-clock durations. This crate converts ticks to real
//! time and runs the **global** scheduling domain: delayed and repeating
//! tasks that have no spatial affinity (countdowns, displays, event
//! bookkeeping).
//!
//! # Key types
//!
//! - [`Scheduler`]: spawns delayed ([`Scheduler::run_later`]) and
//!   fixed-rate ([`Scheduler::run_timer`]) tasks
//! - [`TaskHandle`]: cancels a task; cancellation is synchronous
//! - [`TaskSet`]: a list of handles owned by one match, cancelled together
//! - [`SchedulerConfig`] / [`TickPolicy`]: tick length and missed-tick handling
//!
//! Work that mutates a location belongs to the region domain instead
//! (`ringfall-region`); a global task that needs to touch the world
//! dispatches from here.

use std::fmt;
use std::ops::{Add, Mul};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

mod scheduler;
mod task;

pub use scheduler::{Scheduler, SchedulerMetrics};
pub use task::{TaskFlow, TaskHandle, TaskSet};

/// Game ticks per real second.
pub const TICKS_PER_SECOND: u64 = 20;

// ---------------------------------------------------------------------------
// Ticks
// ---------------------------------------------------------------------------

/// A span of game time.
///
/// One tick is 1/20 s at the standard rate. Configuration values are
/// stored in ticks so that they read the same as the game's own timers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Ticks(pub u64);

impl Ticks {
    pub const ZERO: Ticks = Ticks(0);
    pub const ONE: Ticks = Ticks(1);

    /// Whole seconds of game time.
    pub const fn from_secs(secs: u64) -> Self {
        Self(secs * TICKS_PER_SECOND)
    }

    /// Real time at the standard tick rate.
    pub fn to_duration(self) -> Duration {
        Duration::from_millis(self.0 * (1000 / TICKS_PER_SECOND))
    }

    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / TICKS_PER_SECOND as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_sub(self, other: Ticks) -> Ticks {
        Ticks(self.0.saturating_sub(other.0))
    }
}

impl Add for Ticks {
    type Output = Ticks;

    fn add(self, rhs: Ticks) -> Ticks {
        Ticks(self.0 + rhs.0)
    }
}

impl Mul<u64> for Ticks {
    type Output = Ticks;

    fn mul(self, rhs: u64) -> Ticks {
        Ticks(self.0 * rhs)
    }
}

impl fmt::Display for Ticks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t", self.0)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What a repeating task does when it falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickPolicy {
    /// Skip missed runs and stay on the original cadence.
    #[default]
    Skip,
    /// Run every missed invocation back to back.
    CatchUp,
    /// Shift the whole schedule so the next run is one period from now.
    Delay,
}

impl From<TickPolicy> for tokio::time::MissedTickBehavior {
    fn from(policy: TickPolicy) -> Self {
        match policy {
            TickPolicy::Skip => tokio::time::MissedTickBehavior::Skip,
            TickPolicy::CatchUp => tokio::time::MissedTickBehavior::Burst,
            TickPolicy::Delay => tokio::time::MissedTickBehavior::Delay,
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Real-time length of one game tick. Default: 50 ms.
    pub tick_length: Duration,
    /// Missed-tick handling for repeating tasks.
    pub policy: TickPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_length: Duration::from_millis(1000 / TICKS_PER_SECOND),
            policy: TickPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    /// Shortest tick the scheduler accepts.
    pub const MIN_TICK_LENGTH: Duration = Duration::from_millis(1);
    /// Longest tick the scheduler accepts.
    pub const MAX_TICK_LENGTH: Duration = Duration::from_secs(1);

    /// Clamp out-of-range values so the config is safe to use.
    ///
    /// Called by [`Scheduler::new`].
    pub fn validated(mut self) -> Self {
        let clamped = self
            .tick_length
            .clamp(Self::MIN_TICK_LENGTH, Self::MAX_TICK_LENGTH);
        if clamped != self.tick_length {
            warn!(
                requested_ms = self.tick_length.as_secs_f64() * 1000.0,
                clamped_ms = clamped.as_secs_f64() * 1000.0,
                "tick_length out of range, clamping"
            );
            self.tick_length = clamped;
        }
        self
    }

    /// Real time covered by `ticks` at this configuration's tick length.
    pub fn duration_of(&self, ticks: Ticks) -> Duration {
        self.tick_length.saturating_mul(ticks.0.min(u32::MAX as u64) as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_from_secs() {
        assert_eq!(Ticks::from_secs(5), Ticks(100));
        assert_eq!(Ticks(100).to_duration(), Duration::from_secs(5));
        assert_eq!(Ticks(30).as_secs_f64(), 1.5);
    }

    #[test]
    fn test_ticks_arithmetic() {
        assert_eq!(Ticks(20) + Ticks(5), Ticks(25));
        assert_eq!(Ticks(20) * 3, Ticks(60));
        assert_eq!(Ticks(5).saturating_sub(Ticks(9)), Ticks::ZERO);
    }

    #[test]
    fn test_ticks_display() {
        assert_eq!(Ticks(60).to_string(), "60t");
    }

    #[test]
    fn test_validated_clamps_tick_length() {
        let cfg = SchedulerConfig {
            tick_length: Duration::ZERO,
            ..Default::default()
        }
        .validated();
        assert_eq!(cfg.tick_length, SchedulerConfig::MIN_TICK_LENGTH);

        let cfg = SchedulerConfig {
            tick_length: Duration::from_secs(10),
            ..Default::default()
        }
        .validated();
        assert_eq!(cfg.tick_length, SchedulerConfig::MAX_TICK_LENGTH);
    }

    #[test]
    fn test_duration_of_uses_tick_length() {
        let cfg = SchedulerConfig {
            tick_length: Duration::from_millis(10),
            ..Default::default()
        };
        assert_eq!(cfg.duration_of(Ticks(20)), Duration::from_millis(200));
    }
}
