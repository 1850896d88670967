//! Arena lifecycle state machine.

use serde::{Deserialize, Serialize};

/// The lifecycle status of an arena.
///
/// Rounds follow a fixed cycle:
///
/// ```text
/// Waiting → Preparing → Running → Ending → Waiting
/// ```
///
/// - **Waiting**: accepting players, no round in progress.
/// - **Preparing**: countdown running. Still accepting players.
/// - **Running**: the round is live; controllers are ticking.
/// - **Ending**: a winner (or nobody) is decided; the grace period before
///   cleanup is running.
///
/// The only backward edge is `Preparing → Waiting`, taken when a
/// countdown is cancelled or expires without enough players.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArenaStatus {
    #[default]
    Waiting,
    Preparing,
    Running,
    Ending,
}

impl ArenaStatus {
    /// Returns `true` if players may join.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Self::Waiting | Self::Preparing)
    }

    /// Returns `true` while a countdown or round is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Preparing | Self::Running)
    }

    /// The next status in the cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Waiting => Self::Preparing,
            Self::Preparing => Self::Running,
            Self::Running => Self::Ending,
            Self::Ending => Self::Waiting,
        }
    }

    /// Returns `true` if moving to `target` is allowed.
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == target || (self == Self::Preparing && target == Self::Waiting)
    }
}

impl std::fmt::Display for ArenaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Waiting => write!(f, "WAITING"),
            Self::Preparing => write!(f, "PREPARING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Ending => write!(f, "ENDING"),
        }
    }
}
