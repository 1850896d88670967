//! Error types for the arena layer.

use ringfall_model::PlayerId;

use crate::ArenaStatus;

/// Errors that can occur during arena operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArenaError {
    /// No arena with this name exists.
    #[error("arena {0} not found")]
    NotFound(String),

    /// An arena with this name already exists.
    #[error("arena {0} already exists")]
    AlreadyExists(String),

    /// Arena names are 1-32 characters of letters, digits, `_` or `-`.
    #[error("invalid arena name: {0:?}")]
    InvalidName(String),

    /// The player is not online.
    #[error("player {0} is offline")]
    PlayerOffline(PlayerId),

    /// The player is already in this arena and cannot rejoin now.
    #[error("player {0} already in arena {1}")]
    AlreadyInArena(PlayerId, String),

    /// The player is not in this arena.
    #[error("player {0} not in arena {1}")]
    NotInArena(PlayerId, String),

    /// The arena's status does not allow this operation.
    #[error("arena {name} cannot do that while {status}")]
    InvalidState { name: String, status: ArenaStatus },

    /// The arena has no spawn point to gather or place players.
    #[error("arena {0} has no spawn point")]
    MissingAnchor(String),

    /// Too few players to start.
    #[error("arena {name} needs {required} players, has {present}")]
    NotEnoughPlayers {
        name: String,
        required: usize,
        present: usize,
    },

    /// The requested map is not configured.
    #[error("map {0} not found")]
    UnknownMap(String),

    /// A random map was requested but none are configured.
    #[error("no maps configured")]
    NoMaps,

    /// The arena is not collecting map votes right now.
    #[error("arena {0} has no open map vote")]
    NoVote(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors reported by an [`EnvironmentProvider`](crate::EnvironmentProvider).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvironmentError {
    /// The host cannot create isolated instances.
    #[error("isolated environments are not supported")]
    Unsupported,

    /// The template world does not exist.
    #[error("template {0} not found")]
    TemplateMissing(String),

    /// Creating the instance failed.
    #[error("instance creation failed: {0}")]
    Failed(String),
}

/// Errors reported by a [`StatsStore`](crate::StatsStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    /// The backing store could not be reached.
    #[error("stats store unavailable: {0}")]
    Unavailable(String),
}
