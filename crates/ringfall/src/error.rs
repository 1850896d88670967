//! Unified error type for Ringfall.

use ringfall_arena::{ArenaError, ConfigError, EnvironmentError, StatsError};
use ringfall_region::DispatchError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum RingfallError {
    /// An arena operation was refused.
    #[error(transparent)]
    Arena(#[from] ArenaError),

    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A region job could not be run.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// The environment provider failed.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),

    /// The stats store failed.
    #[error(transparent)]
    Stats(#[from] StatsError),

    /// The builder is missing a required collaborator.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// Ringfall must be built inside a Tokio runtime.
    #[error("no tokio runtime available")]
    NoRuntime,
}
