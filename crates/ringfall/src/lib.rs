//! # Ringfall
//!
//! Match orchestration for a multi-arena battle royale.
//!
//! Ringfall runs many independent arenas side by side on one game host.
//! Each arena gathers players, counts down, drops everyone onto spawn
//! platforms, shrinks a zone around them, hands out items, throws random
//! hazards at them, and declares the last one standing the winner.
//!
//! The host plugs in its world through [`GameWorld`](prelude::GameWorld)
//! and a stats backend through [`StatsStore`](prelude::StatsStore);
//! everything else has a default.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ringfall::prelude::*;
//!
//! // let ringfall = Ringfall::builder()
//! //     .world(my_world)
//! //     .stats(my_stats)
//! //     .build()?;
//! // ringfall.execute(Command::Join { player: PlayerId(1), arena: "alpha".into() })?;
//! ```

mod commands;
mod error;
mod logging;
mod runtime;

pub use commands::{Command, CommandSurface, Reply};
pub use error::RingfallError;
pub use logging::{LogFormat, init_tracing};
pub use runtime::{Ringfall, RingfallBuilder};

pub use ringfall_arena as arena;
pub use ringfall_model as model;
pub use ringfall_region as region;
pub use ringfall_tick as tick;

pub mod prelude {
    pub use crate::{Command, CommandSurface, LogFormat, Reply, Ringfall, RingfallError, init_tracing};
    pub use ringfall_arena::{
        ArenaRegistry, ArenaReport, ArenaStatus, ConfigSnapshot, ConfigurationProvider,
        EnvironmentProvider, GameWorld, MatchSettings, SharedConfig, StatEvent, StatsStore,
    };
    pub use ringfall_model::{Location, PlayerId, WorldId};
    pub use ringfall_tick::Ticks;
}
