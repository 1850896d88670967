//! The command surface: every operation players and admins can invoke.
//!
//! Commands arrive already parsed. How they are typed in or sent over a
//! wire is the host's business.

use std::collections::BTreeMap;
use std::sync::Arc;

use ringfall_arena::{ArenaError, ArenaRegistry, ArenaReport};
use ringfall_model::PlayerId;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::RingfallError;

/// An arena operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Create an arena. The initiator, if any, joins it.
    CreateArena {
        name: String,
        #[serde(default)]
        initiator: Option<PlayerId>,
    },
    DeleteArena { name: String },
    Join { player: PlayerId, arena: String },
    Leave { player: PlayerId, arena: String },
    StartWithCountdown { arena: String },
    Cancel { arena: String },
    ForceStop { arena: String },
    /// Select a map, or a random one when `map` is absent.
    SelectMap {
        arena: String,
        #[serde(default)]
        map: Option<String>,
    },
    /// Vote for the next map, or withdraw the vote when `map` is absent.
    Vote {
        player: PlayerId,
        arena: String,
        #[serde(default)]
        map: Option<String>,
    },
    /// One arena's status, or every arena's when `arena` is absent.
    Status {
        #[serde(default)]
        arena: Option<String>,
    },
}

/// The result of a successful command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Done { message: String },
    MapSelected { arena: String, map: String },
    /// Votes per map after a ballot.
    Tally {
        arena: String,
        tally: BTreeMap<String, usize>,
    },
    Report { report: ArenaReport },
    Reports { reports: Vec<ArenaReport> },
}

impl Reply {
    fn done(message: impl Into<String>) -> Self {
        Self::Done {
            message: message.into(),
        }
    }
}

/// Runs [`Command`]s against an [`ArenaRegistry`].
#[derive(Clone)]
pub struct CommandSurface {
    registry: Arc<ArenaRegistry>,
}

impl CommandSurface {
    pub fn new(registry: Arc<ArenaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ArenaRegistry> {
        &self.registry
    }

    pub fn execute(&self, command: Command) -> Result<Reply, RingfallError> {
        debug!(?command, "executing command");
        let registry = &self.registry;
        let reply = match command {
            Command::CreateArena { name, initiator } => {
                registry.try_create(&name, initiator)?;
                Reply::done(format!("Arena {name} created."))
            }
            Command::DeleteArena { name } => {
                registry.try_delete(&name)?;
                Reply::done(format!("Arena {name} deleted."))
            }
            Command::Join { player, arena } => {
                registry.try_join(player, &arena)?;
                Reply::done(format!("{player} joined {arena}."))
            }
            Command::Leave { player, arena } => {
                registry.try_leave(player, &arena)?;
                Reply::done(format!("{player} left {arena}."))
            }
            Command::StartWithCountdown { arena } => {
                registry.start_countdown(&arena)?;
                Reply::done(format!("Countdown started in {arena}."))
            }
            Command::Cancel { arena } => {
                registry.cancel(&arena)?;
                Reply::done(format!("Countdown cancelled in {arena}."))
            }
            Command::ForceStop { arena } => {
                registry.force_stop(&arena)?;
                Reply::done(format!("Arena {arena} stopped."))
            }
            Command::SelectMap { arena, map } => {
                let map = registry.select_map(&arena, map.as_deref())?;
                Reply::MapSelected { arena, map }
            }
            Command::Vote { player, arena, map } => {
                let tally = registry.vote(player, &arena, map.as_deref())?;
                Reply::Tally { arena, tally }
            }
            Command::Status { arena: Some(arena) } => {
                let report = registry
                    .status(&arena)
                    .ok_or(ArenaError::NotFound(arena))?;
                Reply::Report { report }
            }
            Command::Status { arena: None } => Reply::Reports {
                reports: registry.reports(),
            },
        };
        Ok(reply)
    }
}
