//! Named arenas and their lifecycle status.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use ringfall_model::{Location, PlayerId};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::services::instance_key;
use crate::{ArenaStatus, EnvironmentProvider, InstanceHandle, MatchSession};

/// An isolated instance created for the current round.
#[derive(Debug, Clone)]
pub(crate) struct ActiveInstance {
    pub template: String,
    pub handle: InstanceHandle,
}

/// The parts of an arena shared between the registry and its session.
#[derive(Debug)]
pub struct ArenaCore {
    name: String,
    status: RwLock<ArenaStatus>,
    anchor: RwLock<Option<Location>>,
    /// Where the current countdown gathers players. Set when an isolated
    /// instance rebases the anchor.
    round_anchor: RwLock<Option<Location>>,
    map: RwLock<Option<String>>,
    instance: Mutex<Option<ActiveInstance>>,
}

impl ArenaCore {
    pub(crate) fn new(name: impl Into<String>, anchor: Option<Location>) -> Self {
        Self {
            name: name.into(),
            status: RwLock::new(ArenaStatus::Waiting),
            anchor: RwLock::new(anchor),
            round_anchor: RwLock::new(None),
            map: RwLock::new(None),
            instance: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ArenaStatus {
        *self.status.read()
    }

    /// Moves to `to` if the lifecycle allows it.
    pub(crate) fn transition(&self, to: ArenaStatus) -> bool {
        let mut status = self.status.write();
        if !status.can_transition_to(to) {
            debug!(arena = %self.name, from = %*status, to = %to, "transition refused");
            return false;
        }
        info!(arena = %self.name, from = %*status, to = %to, "arena status changed");
        *status = to;
        true
    }

    /// Sets the status without checking the lifecycle. Used to repair
    /// desync only.
    pub(crate) fn force_status(&self, to: ArenaStatus) {
        *self.status.write() = to;
    }

    pub fn anchor(&self) -> Option<Location> {
        self.anchor.read().clone()
    }

    pub(crate) fn set_anchor(&self, anchor: Location) {
        *self.anchor.write() = Some(anchor);
    }

    /// The round anchor if one is set, else the arena anchor.
    pub fn gather_point(&self) -> Option<Location> {
        self.round_anchor.read().clone().or_else(|| self.anchor())
    }

    pub(crate) fn set_round_anchor(&self, anchor: Option<Location>) {
        *self.round_anchor.write() = anchor;
    }

    pub fn map(&self) -> Option<String> {
        self.map.read().clone()
    }

    pub(crate) fn set_map(&self, map: Option<String>) {
        *self.map.write() = map;
    }

    pub(crate) fn set_instance(&self, template: &str, handle: InstanceHandle) {
        let previous = self.instance.lock().replace(ActiveInstance {
            template: template.to_string(),
            handle,
        });
        if let Some(old) = previous {
            warn!(arena = %self.name, key = %old.handle.key, "replacing an unreleased instance");
        }
    }

    /// Detaches the current instance and the round anchor that pointed
    /// into it.
    pub(crate) fn take_instance(&self) -> Option<ActiveInstance> {
        self.round_anchor.write().take();
        self.instance.lock().take()
    }

    /// Destroys `instance` if it belongs to this arena.
    pub(crate) fn release_instance(&self, env: &dyn EnvironmentProvider, instance: ActiveInstance) {
        let expected = instance_key(&instance.template, &self.name);
        if instance.handle.key != expected {
            warn!(
                arena = %self.name,
                key = %instance.handle.key,
                %expected,
                "instance key does not belong to arena, not destroying"
            );
            return;
        }
        if env.destroy_instance(&instance.handle) {
            info!(arena = %self.name, key = %expected, "instance released");
        } else {
            warn!(arena = %self.name, key = %expected, "instance release failed");
        }
    }
}

/// A named arena: its shared core and its match session.
pub struct Arena {
    core: Arc<ArenaCore>,
    session: Arc<MatchSession>,
}

impl Arena {
    pub(crate) fn new(core: Arc<ArenaCore>, session: Arc<MatchSession>) -> Self {
        Self { core, session }
    }

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn status(&self) -> ArenaStatus {
        self.core.status()
    }

    pub fn core(&self) -> &Arc<ArenaCore> {
        &self.core
    }

    pub fn session(&self) -> &Arc<MatchSession> {
        &self.session
    }

    /// Repairs the recorded status from the session's flags. Returns the
    /// corrected status if it was wrong.
    pub fn sync_status(&self) -> Option<ArenaStatus> {
        let recorded = self.core.status();
        let actual = if self.session.is_running() {
            ArenaStatus::Running
        } else if self.session.is_preparing() {
            ArenaStatus::Preparing
        } else if recorded.is_active() {
            ArenaStatus::Waiting
        } else {
            return None;
        };
        if actual == recorded {
            return None;
        }
        warn!(arena = %self.name(), %recorded, %actual, "status desync, repairing");
        self.core.force_status(actual);
        Some(actual)
    }

    pub fn report(&self) -> ArenaReport {
        let mut participants = self.session.participants();
        let mut alive = self.session.alive_players();
        let mut spectators = self.session.spectators();
        participants.sort();
        alive.sort();
        spectators.sort();
        ArenaReport {
            name: self.name().to_string(),
            status: self.status(),
            map: self.core.map(),
            participants,
            alive,
            spectators,
            zone_diameter: self.session.zone_diameter(),
            anchor: self.core.gather_point(),
        }
    }
}

/// A point-in-time view of one arena.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArenaReport {
    pub name: String,
    pub status: ArenaStatus,
    pub map: Option<String>,
    pub participants: Vec<PlayerId>,
    pub alive: Vec<PlayerId>,
    pub spectators: Vec<PlayerId>,
    pub zone_diameter: Option<f64>,
    pub anchor: Option<Location>,
}
