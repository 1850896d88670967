//! The arena registry: creates, tracks, and routes players to arenas.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rand::seq::IteratorRandom;
use ringfall_model::{Location, Notice, PlayerId};
use ringfall_tick::{TaskHandle, Ticks};
use tracing::{debug, info, warn};

use crate::arena::ArenaCore;
use crate::services::instance_key;
use crate::vote::MapVote;
use crate::{
    Arena, ArenaContext, ArenaError, ArenaReport, ArenaStatus, MatchSession, RoomDirectory,
};

/// Longest accepted arena name.
pub const MAX_NAME_LEN: usize = 32;

/// An auto-start timer waiting to fire.
struct PendingStart {
    generation: u64,
    handle: TaskHandle,
}

/// Owns every arena and the player → arena index.
///
/// This is the entry point for arena operations from the command surface
/// and host events. A player is in at most one arena at a time.
pub struct ArenaRegistry {
    me: Weak<ArenaRegistry>,
    ctx: ArenaContext,
    arenas: DashMap<String, Arc<Arena>>,
    /// Maps each player to the arena they're in.
    members: DashMap<PlayerId, String>,
    auto_start: DashMap<String, PendingStart>,
    generation: AtomicU64,
    /// Open map votes, by arena.
    votes: DashMap<String, MapVote>,
}

impl ArenaRegistry {
    pub fn new(ctx: ArenaContext) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            ctx,
            arenas: DashMap::new(),
            members: DashMap::new(),
            auto_start: DashMap::new(),
            generation: AtomicU64::new(0),
            votes: DashMap::new(),
        })
    }

    pub fn context(&self) -> &ArenaContext {
        &self.ctx
    }

    pub fn arena(&self, name: &str) -> Option<Arc<Arena>> {
        self.arenas.get(name).map(|a| Arc::clone(a.value()))
    }

    pub fn arena_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.arenas.iter().map(|a| a.key().clone()).collect();
        names.sort();
        names
    }

    /// The arena `player` is in.
    pub fn arena_of_player(&self, player: PlayerId) -> Option<String> {
        self.members.get(&player).map(|name| name.clone())
    }

    // -----------------------------------------------------------------------
    // Create / delete
    // -----------------------------------------------------------------------

    /// Creates an arena anchored at the configured default spawn, or at
    /// the initiator's position. The initiator joins it.
    pub fn try_create(&self, name: &str, initiator: Option<PlayerId>) -> Result<(), ArenaError> {
        validate_name(name)?;
        let anchor = self
            .ctx
            .snapshot()
            .default_spawn
            .clone()
            .or_else(|| initiator.and_then(|p| self.ctx.world.location(p)));
        self.create_at(name, anchor)?;
        if let Some(player) = initiator {
            if let Err(err) = self.try_join(player, name) {
                warn!(arena = %name, %player, error = %err, "creator could not join");
            }
        }
        Ok(())
    }

    pub fn create_arena(&self, name: &str, initiator: Option<PlayerId>) -> bool {
        self.try_create(name, initiator).is_ok()
    }

    fn create_at(&self, name: &str, anchor: Option<Location>) -> Result<Arc<Arena>, ArenaError> {
        match self.arenas.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ArenaError::AlreadyExists(name.to_string())),
            Entry::Vacant(slot) => {
                let core = Arc::new(ArenaCore::new(name, anchor));
                let directory: Weak<dyn RoomDirectory> = self.me.clone();
                let session = MatchSession::new(Arc::clone(&core), self.ctx.clone(), directory);
                let arena = Arc::new(Arena::new(core, session));
                slot.insert(Arc::clone(&arena));
                info!(arena = %name, anchored = arena.core().anchor().is_some(), "arena created");
                Ok(arena)
            }
        }
    }

    /// Force-stops the arena's session, then removes the arena.
    ///
    /// Every task is cancelled and every player returned before any state
    /// is dropped. The isolated instance, if any, is released after the
    /// cleanup grace period.
    pub fn try_delete(&self, name: &str) -> Result<(), ArenaError> {
        let arena = self
            .arena(name)
            .ok_or_else(|| ArenaError::NotFound(name.to_string()))?;
        self.cancel_auto_start(name);
        self.votes.remove(name);
        arena.session().force_stop();
        self.members.retain(|_, arena_name| arena_name != name);
        self.arenas.remove(name);
        info!(arena = %name, "arena deleted");
        Ok(())
    }

    pub fn delete_arena(&self, name: &str) -> bool {
        self.try_delete(name).is_ok()
    }

    // -----------------------------------------------------------------------
    // Join / leave
    // -----------------------------------------------------------------------

    /// Puts `player` in arena `name`, leaving any other arena first. An
    /// unknown arena is created on the spot. A target that cannot be
    /// joined is refused before the current arena is left.
    pub fn try_join(&self, player: PlayerId, name: &str) -> Result<(), ArenaError> {
        if !self.ctx.world.is_online(player) {
            return Err(ArenaError::PlayerOffline(player));
        }
        validate_name(name)?;

        if let Some(current) = self.arena_of_player(player) {
            if current == name {
                let status = self.arena(name).map(|a| a.status());
                if status == Some(ArenaStatus::Waiting) {
                    debug!(arena = %name, %player, "idle rejoin");
                    self.evaluate_auto_start(name);
                    return Ok(());
                }
                return Err(ArenaError::AlreadyInArena(player, current));
            }
            // A refused target must not cost the player their current seat.
            if let Some(target) = self.arena(name) {
                let status = target.status();
                if !status.is_joinable() {
                    return Err(ArenaError::InvalidState {
                        name: name.to_string(),
                        status,
                    });
                }
            }
            self.try_leave(player, &current)?;
        }
        self.release_spectator(player);

        let arena = match self.arena(name) {
            Some(arena) => arena,
            None => {
                let anchor = self
                    .ctx
                    .snapshot()
                    .default_spawn
                    .clone()
                    .or_else(|| self.ctx.world.location(player));
                match self.create_at(name, anchor) {
                    Ok(arena) => arena,
                    Err(ArenaError::AlreadyExists(_)) => self
                        .arena(name)
                        .ok_or_else(|| ArenaError::NotFound(name.to_string()))?,
                    Err(err) => return Err(err),
                }
            }
        };

        arena.session().join(player)?;
        self.members.insert(player, name.to_string());
        info!(arena = %name, %player, players = arena.session().participant_count(), "player joined arena");
        self.evaluate_auto_start(name);
        Ok(())
    }

    pub fn join_arena(&self, player: PlayerId, name: &str) -> bool {
        self.try_join(player, name).is_ok()
    }

    /// Takes `player` out of arena `name`. Fails without side effects if
    /// they are not in it.
    pub fn try_leave(&self, player: PlayerId, name: &str) -> Result<(), ArenaError> {
        let in_arena = self
            .members
            .get(&player)
            .is_some_and(|current| current.as_str() == name);
        if !in_arena {
            return Err(ArenaError::NotInArena(player, name.to_string()));
        }
        self.members.remove(&player);
        if let Some(mut vote) = self.votes.get_mut(name) {
            vote.retain(|voter| voter != player);
        }
        if let Some(arena) = self.arena(name) {
            arena.session().leave(player);
        }
        info!(arena = %name, %player, "player left arena");
        self.evaluate_auto_start(name);
        Ok(())
    }

    pub fn leave_arena(&self, player: PlayerId, name: &str) -> bool {
        self.try_leave(player, name).is_ok()
    }

    /// Leaves whatever arena `player` is in.
    pub fn leave_current(&self, player: PlayerId) -> bool {
        match self.arena_of_player(player) {
            Some(name) => self.leave_arena(player, &name),
            None => false,
        }
    }

    /// Spectators belong to no arena; joining one releases them.
    fn release_spectator(&self, player: PlayerId) {
        for arena in self.all_arenas() {
            if arena.session().is_spectator(player) {
                arena.session().leave(player);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Auto-start
    // -----------------------------------------------------------------------

    /// Schedules, restarts, or cancels the auto-start timer for `name`
    /// depending on how many players are waiting.
    fn evaluate_auto_start(&self, name: &str) {
        let Some(arena) = self.arena(name) else {
            self.cancel_auto_start(name);
            return;
        };
        if arena.status() != ArenaStatus::Waiting {
            return;
        }
        let settings = self.ctx.snapshot().settings_for(arena.core().map().as_deref());
        let present = arena.session().participant_count();
        if present >= settings.min_players {
            self.open_vote(name);
            self.schedule_auto_start(name, Ticks::from_secs(u64::from(settings.auto_start_delay_secs)));
        } else {
            self.votes.remove(name);
            if self.cancel_auto_start(name) {
                debug!(arena = %name, present, required = settings.min_players, "auto-start cancelled");
            }
        }
    }

    /// Starts the auto-start delay over, replacing any pending timer.
    fn schedule_auto_start(&self, name: &str, delay: Ticks) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let weak = self.me.clone();
        let arena = name.to_string();
        let handle = self.ctx.scheduler.run_later(delay, move || {
            if let Some(registry) = weak.upgrade() {
                registry.fire_auto_start(&arena, generation);
            }
        });
        let previous = self
            .auto_start
            .insert(name.to_string(), PendingStart { generation, handle });
        if let Some(previous) = previous {
            previous.handle.cancel();
            debug!(arena = %name, %delay, "auto-start restarted");
        } else {
            info!(arena = %name, %delay, "auto-start scheduled");
        }
        // A short delay can fire on another worker before the insert.
        self.auto_start
            .remove_if(name, |_, pending| pending.generation == generation && pending.handle.is_finished());
    }

    fn cancel_auto_start(&self, name: &str) -> bool {
        match self.auto_start.remove(name) {
            Some((_, pending)) => {
                pending.handle.cancel();
                true
            }
            None => false,
        }
    }

    /// `true` while an auto-start timer is pending for `name`.
    pub fn has_pending_auto_start(&self, name: &str) -> bool {
        self.auto_start
            .get(name)
            .is_some_and(|pending| pending.handle.is_active())
    }

    fn fire_auto_start(&self, name: &str, generation: u64) {
        let superseded = self
            .auto_start
            .get(name)
            .is_some_and(|pending| pending.generation > generation);
        if superseded {
            return;
        }
        let removed = self
            .auto_start
            .remove_if(name, |_, pending| pending.generation <= generation);
        if let Some((_, older)) = removed {
            if older.generation != generation {
                older.handle.cancel();
            }
        }

        // The roster may have changed during the delay.
        let Some(arena) = self.arena(name) else {
            return;
        };
        let settings = self.ctx.snapshot().settings_for(arena.core().map().as_deref());
        let present = arena.session().participant_count();
        if arena.status() != ArenaStatus::Waiting || present < settings.min_players {
            debug!(arena = %name, present, status = %arena.status(), "auto-start no longer valid");
            return;
        }
        match self.start_countdown(name) {
            Ok(()) => info!(arena = %name, present, "auto-start fired"),
            Err(err) => warn!(arena = %name, error = %err, "auto-start failed"),
        }
    }

    // -----------------------------------------------------------------------
    // Map vote
    // -----------------------------------------------------------------------

    /// Opens a map vote for `name` if none is open and there is a choice
    /// to make.
    fn open_vote(&self, name: &str) {
        let maps: Vec<String> = self.ctx.snapshot().maps.keys().cloned().collect();
        if maps.len() < 2 {
            return;
        }
        let Entry::Vacant(slot) = self.votes.entry(name.to_string()) else {
            return;
        };
        let vote = slot.insert(MapVote::new(maps));
        let line = format!("Vote for the next map: {}", vote.candidates().join(", "));
        drop(vote);
        self.ctx.notify(&self.members_of(name), Notice::chat(line));
        debug!(arena = %name, "map vote opened");
    }

    /// Casts, replaces, or with `None` withdraws `player`'s ballot in
    /// arena `name`. Returns the tally afterwards.
    pub fn vote(
        &self,
        player: PlayerId,
        name: &str,
        map: Option<&str>,
    ) -> Result<BTreeMap<String, usize>, ArenaError> {
        if self.arena_of_player(player).as_deref() != Some(name) {
            return Err(ArenaError::NotInArena(player, name.to_string()));
        }
        let mut vote = self
            .votes
            .get_mut(name)
            .ok_or_else(|| ArenaError::NoVote(name.to_string()))?;
        vote.cast(player, map)?;
        let tally = vote.tally();
        drop(vote);
        debug!(arena = %name, %player, map = ?map, "map vote cast");
        Ok(tally)
    }

    /// The current tally of `name`'s open vote.
    pub fn vote_tally(&self, name: &str) -> Option<BTreeMap<String, usize>> {
        self.votes.get(name).map(|vote| vote.tally())
    }

    /// Closes `name`'s vote and returns the elected map, counting only
    /// ballots of players still in the arena.
    fn close_vote(&self, name: &str) -> Option<String> {
        let (_, mut vote) = self.votes.remove(name)?;
        let members = self.members_of(name);
        vote.retain(|voter| members.contains(&voter));
        let elected = vote.winner(&mut rand::rng());
        info!(arena = %name, ballots = vote.ballots(), elected = ?elected, "map vote closed");
        if let Some(map) = &elected {
            self.ctx
                .notify(&members, Notice::chat(format!("{map} won the map vote!")));
        }
        elected
    }

    // -----------------------------------------------------------------------
    // Round control
    // -----------------------------------------------------------------------

    /// Starts the countdown in arena `name`: applies the map vote, or
    /// picks a map if none is selected, prepares an isolated instance if
    /// the map has a template, then gathers every member.
    pub fn start_countdown(&self, name: &str) -> Result<(), ArenaError> {
        let arena = self
            .arena(name)
            .ok_or_else(|| ArenaError::NotFound(name.to_string()))?;
        let status = arena.status();
        if status != ArenaStatus::Waiting {
            return Err(ArenaError::InvalidState {
                name: name.to_string(),
                status,
            });
        }
        self.cancel_auto_start(name);

        let snapshot = self.ctx.snapshot();
        let elected = self
            .close_vote(name)
            .filter(|map| snapshot.maps.contains_key(map));
        if let Some(map) = elected {
            self.select_map(name, Some(&map))?;
        } else if arena.core().map().is_none() && !snapshot.maps.is_empty() {
            self.select_map(name, None)?;
        }
        if let Some(map) = arena.core().map().and_then(|id| snapshot.map(&id).cloned()) {
            if let Some(template) = &map.template {
                self.prepare_instance(&arena, template, &map.spawn);
            }
        }

        let players = self.members_of(name);
        arena.session().start_with_countdown(&players)
    }

    /// Clones the map template for this arena and rebases the anchor into
    /// the clone. Falls back to the shared template world on failure.
    fn prepare_instance(&self, arena: &Arena, template: &str, spawn: &Location) {
        let key = instance_key(template, arena.name());
        match self.ctx.environment.create_instance(template, &key) {
            Ok(handle) => {
                info!(arena = %arena.name(), %key, world = %handle.world, "isolated instance created");
                arena
                    .core()
                    .set_round_anchor(Some(spawn.in_world(handle.world.clone())));
                arena.core().set_instance(template, handle);
            }
            Err(err) => {
                warn!(arena = %arena.name(), %key, error = %err, "instance unavailable, using shared world");
                arena.core().set_round_anchor(None);
            }
        }
    }

    /// Cancels a running countdown.
    pub fn cancel(&self, name: &str) -> Result<(), ArenaError> {
        let arena = self
            .arena(name)
            .ok_or_else(|| ArenaError::NotFound(name.to_string()))?;
        self.cancel_auto_start(name);
        if arena.session().cancel() {
            Ok(())
        } else {
            Err(ArenaError::InvalidState {
                name: name.to_string(),
                status: arena.status(),
            })
        }
    }

    /// Stops whatever arena `name` is doing and empties it.
    pub fn force_stop(&self, name: &str) -> Result<(), ArenaError> {
        let arena = self
            .arena(name)
            .ok_or_else(|| ArenaError::NotFound(name.to_string()))?;
        self.cancel_auto_start(name);
        self.votes.remove(name);
        arena.session().force_stop();
        self.members.retain(|_, arena_name| arena_name != name);
        info!(arena = %name, "arena force-stopped");
        Ok(())
    }

    /// Selects map `map`, or a random configured map when `None`.
    /// Returns the selected map id.
    pub fn select_map(&self, name: &str, map: Option<&str>) -> Result<String, ArenaError> {
        let arena = self
            .arena(name)
            .ok_or_else(|| ArenaError::NotFound(name.to_string()))?;
        let snapshot = self.ctx.snapshot();
        let id = match map {
            Some(id) if snapshot.maps.contains_key(id) => id.to_string(),
            Some(id) => return Err(ArenaError::UnknownMap(id.to_string())),
            None => snapshot
                .maps
                .keys()
                .choose(&mut rand::rng())
                .cloned()
                .ok_or(ArenaError::NoMaps)?,
        };
        if let Some(def) = snapshot.map(&id) {
            arena.core().set_anchor(def.spawn.clone());
        }
        arena.core().set_map(Some(id.clone()));
        info!(arena = %name, map = %id, "map selected");
        Ok(id)
    }

    // -----------------------------------------------------------------------
    // Host events
    // -----------------------------------------------------------------------

    /// A player died. Credits `killer` if they share the victim's arena.
    pub fn on_death(&self, victim: PlayerId, killer: Option<PlayerId>) -> bool {
        let Some(name) = self.arena_of_player(victim) else {
            return false;
        };
        let killer = killer.filter(|k| self.arena_of_player(*k).as_deref() == Some(name.as_str()));
        self.arena(&name)
            .is_some_and(|arena| arena.session().on_death(victim, killer))
    }

    /// A player went offline.
    pub fn on_disconnect(&self, player: PlayerId) {
        match self.members.remove(&player) {
            Some((_, name)) => {
                if let Some(arena) = self.arena(&name) {
                    arena.session().on_disconnect(player);
                }
                self.evaluate_auto_start(&name);
            }
            None => {
                for arena in self.all_arenas() {
                    arena.session().on_disconnect(player);
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    pub fn status(&self, name: &str) -> Option<ArenaReport> {
        self.arena(name).map(|arena| arena.report())
    }

    /// Reports for every arena, by name.
    pub fn reports(&self) -> Vec<ArenaReport> {
        let mut reports: Vec<ArenaReport> = self.all_arenas().iter().map(|a| a.report()).collect();
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        reports
    }

    /// Repairs every arena whose recorded status disagrees with its
    /// session. Returns how many were repaired.
    pub fn sync_statuses(&self) -> usize {
        self.all_arenas()
            .iter()
            .filter(|arena| arena.sync_status().is_some())
            .count()
    }

    fn all_arenas(&self) -> Vec<Arc<Arena>> {
        self.arenas.iter().map(|a| Arc::clone(a.value())).collect()
    }
}

impl RoomDirectory for ArenaRegistry {
    fn members_of(&self, arena: &str) -> Vec<PlayerId> {
        self.members
            .iter()
            .filter(|entry| entry.value() == arena)
            .map(|entry| *entry.key())
            .collect()
    }

    fn arena_of(&self, player: PlayerId) -> Option<String> {
        self.arena_of_player(player)
    }
}

/// Arena names are 1-32 characters of ASCII letters, digits, `_` or `-`.
pub fn validate_name(name: &str) -> Result<(), ArenaError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ArenaError::InvalidName(name.to_string()))
    }
}
