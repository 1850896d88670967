//! The live state of one arena's rounds.
//!
//! A [`MatchSession`] owns the roster (participants, the alive subset,
//! spectators), the per-player snapshots taken on entry, the zone, and
//! every task a round spawns. It drives the arena through
//! `WAITING → PREPARING → RUNNING → ENDING → WAITING`.
//!
//! Roster collections are concurrent sets mutated from commands, timers
//! and disconnect events alike. Compound decisions (enough players? still
//! running?) are re-checked where they take effect rather than locked
//! across the whole session.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::{DashMap, DashSet};
use parking_lot::{Mutex, RwLock};
use ringfall_model::{
    Cue, EffectKind, GameMode, Inventory, Location, Notice, PlayerId, StatusEffect, VerticalBounds,
};
use ringfall_tick::{TaskFlow, TaskHandle, TaskSet, Ticks};
use tracing::{debug, error, info, warn};

use crate::airdrop::{self, Airdrop};
use crate::arena::ArenaCore;
use crate::layout::{platform_at, spawn_ring};
use crate::resolution::{self, Elimination, EliminationCause, RoundOutcome};
use crate::rewards::{Grant, StreakBook};
use crate::zone::{ActiveZone, ShrinkStep, ZoneShrink};
use crate::{
    ArenaContext, ArenaError, ArenaStatus, ItemEconomy, ItemTable, MatchSettings, RoomDirectory,
    SafeTeleportResolver, ZoneBounds, events, items, zone,
};

/// Milestones announced by the alive-count display.
const ALIVE_MILESTONES: [usize; 3] = [5, 3, 2];

/// What a player looked like before entering the arena.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub origin: Location,
    pub inventory: Inventory,
    pub mode: GameMode,
}

/// One arena's match state machine.
pub struct MatchSession {
    core: Arc<ArenaCore>,
    ctx: ArenaContext,
    directory: Weak<dyn RoomDirectory>,

    running: AtomicBool,
    preparing: AtomicBool,

    participants: DashSet<PlayerId>,
    alive: DashSet<PlayerId>,
    spectators: DashSet<PlayerId>,
    /// Everyone who was deployed this round, for loss accounting.
    entrants: DashSet<PlayerId>,
    snapshots: DashMap<PlayerId, Snapshot>,

    zone: Mutex<Option<ActiveZone>>,
    settings: RwLock<Option<Arc<MatchSettings>>>,
    economy: RwLock<Option<Arc<ItemEconomy>>>,
    milestones: Mutex<BTreeSet<usize>>,
    streaks: StreakBook,
    /// Supply drops that landed this round.
    airdrops: Mutex<Vec<Airdrop>>,

    /// Countdown, controllers, and the end-of-round timer.
    tasks: TaskSet,
    /// Sub-tasks spawned by hazard events.
    hazards: TaskSet,
}

impl MatchSession {
    pub(crate) fn new(
        core: Arc<ArenaCore>,
        ctx: ArenaContext,
        directory: Weak<dyn RoomDirectory>,
    ) -> Arc<Self> {
        Arc::new(Self {
            core,
            ctx,
            directory,
            running: AtomicBool::new(false),
            preparing: AtomicBool::new(false),
            participants: DashSet::new(),
            alive: DashSet::new(),
            spectators: DashSet::new(),
            entrants: DashSet::new(),
            snapshots: DashMap::new(),
            zone: Mutex::new(None),
            settings: RwLock::new(None),
            economy: RwLock::new(None),
            milestones: Mutex::new(BTreeSet::new()),
            streaks: StreakBook::new(),
            airdrops: Mutex::new(Vec::new()),
            tasks: TaskSet::new(),
            hazards: TaskSet::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        self.core.name()
    }

    pub fn status(&self) -> ArenaStatus {
        self.core.status()
    }

    pub(crate) fn ctx(&self) -> &ArenaContext {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_preparing(&self) -> bool {
        self.preparing.load(Ordering::Acquire)
    }

    pub fn participants(&self) -> Vec<PlayerId> {
        self.participants.iter().map(|p| *p).collect()
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_participant(&self, player: PlayerId) -> bool {
        self.participants.contains(&player)
    }

    pub fn alive_players(&self) -> Vec<PlayerId> {
        self.alive.iter().map(|p| *p).collect()
    }

    /// Alive players, sorted.
    pub fn survivors(&self) -> Vec<PlayerId> {
        let mut alive = self.alive_players();
        alive.sort();
        alive
    }

    pub fn spectators(&self) -> Vec<PlayerId> {
        self.spectators.iter().map(|p| *p).collect()
    }

    pub fn is_spectator(&self, player: PlayerId) -> bool {
        self.spectators.contains(&player)
    }

    pub fn entrants(&self) -> Vec<PlayerId> {
        self.entrants.iter().map(|p| *p).collect()
    }

    pub fn has_snapshot(&self, player: PlayerId) -> bool {
        self.snapshots.contains_key(&player)
    }

    /// Participants and spectators.
    pub fn audience(&self) -> Vec<PlayerId> {
        let mut all: Vec<PlayerId> = self.participants();
        all.extend(self.spectators.iter().map(|p| *p));
        all
    }

    pub fn zone_diameter(&self) -> Option<f64> {
        self.zone.lock().as_ref().map(|z| z.shrink.diameter())
    }

    pub fn zone_bounds(&self) -> Option<ZoneBounds> {
        self.zone.lock().as_ref().map(ActiveZone::bounds)
    }

    /// Supply drops currently standing in the arena.
    pub fn airdrops(&self) -> Vec<Airdrop> {
        self.airdrops.lock().clone()
    }

    pub(crate) fn zone_center(&self) -> Option<(Location, f64)> {
        self.zone
            .lock()
            .as_ref()
            .map(|z| (z.center.clone(), z.shrink.diameter()))
    }

    /// Keeps `landed` for cleanup. Refused once the round has stopped.
    pub(crate) fn record_airdrop(&self, landed: Airdrop) -> bool {
        let mut drops = self.airdrops.lock();
        if !self.is_running() {
            return false;
        }
        drops.push(landed);
        true
    }

    /// Active countdown and round tasks.
    pub fn active_tasks(&self) -> usize {
        self.tasks.active() + self.hazards.active()
    }

    pub(crate) fn round_settings(&self) -> Option<Arc<MatchSettings>> {
        self.settings.read().clone()
    }

    pub(crate) fn economy(&self) -> Option<Arc<ItemEconomy>> {
        self.economy.read().clone()
    }

    pub(crate) fn streaks(&self) -> &StreakBook {
        &self.streaks
    }

    pub(crate) fn in_final_phase(&self) -> bool {
        self.zone
            .lock()
            .as_ref()
            .is_some_and(|z| z.shrink.is_final_phase())
    }

    /// Advances the zone one step. `None` when no round is running.
    pub(crate) fn shrink_zone(&self) -> Option<(ShrinkStep, Location)> {
        let mut zone = self.zone.lock();
        let zone = zone.as_mut()?;
        Some((zone.shrink.step(), zone.center.clone()))
    }

    pub(crate) fn remove_alive(&self, player: PlayerId) -> bool {
        self.alive.remove(&player).is_some()
    }

    pub(crate) fn track_task(&self, handle: TaskHandle) {
        self.tasks.track(handle);
    }

    /// Tracks a task that must not outlive the running round.
    pub(crate) fn track_round_task(&self, handle: TaskHandle) {
        self.tasks.track(handle.clone());
        if !self.is_running() {
            handle.cancel();
        }
    }

    pub(crate) fn track_hazard_task(&self, handle: TaskHandle) {
        self.hazards.track(handle.clone());
        if !self.is_running() {
            handle.cancel();
        }
    }

    // -----------------------------------------------------------------------
    // Joining and leaving
    // -----------------------------------------------------------------------

    /// Adds a player to the roster and sends them to the gather point.
    pub fn join(&self, player: PlayerId) -> Result<(), ArenaError> {
        let status = self.status();
        if !status.is_joinable() {
            return Err(ArenaError::InvalidState {
                name: self.name().to_string(),
                status,
            });
        }
        if !self.capture(player) {
            return Err(ArenaError::PlayerOffline(player));
        }
        self.participants.insert(player);
        if let Some(gather) = self.core.gather_point() {
            self.send_to(player, gather);
        }
        let line = format!("{player} joined the arena ({} players).", self.participant_count());
        self.ctx.notify(&self.audience(), Notice::chat(line));
        Ok(())
    }

    /// Removes a player, restoring their snapshot. Returns `false` if the
    /// player was neither a participant nor a spectator.
    pub fn leave(self: &Arc<Self>, player: PlayerId) -> bool {
        if !self.participants.contains(&player) && !self.spectators.contains(&player) {
            return false;
        }
        if self.is_running() {
            resolution::eliminate(self, Elimination::without_credit(player, EliminationCause::Left));
        }
        self.alive.remove(&player);
        self.participants.remove(&player);
        self.spectators.remove(&player);
        self.streaks.forget(player);

        let lobby = self.ctx.snapshot().lobby.target().cloned();
        self.restore(player, self.zone_bounds().as_ref(), lobby.as_ref());
        debug!(arena = %self.name(), %player, "player left session");
        true
    }

    /// A participant died. Credits `killer` if they are in this arena.
    pub fn on_death(self: &Arc<Self>, victim: PlayerId, killer: Option<PlayerId>) -> bool {
        if !self.is_running() {
            return false;
        }
        if !resolution::eliminate(self, Elimination::death(victim, killer)) {
            return false;
        }
        if let Some(job) = self
            .ctx
            .at_player(victim, move |w| w.set_game_mode(victim, GameMode::Spectator))
        {
            job.detach();
        }
        true
    }

    /// A player went offline. Their snapshot is discarded; there is
    /// nobody to restore it to.
    pub fn on_disconnect(self: &Arc<Self>, player: PlayerId) -> bool {
        if !self.participants.contains(&player) && !self.spectators.contains(&player) {
            return false;
        }
        if self.is_running() {
            resolution::eliminate(
                self,
                Elimination::without_credit(player, EliminationCause::Disconnect),
            );
        }
        self.alive.remove(&player);
        self.participants.remove(&player);
        self.spectators.remove(&player);
        self.snapshots.remove(&player);
        self.streaks.forget(player);
        info!(arena = %self.name(), %player, "player disconnected");
        true
    }

    // -----------------------------------------------------------------------
    // Countdown
    // -----------------------------------------------------------------------

    /// Gathers `players` and runs the countdown to a round.
    ///
    /// Refused while a countdown or round is already in progress.
    pub fn start_with_countdown(self: &Arc<Self>, players: &[PlayerId]) -> Result<(), ArenaError> {
        if self.is_running() {
            return Err(self.refused());
        }
        if self
            .preparing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(self.refused());
        }
        if !self.core.transition(ArenaStatus::Preparing) {
            self.preparing.store(false, Ordering::Release);
            return Err(self.refused());
        }

        let settings = Arc::new(self.ctx.snapshot().settings_for(self.core.map().as_deref()));
        *self.settings.write() = Some(Arc::clone(&settings));

        let Some(gather) = self.core.gather_point() else {
            error!(arena = %self.name(), "cannot start countdown without a spawn point");
            self.return_to_waiting();
            return Err(ArenaError::MissingAnchor(self.name().to_string()));
        };

        for &player in players {
            if self.capture(player) {
                self.participants.insert(player);
            }
        }
        for player in self.participants() {
            self.send_to(player, gather.clone());
        }

        info!(
            arena = %self.name(),
            players = self.participant_count(),
            secs = settings.countdown_secs,
            "countdown started"
        );

        let weak = Arc::downgrade(self);
        let mut remaining = settings.countdown_secs;
        let handle = self
            .ctx
            .scheduler
            .run_timer(Ticks::ZERO, Ticks::from_secs(1), move || {
                let Some(session) = weak.upgrade() else {
                    return TaskFlow::Stop;
                };
                if !session.is_preparing() {
                    return TaskFlow::Stop;
                }
                if remaining == 0 {
                    session.countdown_expired();
                    return TaskFlow::Stop;
                }
                session.show_countdown(remaining);
                remaining -= 1;
                TaskFlow::Continue
            });
        self.track_task(handle);
        Ok(())
    }

    fn refused(&self) -> ArenaError {
        ArenaError::InvalidState {
            name: self.name().to_string(),
            status: self.status(),
        }
    }

    /// Stops a running countdown, returning everyone to where they came
    /// from. The roster is kept.
    pub fn cancel(&self) -> bool {
        if self
            .preparing
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.return_to_waiting();
        info!(arena = %self.name(), "countdown cancelled");
        true
    }

    fn show_countdown(&self, remaining: u32) {
        let players = self.participants();
        if remaining > 10 {
            self.ctx.notify(
                &players,
                Notice::chat(format!("The round starts in {remaining} seconds.")),
            );
            return;
        }
        let cue = if remaining <= 3 {
            Cue::CountdownUrgent
        } else {
            Cue::CountdownTick
        };
        self.ctx
            .notify(&players, Notice::title(remaining.to_string(), "Get ready"));
        self.ctx.notify(&players, Notice::cue(cue));
    }

    fn countdown_expired(self: &Arc<Self>) {
        let required = self
            .round_settings()
            .map(|s| s.min_players)
            .unwrap_or(1);
        let present = self.participant_count();
        if present < required {
            info!(arena = %self.name(), present, required, "not enough players at countdown end");
            self.ctx.notify(
                &self.participants(),
                Notice::chat(format!("Not enough players ({present}/{required}). Start cancelled.")),
            );
            self.cancel();
            return;
        }
        if let Err(err) = self.start_round() {
            warn!(arena = %self.name(), error = %err, "round did not start");
        }
    }

    /// Undoes a countdown: cancels its tasks, restores snapshots, and
    /// moves back to `WAITING`.
    fn return_to_waiting(&self) {
        self.preparing.store(false, Ordering::Release);
        self.tasks.cancel_all();
        let lobby = self.ctx.snapshot().lobby.target().cloned();
        let grace = self.cleanup_grace();
        for player in self.participants() {
            self.restore(player, None, lobby.as_ref());
        }
        *self.settings.write() = None;
        if self.status() == ArenaStatus::Preparing {
            self.core.transition(ArenaStatus::Waiting);
        }
        self.schedule_release(grace);
    }

    // -----------------------------------------------------------------------
    // Round
    // -----------------------------------------------------------------------

    /// Deploys the roster and starts the zone, item and hazard controllers.
    pub fn start_round(self: &Arc<Self>) -> Result<(), ArenaError> {
        let name = self.name().to_string();
        let status = self.status();
        if self.is_running() || !matches!(status, ArenaStatus::Waiting | ArenaStatus::Preparing) {
            return Err(ArenaError::InvalidState { name, status });
        }

        let settings = Arc::new(self.ctx.snapshot().settings_for(self.core.map().as_deref()));
        let Some(anchor) = self.core.gather_point() else {
            error!(arena = %name, "cannot start round without a spawn point");
            self.return_to_waiting();
            return Err(ArenaError::MissingAnchor(name));
        };

        self.reconcile_roster();
        let present = self.participant_count();
        if present < settings.min_players {
            info!(arena = %name, present, required = settings.min_players, "not enough players to start");
            self.return_to_waiting();
            return Err(ArenaError::NotEnoughPlayers {
                name,
                required: settings.min_players,
                present,
            });
        }

        if status == ArenaStatus::Waiting {
            self.core.transition(ArenaStatus::Preparing);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ArenaError::InvalidState {
                name,
                status: self.status(),
            });
        }
        self.preparing.store(false, Ordering::Release);
        self.tasks.cancel_all();
        self.core.transition(ArenaStatus::Running);

        let economy = Arc::new(ItemEconomy::new(ItemTable::from_raw(&settings.items)));
        *self.settings.write() = Some(Arc::clone(&settings));
        *self.economy.write() = Some(Arc::clone(&economy));

        let mut roster = self.participants();
        roster.sort();
        self.entrants.clear();
        self.alive.clear();
        for &player in &roster {
            self.entrants.insert(player);
            self.alive.insert(player);
        }
        self.milestones.lock().clear();

        let shrink = ZoneShrink::from_settings(&settings);
        let diameter = shrink.diameter();
        *self.zone.lock() = Some(ActiveZone {
            center: anchor.clone(),
            shrink,
        });
        let (world, center, damage) = (anchor.world.clone(), anchor.clone(), settings.border_damage);
        self.ctx
            .at(&anchor, move |w| {
                w.set_border(&world, &center, diameter, Duration::ZERO);
                w.set_border_damage(&world, damage);
            })
            .detach();

        if settings.capture_spectators {
            self.capture_spectators(&anchor, diameter);
        }

        let bounds = self.ctx.world.vertical_bounds(&anchor.world);
        let points = spawn_ring(&anchor, settings.radius, roster.len());
        for (&player, point) in roster.iter().zip(&points) {
            self.deploy(player, point, &settings, bounds);
        }

        self.ctx
            .notify(&roster, Notice::title("The round has begun!", "Last one standing wins"));
        self.ctx.notify(&roster, Notice::cue(Cue::RoundStart));

        self.track_round_task(zone::start(self, &settings));
        self.track_round_task(items::start(self, economy, settings.item_interval));
        if settings.airdrops {
            self.track_round_task(airdrop::start(self, &settings));
        }
        events::schedule_next(self);
        self.start_alive_display(roster.len());

        info!(arena = %name, players = roster.len(), diameter, "round started");
        Ok(())
    }

    /// Builds `player`'s platform, then moves them onto it, then buffs
    /// them once they have arrived. None of it is awaited.
    fn deploy(
        self: &Arc<Self>,
        player: PlayerId,
        point: &Location,
        settings: &MatchSettings,
        bounds: Option<VerticalBounds>,
    ) {
        let platform = platform_at(point, settings.pillar_height, bounds);
        let stand = platform.stand.clone();
        let landing = StatusEffect::new(EffectKind::SlowFalling, settings.landing_buff.0);

        // One job per region the platform touches.
        let home = self.ctx.regions.key_of(&stand);
        let mut home_blocks = Vec::new();
        let mut elsewhere: Vec<(Location, Vec<_>)> = Vec::new();
        for (pos, block) in platform.blocks {
            let at = pos.top_center();
            if self.ctx.regions.key_of(&at) == home {
                home_blocks.push((pos, block));
            } else if let Some((_, group)) = elsewhere
                .iter_mut()
                .find(|(loc, _)| self.ctx.regions.key_of(loc) == self.ctx.regions.key_of(&at))
            {
                group.push((pos, block));
            } else {
                elsewhere.push((at, vec![(pos, block)]));
            }
        }
        for (at, blocks) in elsewhere {
            self.ctx
                .at(&at, move |w| {
                    for (pos, block) in &blocks {
                        w.set_block(pos, *block);
                    }
                })
                .detach();
        }

        let weak = Arc::downgrade(self);
        self.ctx
            .at(&stand, move |w| {
                for (pos, block) in &home_blocks {
                    w.set_block(pos, *block);
                }
            })
            .then(move |()| {
                let Some(session) = weak.upgrade() else {
                    return;
                };
                if !session.is_running() {
                    return;
                }
                let dest = stand.clone();
                let moved = session.ctx.at_player(player, move |w| {
                    w.set_inventory(player, Inventory::default());
                    w.set_game_mode(player, GameMode::Survival);
                    if let Some(health) = w.health(player) {
                        w.set_health(player, health.max);
                    }
                    w.teleport(player, &dest)
                });
                let Some(moved) = moved else {
                    debug!(arena = %session.name(), %player, "player offline, not deployed");
                    return;
                };
                moved.then(move |arrived| {
                    if !arrived {
                        warn!(arena = %session.name(), %player, "deploy teleport failed");
                        return;
                    }
                    session
                        .ctx
                        .at(&stand, move |w| w.apply_effect(player, landing))
                        .detach();
                    session.apply_grants(player, session.streaks.compensation(player));
                    session.ctx.notify(&[player], Notice::action_bar("Good luck!"));
                });
            });
    }

    /// Hands `grants` to `player`. Item draws use the round's table.
    pub(crate) fn apply_grants(&self, player: PlayerId, grants: Vec<Grant>) {
        if grants.is_empty() {
            return;
        }
        let economy = self.economy();
        let mut applied = Vec::with_capacity(grants.len());
        {
            let mut rng = rand::rng();
            for grant in grants {
                match grant {
                    Grant::Draws(n) => {
                        if let Some(economy) = &economy {
                            applied.extend((0..n).filter_map(|_| economy.draw(&mut rng)).map(Grant::Item));
                        }
                    }
                    Grant::Announce(text) => self.ctx.notify(&self.audience(), Notice::chat(text)),
                    other => applied.push(other),
                }
            }
        }
        if applied.is_empty() {
            return;
        }
        if let Some(job) = self.ctx.at_player(player, move |w| {
            for grant in applied {
                match grant {
                    Grant::Heal(amount) => {
                        if let Some(health) = w.health(player) {
                            w.set_health(player, health.healed(amount));
                        }
                    }
                    Grant::Item(stack) => w.give_item(player, stack),
                    Grant::Effect(effect) => w.apply_effect(player, effect),
                    Grant::Draws(_) | Grant::Announce(_) => {}
                }
            }
        }) {
            job.detach();
        }
    }

    fn capture_spectators(&self, anchor: &Location, diameter: f64) {
        let directory = self.directory.upgrade();
        for player in self.ctx.world.online_players() {
            if self.participants.contains(&player) || self.spectators.contains(&player) {
                continue;
            }
            if directory.as_ref().is_some_and(|d| d.arena_of(player).is_some()) {
                continue;
            }
            let Some(at) = self.ctx.world.location(player) else {
                continue;
            };
            if at.world != anchor.world || at.horizontal_distance(anchor) > diameter / 2.0 {
                continue;
            }
            if !self.capture(player) {
                continue;
            }
            self.spectators.insert(player);
            if let Some(job) = self.ctx.at_player(player, move |w| {
                w.set_game_mode(player, GameMode::Spectator);
                w.set_inventory(player, Inventory::default());
            }) {
                job.detach();
            }
            self.ctx.notify(
                &[player],
                Notice::chat(format!("You are now spectating arena {}.", self.name())),
            );
            debug!(arena = %self.name(), %player, "bystander captured as spectator");
        }
    }

    /// Aligns the roster with the room directory: members missing from
    /// the roster are added, participants no longer in the room are
    /// returned, and offline participants are dropped.
    fn reconcile_roster(&self) {
        let Some(directory) = self.directory.upgrade() else {
            return;
        };
        let members: HashSet<PlayerId> = directory.members_of(self.name()).into_iter().collect();

        for &player in &members {
            if !self.participants.contains(&player) && self.capture(player) {
                self.participants.insert(player);
                info!(arena = %self.name(), %player, "re-added member missing from roster");
            }
        }
        for player in self.participants() {
            if !members.contains(&player) {
                self.participants.remove(&player);
                self.restore(player, None, None);
                warn!(arena = %self.name(), %player, "dropped participant no longer in arena");
            } else if !self.ctx.world.is_online(player) {
                self.participants.remove(&player);
                self.snapshots.remove(&player);
                debug!(arena = %self.name(), %player, "dropped offline participant");
            }
        }
    }

    fn start_alive_display(self: &Arc<Self>, total: usize) {
        let weak = Arc::downgrade(self);
        let handle = self
            .ctx
            .scheduler
            .run_timer(Ticks::ZERO, Ticks::from_secs(1), move || {
                let Some(session) = weak.upgrade() else {
                    return TaskFlow::Stop;
                };
                if !session.is_running() {
                    return TaskFlow::Stop;
                }
                let alive = session.alive.len();
                let audience = session.audience();
                session
                    .ctx
                    .notify(&audience, Notice::action_bar(format!("Alive: {alive}/{total}")));
                if alive < total
                    && ALIVE_MILESTONES.contains(&alive)
                    && session.milestones.lock().insert(alive)
                {
                    session
                        .ctx
                        .notify(&audience, Notice::chat(format!("Only {alive} players remain!")));
                }
                TaskFlow::Continue
            });
        self.track_round_task(handle);
    }

    /// Moves a running round to `ENDING`. Only the caller that wins the
    /// race gets the outcome.
    pub(crate) fn begin_ending(&self) -> Option<RoundOutcome> {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        self.tasks.cancel_all();
        self.hazards.cancel_all();
        self.core.transition(ArenaStatus::Ending);
        Some(resolution::outcome_for(&self.survivors()))
    }

    // -----------------------------------------------------------------------
    // Stopping
    // -----------------------------------------------------------------------

    /// Ends the round and returns everyone. The roster is kept.
    pub fn stop(&self) {
        self.shutdown(false);
    }

    /// Ends the round, returns everyone, and clears the roster.
    pub fn force_stop(&self) {
        self.shutdown(true);
    }

    fn shutdown(&self, clear_roster: bool) {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        self.preparing.store(false, Ordering::Release);
        let cancelled = self.tasks.cancel_all() + self.hazards.cancel_all();
        let grace = self.cleanup_grace();

        let zone = self.zone.lock().take();
        if let Some(zone) = &zone {
            let world = zone.center.world.clone();
            self.ctx
                .at(&zone.center, move |w| w.reset_border(&world))
                .detach();
        }
        let drops = std::mem::take(&mut *self.airdrops.lock());
        airdrop::clear(&self.ctx, drops);
        let bounds = zone.as_ref().map(ActiveZone::bounds);
        let lobby = self.ctx.snapshot().lobby.target().cloned();
        for player in self.audience() {
            self.restore(player, bounds.as_ref(), lobby.as_ref());
        }
        self.snapshots.clear();
        self.spectators.clear();
        self.alive.clear();
        self.entrants.clear();
        self.milestones.lock().clear();
        *self.settings.write() = None;
        *self.economy.write() = None;
        if clear_roster {
            self.participants.clear();
            self.streaks.clear();
        }

        match self.status() {
            ArenaStatus::Running => {
                self.core.transition(ArenaStatus::Ending);
                self.core.transition(ArenaStatus::Waiting);
            }
            ArenaStatus::Ending | ArenaStatus::Preparing => {
                self.core.transition(ArenaStatus::Waiting);
            }
            ArenaStatus::Waiting => {}
        }
        self.schedule_release(grace);
        info!(arena = %self.name(), was_running, cancelled, clear_roster, "session stopped");
    }

    fn cleanup_grace(&self) -> Ticks {
        self.round_settings()
            .map(|s| s.cleanup_grace)
            .unwrap_or_else(|| self.ctx.snapshot().settings.cleanup_grace)
    }

    /// Destroys the round's isolated instance once players have had
    /// `grace` to leave it.
    fn schedule_release(&self, grace: Ticks) {
        let Some(instance) = self.core.take_instance() else {
            return;
        };
        let core = Arc::clone(&self.core);
        let env = Arc::clone(&self.ctx.environment);
        self.ctx.scheduler.run_later(grace, move || {
            core.release_instance(env.as_ref(), instance);
        });
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Takes a snapshot unless one exists. `false` if the player is offline.
    fn capture(&self, player: PlayerId) -> bool {
        if self.snapshots.contains_key(&player) {
            return true;
        }
        let world = &self.ctx.world;
        let Some(origin) = world.location(player) else {
            return false;
        };
        let snapshot = Snapshot {
            origin,
            inventory: world.inventory(player).unwrap_or_default(),
            mode: world.game_mode(player).unwrap_or_default(),
        };
        self.snapshots.entry(player).or_insert(snapshot);
        true
    }

    /// Restores and consumes `player`'s snapshot: mode and inventory
    /// first, then a teleport to the first safe location among the
    /// lobby, the origin, and the world spawns.
    fn restore(&self, player: PlayerId, zone: Option<&ZoneBounds>, lobby: Option<&Location>) {
        let Some((_, snapshot)) = self.snapshots.remove(&player) else {
            return;
        };
        let resolver = SafeTeleportResolver::new(self.ctx.world.as_ref());
        let arena_world = self.core.gather_point().map(|a| a.world);
        let current_world = self.ctx.world.location(player).map(|l| l.world);
        let dest = lobby
            .and_then(|l| resolver.resolve(l, None))
            .or_else(|| resolver.resolve(&snapshot.origin, zone))
            .or_else(|| arena_world.as_ref().and_then(|w| resolver.world_spawn(w)))
            .or_else(|| current_world.as_ref().and_then(|w| resolver.world_spawn(w)));

        let Snapshot {
            inventory, mode, ..
        } = snapshot;
        let job = self.ctx.at_player(player, move |w| {
            w.set_game_mode(player, mode);
            w.set_inventory(player, inventory);
            match dest {
                Some(dest) => w.teleport(player, &dest),
                None => false,
            }
        });
        match job {
            Some(job) => job.then(move |moved| {
                if !moved {
                    warn!(%player, "no safe location to return player to");
                }
            }),
            None => debug!(%player, "player offline, snapshot discarded"),
        }
    }

    fn send_to(&self, player: PlayerId, to: Location) {
        if let Some(job) = self.ctx.at_player(player, move |w| w.teleport(player, &to)) {
            job.detach();
        }
    }
}
