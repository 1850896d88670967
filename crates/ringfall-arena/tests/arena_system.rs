//! Integration tests for arenas running against the in-memory world.
//!
//! Uses paused Tokio time: sleeping in a test lets every queued region job
//! and timer run before the clock moves on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use ringfall_arena::memory::{MemoryEnvironment, MemoryStats, MemoryWorld};
use ringfall_arena::{
    ArenaContext, ArenaError, ArenaRegistry, ArenaStatus, ConfigSnapshot, DelayRange, GameWorld,
    Hazard, LobbyConfig, MapDefinition, MatchSettings, SharedConfig, StatEvent,
};
use ringfall_model::{
    Block, Cue, EffectKind, EntityKind, GameMode, Location, Notice, PlayerId, VerticalBounds,
    WorldId,
};
use ringfall_region::{RegionConfig, RegionDispatcher};
use ringfall_tick::{Scheduler, SchedulerConfig, Ticks};

// =========================================================================
// Harness
// =========================================================================

const ARENA: &str = "alpha";
const BOUNDS: VerticalBounds = VerticalBounds {
    min_y: 0,
    max_y: 256,
};

struct Harness {
    world: Arc<MemoryWorld>,
    stats: Arc<MemoryStats>,
    env: Arc<MemoryEnvironment>,
    config: Arc<SharedConfig>,
    registry: Arc<ArenaRegistry>,
}

/// Short timings, no hazards and no airdrops, so rounds are quick and
/// deterministic.
fn settings() -> MatchSettings {
    MatchSettings {
        auto_start_delay_secs: 1,
        countdown_secs: 2,
        end_grace: Ticks(20),
        cleanup_grace: Ticks(20),
        capture_spectators: false,
        event_delay: DelayRange::new(10_000, 10_000),
        final_event_delay: DelayRange::new(10_000, 10_000),
        airdrops: false,
        ..Default::default()
    }
}

/// Hazards drawn only from `hazards`, one every `every` ticks.
fn hazard_settings(hazards: Vec<Hazard>, every: u64) -> MatchSettings {
    MatchSettings {
        hazards,
        event_delay: DelayRange::new(every, every),
        final_event_delay: DelayRange::new(every, every),
        ..settings()
    }
}

fn count_entities(h: &Harness, kind: EntityKind) -> usize {
    h.world.entities().iter().filter(|(_, k, _)| *k == kind).count()
}

fn count_cues(h: &Harness, cue: Cue) -> usize {
    h.world.count_notices(|n| *n == Notice::cue(cue))
}

fn snapshot(settings: MatchSettings) -> ConfigSnapshot {
    ConfigSnapshot {
        settings,
        default_spawn: Some(Location::new("arena", 0.5, 64.0, 0.5)),
        ..Default::default()
    }
}

fn harness(config: ConfigSnapshot) -> Harness {
    let world = Arc::new(MemoryWorld::new());
    world.add_world("arena", BOUNDS, Some(63));
    world.add_world("lobby", BOUNDS, Some(63));
    world.add_world("skyland", BOUNDS, Some(63));
    let stats = Arc::new(MemoryStats::new());
    let env = Arc::new(MemoryEnvironment::new(Arc::clone(&world)));
    let config = Arc::new(SharedConfig::new(config));

    let ctx = ArenaContext {
        world: world.clone(),
        stats: stats.clone(),
        environment: env.clone(),
        config: config.clone(),
        regions: RegionDispatcher::new(RegionConfig::default()),
        scheduler: Scheduler::new(SchedulerConfig::default()),
    };
    Harness {
        world,
        stats,
        env,
        config,
        registry: ArenaRegistry::new(ctx),
    }
}

/// Where player `n` stands before joining.
fn origin(n: u64) -> Location {
    Location::new("arena", 5.5 + n as f64, 64.0, 5.5)
}

fn add_players(h: &Harness, count: u64) -> Vec<PlayerId> {
    (1..=count)
        .map(|n| {
            h.world.add_player(PlayerId(n), origin(n));
            PlayerId(n)
        })
        .collect()
}

async fn advance_secs(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

/// Joins everyone to `ARENA` and waits out auto-start and the countdown.
async fn running_round(h: &Harness, players: &[PlayerId]) {
    for &p in players {
        h.registry.try_join(p, ARENA).unwrap();
    }
    advance_secs(4).await;
    assert_eq!(h.registry.arena(ARENA).unwrap().status(), ArenaStatus::Running);
}

// =========================================================================
// Membership
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_join_creates_arena_and_gathers_player() {
    let h = harness(snapshot(settings()));
    let p1 = add_players(&h, 1)[0];

    h.registry.try_join(p1, ARENA).unwrap();
    advance_ms(50).await;

    assert_eq!(h.registry.arena_names(), vec![ARENA.to_string()]);
    assert_eq!(h.registry.arena_of_player(p1).as_deref(), Some(ARENA));
    let moved = h.world.teleports_of(p1);
    assert_eq!(moved, vec![Location::new("arena", 0.5, 64.0, 0.5)]);
}

#[tokio::test(start_paused = true)]
async fn test_leave_by_non_member_is_refused() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    h.registry.try_join(players[0], ARENA).unwrap();
    h.registry.create_arena("beta", None);

    assert!(!h.registry.leave_arena(players[1], ARENA));
    assert_eq!(
        h.registry.try_leave(players[0], "beta"),
        Err(ArenaError::NotInArena(players[0], "beta".into()))
    );
    assert!(!h.registry.leave_arena(players[0], "nowhere"));

    assert_eq!(h.registry.arena_of_player(players[0]).as_deref(), Some(ARENA));
    assert!(h.registry.arena(ARENA).unwrap().session().is_participant(players[0]));
    assert!(h.registry.arena("nowhere").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_joining_another_arena_leaves_the_first() {
    let h = harness(snapshot(settings()));
    let p1 = add_players(&h, 1)[0];

    h.registry.try_join(p1, ARENA).unwrap();
    h.registry.try_join(p1, "beta").unwrap();

    assert_eq!(h.registry.arena_of_player(p1).as_deref(), Some("beta"));
    assert!(!h.registry.arena(ARENA).unwrap().session().is_participant(p1));
}

#[tokio::test(start_paused = true)]
async fn test_refused_join_keeps_current_arena() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 3);
    running_round(&h, &players[..2]).await;
    let p3 = players[2];
    h.registry.try_join(p3, "beta").unwrap();
    let moves = h.world.teleports_of(p3).len();

    assert!(matches!(
        h.registry.try_join(p3, ARENA),
        Err(ArenaError::InvalidState {
            status: ArenaStatus::Running,
            ..
        })
    ));
    advance_ms(50).await;

    assert_eq!(h.registry.arena_of_player(p3).as_deref(), Some("beta"));
    assert!(h.registry.arena("beta").unwrap().session().is_participant(p3));
    assert!(!h.registry.arena(ARENA).unwrap().session().is_participant(p3));
    assert_eq!(h.world.teleports_of(p3).len(), moves, "never sent home");
}

#[tokio::test(start_paused = true)]
async fn test_offline_player_cannot_join() {
    let h = harness(snapshot(settings()));
    let p1 = add_players(&h, 1)[0];
    h.world.set_online(p1, false);

    assert_eq!(h.registry.try_join(p1, ARENA), Err(ArenaError::PlayerOffline(p1)));
    assert!(h.registry.arena(ARENA).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_rejoin_while_running_is_refused() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    assert!(matches!(
        h.registry.try_join(players[0], ARENA),
        Err(ArenaError::AlreadyInArena(..))
    ));
}

// =========================================================================
// Auto-start
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_two_players_auto_start_into_running() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    let arena = h.registry.arena(ARENA).unwrap();
    let session = arena.session();
    assert!(session.is_running());
    assert_eq!(session.survivors(), players);
    assert_eq!(session.zone_diameter(), Some(96.0));

    let borders = h.world.borders();
    let first = &borders[0];
    assert_eq!(first.world, WorldId::new("arena"));
    assert_eq!(first.diameter, 96.0);

    for &p in &players {
        let last = h.world.teleports_of(p).pop().unwrap();
        assert_eq!(last.y, 64.0 + 128.0 + 1.0, "player stands on the platform");
        assert_eq!(h.world.game_mode(p), Some(GameMode::Survival));
        assert!(!h.world.effects_of(p).is_empty(), "landing buff applied");
    }
}

#[tokio::test(start_paused = true)]
async fn test_alive_always_subset_of_participants() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 4);
    running_round(&h, &players).await;
    let arena = h.registry.arena(ARENA).unwrap();
    let session = arena.session();

    h.registry.leave_current(players[3]);
    h.world.set_online(players[2], false);
    h.registry.on_disconnect(players[2]);

    let participants = session.participants();
    for p in session.alive_players() {
        assert!(participants.contains(&p));
    }
    assert_eq!(session.survivors(), vec![players[0], players[1]]);
}

#[tokio::test(start_paused = true)]
async fn test_new_join_restarts_auto_start_delay() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 3);
    h.registry.try_join(players[0], ARENA).unwrap();
    h.registry.try_join(players[1], ARENA).unwrap();
    assert!(h.registry.has_pending_auto_start(ARENA));

    advance_ms(500).await;
    h.registry.try_join(players[2], ARENA).unwrap();
    advance_ms(700).await;
    assert_eq!(h.registry.arena(ARENA).unwrap().status(), ArenaStatus::Waiting);

    advance_ms(400).await;
    assert_eq!(h.registry.arena(ARENA).unwrap().status(), ArenaStatus::Preparing);
    assert!(!h.registry.has_pending_auto_start(ARENA));
}

#[tokio::test(start_paused = true)]
async fn test_zero_auto_start_delay_still_starts() {
    let h = harness(snapshot(MatchSettings {
        auto_start_delay_secs: 0,
        ..settings()
    }));
    let players = add_players(&h, 2);
    h.registry.try_join(players[0], ARENA).unwrap();
    h.registry.try_join(players[1], ARENA).unwrap();

    advance_ms(50).await;
    assert_eq!(h.registry.arena(ARENA).unwrap().status(), ArenaStatus::Preparing);
    assert!(!h.registry.has_pending_auto_start(ARENA));

    advance_secs(3).await;
    assert_eq!(h.registry.arena(ARENA).unwrap().status(), ArenaStatus::Running);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_below_minimum_cancels_auto_start() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    h.registry.try_join(players[0], ARENA).unwrap();
    h.registry.try_join(players[1], ARENA).unwrap();

    advance_ms(500).await;
    assert!(h.registry.leave_arena(players[1], ARENA));
    assert!(!h.registry.has_pending_auto_start(ARENA));

    advance_secs(3).await;
    assert_eq!(h.registry.arena(ARENA).unwrap().status(), ArenaStatus::Waiting);
}

#[tokio::test(start_paused = true)]
async fn test_countdown_without_enough_players_returns_to_waiting() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    h.registry.try_join(players[0], ARENA).unwrap();
    h.registry.try_join(players[1], ARENA).unwrap();

    advance_ms(1500).await;
    assert_eq!(h.registry.arena(ARENA).unwrap().status(), ArenaStatus::Preparing);
    h.registry.leave_arena(players[1], ARENA);

    advance_secs(2).await;
    let arena = h.registry.arena(ARENA).unwrap();
    assert_eq!(arena.status(), ArenaStatus::Waiting);
    assert!(arena.session().is_participant(players[0]), "roster kept");
    assert_eq!(
        h.world.teleports_of(players[0]).pop(),
        Some(Location::new("arena", 6.5, 64.0, 5.5)),
        "returned to origin"
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_stops_countdown() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    for &p in &players {
        h.registry.try_join(p, ARENA).unwrap();
    }
    advance_ms(1500).await;

    h.registry.cancel(ARENA).unwrap();
    advance_secs(3).await;

    let arena = h.registry.arena(ARENA).unwrap();
    assert_eq!(arena.status(), ArenaStatus::Waiting);
    assert!(!arena.session().is_running());
    assert_eq!(arena.session().active_tasks(), 0);
}

// =========================================================================
// Round resolution
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_last_survivor_wins_exactly_once() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 3);
    let (p1, p2, p3) = (players[0], players[1], players[2]);
    running_round(&h, &players).await;

    assert!(h.registry.on_death(p2, Some(p1)));
    assert!(h.registry.on_death(p3, Some(p1)));
    h.world.set_online(p3, false);
    h.registry.on_disconnect(p3);
    assert!(!h.registry.on_death(p3, Some(p1)));

    let arena = h.registry.arena(ARENA).unwrap();
    assert_eq!(arena.status(), ArenaStatus::Ending);

    advance_secs(2).await;
    assert_eq!(arena.status(), ArenaStatus::Waiting);
    assert_eq!(h.stats.total(StatEvent::Win), 1);
    assert_eq!(h.stats.count(p1, StatEvent::Win), 1);
    assert_eq!(h.stats.count(p2, StatEvent::Loss), 1);
    assert_eq!(h.stats.count(p3, StatEvent::Loss), 1);
    assert_eq!(h.stats.count(p1, StatEvent::Kill), 2);
    assert_eq!(h.stats.total(StatEvent::Death), 2);

    let victories = h.world.count_notices(|n| matches!(n, Notice::Title { title, .. } if title.contains("wins")));
    assert_eq!(victories, 1);
    assert_eq!(h.world.off_region_mutations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_round_end_restores_players() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    h.registry.on_death(players[1], Some(players[0]));
    assert_eq!(h.world.game_mode(players[1]), Some(GameMode::Spectator));
    advance_secs(2).await;

    for &p in &players {
        let n = p.0;
        assert_eq!(
            h.world.teleports_of(p).pop(),
            Some(Location::new("arena", 5.5 + n as f64, 64.0, 5.5)),
        );
        assert_eq!(h.world.game_mode(p), Some(GameMode::Survival));
    }
    let arena = h.registry.arena(ARENA).unwrap();
    assert_eq!(arena.session().participant_count(), 2, "roster kept after a round");
    assert!(arena.session().alive_players().is_empty());
    assert_eq!(h.world.border_resets(), vec![WorldId::new("arena")]);
}

#[tokio::test(start_paused = true)]
async fn test_winner_disconnecting_during_grace_still_wins() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    let (p1, p2) = (players[0], players[1]);
    running_round(&h, &players).await;

    h.world.set_online(p2, false);
    h.registry.on_disconnect(p2);
    assert_eq!(h.registry.arena(ARENA).unwrap().status(), ArenaStatus::Ending);

    h.world.set_online(p1, false);
    h.registry.on_disconnect(p1);
    advance_secs(2).await;

    assert_eq!(h.stats.count(p1, StatEvent::Win), 1);
    assert_eq!(h.stats.count(p2, StatEvent::Loss), 1);
    assert_eq!(h.stats.total(StatEvent::Death), 0, "disconnects are not deaths");
    assert_eq!(h.registry.arena(ARENA).unwrap().status(), ArenaStatus::Waiting);
}

#[tokio::test(start_paused = true)]
async fn test_stats_outage_does_not_block_round() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;
    h.stats.set_unavailable(true);

    h.registry.on_death(players[1], Some(players[0]));
    advance_secs(2).await;

    assert!(h.stats.records().is_empty());
    assert_eq!(h.registry.arena(ARENA).unwrap().status(), ArenaStatus::Waiting);
}

#[tokio::test(start_paused = true)]
async fn test_killer_is_healed_and_rewarded() {
    let h = harness(snapshot(MatchSettings {
        item_interval: Ticks(100_000),
        ..settings()
    }));
    let players = add_players(&h, 4);
    let (p1, p2, p3) = (players[0], players[1], players[2]);
    running_round(&h, &players).await;

    h.world.set_player_health(p1, 10.0);
    let items = h.world.items_of(p1).len();
    assert!(h.registry.on_death(p2, Some(p1)));
    advance_ms(100).await;

    assert_eq!(h.world.health(p1).unwrap().current, 14.0);
    assert_eq!(h.world.items_of(p1).len(), items + 1);
    assert!(h.world.effects_of(p1).iter().any(|e| e.kind == EffectKind::Speed));

    h.world.set_player_health(p1, 18.0);
    assert!(h.registry.on_death(p3, Some(p1)));
    advance_ms(100).await;
    assert_eq!(h.world.health(p1).unwrap().current, 20.0, "healing is capped");
}

#[tokio::test(start_paused = true)]
async fn test_round_start_reconciles_roster() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 3);
    let (p1, p2, p3) = (players[0], players[1], players[2]);
    for &p in &players {
        h.registry.try_join(p, ARENA).unwrap();
    }
    advance_ms(1500).await;
    let arena = h.registry.arena(ARENA).unwrap();
    assert_eq!(arena.status(), ArenaStatus::Preparing);

    // The session loses p3 while the registry still lists them, and p2
    // goes offline without a disconnect event.
    assert!(arena.session().leave(p3));
    h.world.set_online(p2, false);
    advance_secs(2).await;

    assert_eq!(arena.status(), ArenaStatus::Running);
    assert_eq!(arena.session().survivors(), vec![p1, p3]);
    assert!(!arena.session().is_participant(p2));
}

// =========================================================================
// Zone
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_zone_shrinks_monotonically_to_minimum() {
    let h = harness(snapshot(MatchSettings {
        shrink_delay: Ticks(20),
        shrink_interval: Ticks(20),
        ..settings()
    }));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    advance_secs(30).await;

    let diameters: Vec<f64> = h.world.borders().iter().map(|b| b.diameter).collect();
    assert_eq!(diameters.first(), Some(&96.0));
    assert!(diameters.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(diameters.last(), Some(&10.0));
    assert!(diameters.iter().all(|d| *d >= 10.0));
    assert_eq!(h.registry.arena(ARENA).unwrap().session().zone_diameter(), Some(10.0));

    let done = h.world.count_notices(|n| n.text().is_some_and(|t| t.contains("minimum size")));
    assert_eq!(done, 1);
}

#[tokio::test(start_paused = true)]
async fn test_items_granted_to_alive_players() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    advance_secs(7).await;
    for &p in &players {
        assert!(h.world.items_of(p).len() >= 2);
    }
}

// =========================================================================
// Hazards
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_hazards_chain_one_after_another() {
    let h = harness(snapshot(hazard_settings(vec![Hazard::Ghast], 20)));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    advance_secs(5).await;
    let ghasts = count_entities(&h, EntityKind::Ghast);
    assert!(ghasts >= 4, "{ghasts}");
    assert_eq!(count_entities(&h, EntityKind::Zombie), 0, "only configured hazards");
    assert_eq!(h.world.off_region_mutations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_final_phase_shortens_hazard_delay() {
    let h = harness(snapshot(MatchSettings {
        radius: 8,
        min_diameter: 10.0,
        shrink_amount: 4.0,
        shrink_delay: Ticks(20),
        shrink_interval: Ticks(20),
        hazards: vec![Hazard::Ghast],
        event_delay: DelayRange::new(100, 100),
        final_event_delay: DelayRange::new(20, 20),
        ..settings()
    }));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    advance_secs(3).await;
    assert_eq!(count_entities(&h, EntityKind::Ghast), 0, "first delay is the normal one");

    advance_secs(5).await;
    let ghasts = count_entities(&h, EntityKind::Ghast);
    assert!(ghasts >= 3, "{ghasts}");
}

#[tokio::test(start_paused = true)]
async fn test_arrow_rain_stops_with_the_round() {
    let h = harness(snapshot(hazard_settings(vec![Hazard::ArrowRain], 20)));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    advance_secs(2).await;
    assert!(count_entities(&h, EntityKind::Arrow) > 0);
    assert_eq!(count_cues(&h, Cue::Hazard), 1, "next hazard waits for the rain");

    h.registry.force_stop(ARENA).unwrap();
    advance_ms(100).await;
    let arrows = count_entities(&h, EntityKind::Arrow);
    advance_secs(30).await;
    assert_eq!(count_entities(&h, EntityKind::Arrow), arrows);
    assert_eq!(h.registry.context().scheduler.metrics().live, 0);
}

#[tokio::test(start_paused = true)]
async fn test_crystal_fuse_cancelled_by_stop() {
    let h = harness(snapshot(hazard_settings(vec![Hazard::CrystalBlast], 30)));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    advance_ms(1000).await;
    assert!(count_entities(&h, EntityKind::EndCrystal) >= 3);
    assert!(h.world.explosions().is_empty());

    h.registry.force_stop(ARENA).unwrap();
    advance_secs(10).await;
    assert!(h.world.explosions().is_empty());
    assert_eq!(h.registry.arena(ARENA).unwrap().session().active_tasks(), 0);
}

// =========================================================================
// Airdrops
// =========================================================================

fn airdrop_settings(delay: u64) -> MatchSettings {
    MatchSettings {
        airdrops: true,
        airdrop_delay: Ticks(delay),
        airdrop_interval: Ticks(100_000),
        ..settings()
    }
}

#[tokio::test(start_paused = true)]
async fn test_airdrop_lands_and_is_cleared_on_stop() {
    let h = harness(snapshot(airdrop_settings(20)));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    advance_secs(5).await;
    assert_eq!(count_cues(&h, Cue::Airdrop), 1);
    let chests = h.world.placed(Block::Chest);
    assert_eq!(chests.len(), 1);
    let chest = &chests[0];
    let beacon = chest.up(-1);
    assert_eq!(h.world.block(&beacon), Some(Block::Beacon));
    assert!(chest.x.abs() <= 33 && chest.z.abs() <= 33, "inside the zone");
    let loot = h.world.container(chest).unwrap();
    assert!((6..=9).contains(&loot.len()), "{}", loot.len());
    let drops = h.registry.arena(ARENA).unwrap().session().airdrops();
    assert_eq!(drops.len(), 1);
    let replaced = drops[0].replaced;

    h.registry.force_stop(ARENA).unwrap();
    advance_ms(100).await;
    assert_eq!(h.world.block(chest), Some(Block::Air));
    assert_eq!(h.world.block(&beacon), Some(replaced));
    assert!(h.world.container(chest).is_none());
    assert!(h.registry.arena(ARENA).unwrap().session().airdrops().is_empty());
    assert_eq!(h.world.off_region_mutations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_airdrop_announced_but_not_landed_when_stopped() {
    let h = harness(snapshot(airdrop_settings(30)));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    advance_ms(1000).await;
    assert_eq!(count_cues(&h, Cue::Airdrop), 1);

    h.registry.force_stop(ARENA).unwrap();
    advance_secs(5).await;
    assert!(h.world.placed(Block::Chest).is_empty());
    assert!(h.world.placed(Block::Beacon).is_empty());
}

// =========================================================================
// Deletion and force-stop
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_delete_cancels_all_tasks_and_returns_players() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;
    let arena = h.registry.arena(ARENA).unwrap();

    assert!(h.registry.delete_arena(ARENA));
    assert!(h.registry.arena(ARENA).is_none());
    assert_eq!(arena.session().active_tasks(), 0);
    assert!(!arena.session().is_running());
    for &p in &players {
        assert_eq!(h.registry.arena_of_player(p), None);
    }

    let borders = h.world.borders().len();
    advance_secs(30).await;
    assert_eq!(h.world.borders().len(), borders, "zone stopped");
    assert_eq!(h.registry.context().scheduler.metrics().live, 0);
    for &p in &players {
        let last = h.world.teleports_of(p).pop().unwrap();
        assert_eq!(last.y, 64.0, "back on the ground");
    }
    assert_eq!(h.world.off_region_mutations(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_force_stop_clears_roster() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    h.registry.force_stop(ARENA).unwrap();
    let arena = h.registry.arena(ARENA).unwrap();
    assert_eq!(arena.status(), ArenaStatus::Waiting);
    assert_eq!(arena.session().participant_count(), 0);
    assert_eq!(h.registry.arena_of_player(players[0]), None);
}

// =========================================================================
// Maps, instances, lobby, spectators
// =========================================================================

fn with_skyland(mut config: ConfigSnapshot) -> ConfigSnapshot {
    config.maps = BTreeMap::from([(
        "skyland".to_string(),
        MapDefinition {
            name: Some("Skyland".into()),
            spawn: Location::new("skyland", 0.5, 64.0, 0.5),
            template: Some("skyland".into()),
            radius: Some(24),
            min_players: None,
            countdown_secs: None,
        },
    )]);
    config
}

#[tokio::test(start_paused = true)]
async fn test_isolated_instance_created_and_released() {
    let h = harness(with_skyland(snapshot(settings())));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    assert_eq!(h.env.live_instances(), vec!["skyland_alpha".to_string()]);
    let arena = h.registry.arena(ARENA).unwrap();
    assert_eq!(arena.core().map().as_deref(), Some("skyland"));
    assert_eq!(arena.session().zone_diameter(), Some(48.0));
    for &p in &players {
        let at = h.world.location(p).unwrap();
        assert_eq!(at.world, WorldId::new("skyland_alpha"));
    }

    h.registry.force_stop(ARENA).unwrap();
    advance_ms(500).await;
    assert!(h.env.destroyed_instances().is_empty(), "released only after the grace");
    advance_secs(1).await;
    assert_eq!(h.env.destroyed_instances(), vec!["skyland_alpha".to_string()]);
    for &p in &players {
        assert_eq!(h.world.location(p).unwrap().world, WorldId::new("arena"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_instance_failure_falls_back_to_template_world() {
    let h = harness(with_skyland(snapshot(settings())));
    h.env.set_failing(true);
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    assert!(h.env.live_instances().is_empty());
    for &p in &players {
        assert_eq!(h.world.location(p).unwrap().world, WorldId::new("skyland"));
    }
}

#[tokio::test(start_paused = true)]
async fn test_players_sent_to_lobby_after_round() {
    let mut config = snapshot(settings());
    config.lobby = LobbyConfig {
        enabled: true,
        location: Some(Location::new("lobby", 0.5, 70.0, 0.5)),
    };
    let h = harness(config);
    let players = add_players(&h, 2);
    running_round(&h, &players).await;

    h.registry.on_death(players[1], Some(players[0]));
    advance_secs(2).await;

    for &p in &players {
        assert_eq!(h.world.location(p), Some(Location::new("lobby", 0.5, 64.0, 0.5)));
    }
}

#[tokio::test(start_paused = true)]
async fn test_bystanders_become_spectators() {
    let h = harness(snapshot(MatchSettings {
        capture_spectators: true,
        ..settings()
    }));
    let players = add_players(&h, 2);
    let bystander = PlayerId(9);
    h.world.add_player(bystander, Location::new("arena", 12.5, 64.0, 12.5));
    running_round(&h, &players).await;

    let arena = h.registry.arena(ARENA).unwrap();
    assert!(arena.session().is_spectator(bystander));
    assert!(!arena.session().is_participant(bystander));
    assert_eq!(h.world.game_mode(bystander), Some(GameMode::Spectator));

    h.registry.on_death(players[1], Some(players[0]));
    advance_secs(2).await;

    assert!(!arena.session().is_spectator(bystander));
    assert_eq!(h.world.game_mode(bystander), Some(GameMode::Survival));
}

#[tokio::test(start_paused = true)]
async fn test_config_reload_applies_to_next_round() {
    let h = harness(snapshot(settings()));
    let players = add_players(&h, 2);
    running_round(&h, &players).await;
    h.config.reload(snapshot(MatchSettings {
        radius: 20,
        ..settings()
    }));

    let arena = h.registry.arena(ARENA).unwrap();
    assert_eq!(arena.session().zone_diameter(), Some(96.0), "running round keeps its settings");

    h.registry.on_death(players[1], Some(players[0]));
    advance_secs(2).await;
    h.registry.start_countdown(ARENA).unwrap();
    advance_secs(3).await;

    assert_eq!(arena.status(), ArenaStatus::Running);
    assert_eq!(arena.session().zone_diameter(), Some(40.0));
}

fn with_two_maps(mut config: ConfigSnapshot) -> ConfigSnapshot {
    let map = |x: f64, radius: u32| MapDefinition {
        name: None,
        spawn: Location::new("arena", x, 64.0, 0.5),
        template: None,
        radius: Some(radius),
        min_players: None,
        countdown_secs: None,
    };
    config.maps = BTreeMap::from([
        ("canyon".to_string(), map(300.5, 30)),
        ("glacier".to_string(), map(-299.5, 20)),
    ]);
    config
}

#[tokio::test(start_paused = true)]
async fn test_map_vote_counts_only_remaining_players() {
    let h = harness(with_two_maps(snapshot(settings())));
    let players = add_players(&h, 5);
    h.registry.try_join(players[0], ARENA).unwrap();
    assert!(h.registry.vote_tally(ARENA).is_none(), "no vote below the minimum");
    for &p in &players[1..] {
        h.registry.try_join(p, ARENA).unwrap();
    }

    for (p, map) in players.iter().zip(["canyon", "canyon", "glacier", "glacier", "glacier"]) {
        h.registry.vote(*p, ARENA, Some(map)).unwrap();
    }
    assert_eq!(
        h.registry.vote(players[0], ARENA, Some("moon")),
        Err(ArenaError::UnknownMap("moon".into()))
    );
    h.registry.leave_arena(players[3], ARENA);
    h.registry.leave_arena(players[4], ARENA);
    let tally = h.registry.vote_tally(ARENA).unwrap();
    assert_eq!(tally["canyon"], 2);
    assert_eq!(tally["glacier"], 1);

    advance_secs(4).await;
    let arena = h.registry.arena(ARENA).unwrap();
    assert_eq!(arena.status(), ArenaStatus::Running);
    assert_eq!(arena.core().map().as_deref(), Some("canyon"));
    assert_eq!(arena.session().zone_diameter(), Some(60.0));
    assert!(h.registry.vote_tally(ARENA).is_none(), "closed at countdown");
}

#[tokio::test(start_paused = true)]
async fn test_map_vote_closes_below_minimum() {
    let h = harness(with_two_maps(snapshot(settings())));
    let players = add_players(&h, 3);
    h.registry.try_join(players[0], ARENA).unwrap();
    h.registry.try_join(players[1], ARENA).unwrap();
    h.registry.vote(players[0], ARENA, Some("glacier")).unwrap();
    assert_eq!(
        h.registry.vote(players[2], ARENA, Some("glacier")),
        Err(ArenaError::NotInArena(players[2], ARENA.into()))
    );

    h.registry.leave_arena(players[1], ARENA);
    assert!(h.registry.vote_tally(ARENA).is_none());
    assert_eq!(
        h.registry.vote(players[0], ARENA, Some("glacier")),
        Err(ArenaError::NoVote(ARENA.into()))
    );
}
