//! Random hazard events.
//!
//! The director is a chain of one-shot timers: each event picks the delay
//! to the next one once its choreography is over, so the cadence follows
//! the zone. Once the zone is nearly closed the shorter `final_event_delay`
//! range applies.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use rand::seq::IndexedRandom;
use ringfall_model::{Cue, EffectKind, EntityKind, Location, Notice, PlayerId, StatusEffect};
use ringfall_tick::{TaskFlow, Ticks};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ArenaContext, DelayRange, MatchSession, MatchSettings};

const ARROW_WAVES: u32 = 20;
const ARROW_WAVE_SPACING: Ticks = Ticks(20);
const ARROWS_PER_PLAYER: usize = 5;
const CRYSTAL_FUSE: Ticks = Ticks(60);
const CRYSTAL_POWER: f32 = 6.0;

/// The hazards the director picks from, uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hazard {
    /// Waves of arrows above every alive player.
    ArrowRain,
    /// A ghast above one player.
    Ghast,
    /// Zombies around one player.
    ZombieSiege,
    /// Slow-falling creepers above one player.
    CreeperRain,
    /// Everyone floats up, then drifts down.
    GravityFlip,
    /// End crystals around one player that explode after a short fuse.
    CrystalBlast,
}

impl Hazard {
    pub const ALL: [Hazard; 6] = [
        Hazard::ArrowRain,
        Hazard::Ghast,
        Hazard::ZombieSiege,
        Hazard::CreeperRain,
        Hazard::GravityFlip,
        Hazard::CrystalBlast,
    ];

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::pick(&Self::ALL, rng)
    }

    /// A uniform pick from `pool`, or from every hazard if it is empty.
    pub fn pick<R: Rng + ?Sized>(pool: &[Hazard], rng: &mut R) -> Self {
        let pool = if pool.is_empty() { &Self::ALL[..] } else { pool };
        *pool.choose(rng).unwrap_or(&Hazard::ArrowRain)
    }

    /// How long the hazard keeps acting after it fires.
    pub fn duration(self) -> Ticks {
        match self {
            Self::ArrowRain => ARROW_WAVE_SPACING * u64::from(ARROW_WAVES),
            Self::CrystalBlast => CRYSTAL_FUSE,
            _ => Ticks::ZERO,
        }
    }

    /// `true` if the hazard hits every alive player rather than one target.
    pub fn targets_everyone(self) -> bool {
        matches!(self, Self::ArrowRain | Self::GravityFlip)
    }
}

impl fmt::Display for Hazard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ArrowRain => "Arrow Rain",
            Self::Ghast => "Ghast Attack",
            Self::ZombieSiege => "Zombie Siege",
            Self::CreeperRain => "Creeper Rain",
            Self::GravityFlip => "Gravity Flip",
            Self::CrystalBlast => "Crystal Blast",
        };
        f.write_str(name)
    }
}

/// Delay until the next event, uniform in the applicable range.
pub fn next_delay<R: Rng + ?Sized>(settings: &MatchSettings, final_phase: bool, rng: &mut R) -> Ticks {
    let DelayRange { min, max } = if final_phase {
        settings.final_event_delay
    } else {
        settings.event_delay
    };
    let spread = max.saturating_sub(min).0;
    Ticks(min.0 + rng.random_range(0..=spread))
}

// ---------------------------------------------------------------------------
// Director
// ---------------------------------------------------------------------------

/// Schedules the next hazard for `session`'s current round.
pub(crate) fn schedule_next(session: &Arc<MatchSession>) {
    if !session.is_running() {
        return;
    }
    let Some(settings) = session.round_settings() else {
        return;
    };
    let final_phase = session.in_final_phase();
    let delay = next_delay(&settings, final_phase, &mut rand::rng());
    debug!(arena = %session.name(), %delay, final_phase, "next hazard scheduled");

    let weak = Arc::downgrade(session);
    let handle = session.ctx().scheduler.run_later(delay, move || {
        let Some(session) = weak.upgrade() else {
            return;
        };
        if !session.is_running() {
            return;
        }
        let hazard = Hazard::pick(&settings.hazards, &mut rand::rng());
        let busy = fire(&session, hazard);
        if busy.is_zero() {
            schedule_next(&session);
        } else {
            schedule_after(&session, busy);
        }
    });
    session.track_round_task(handle);
}

/// Picks the next delay once the current hazard is over.
fn schedule_after(session: &Arc<MatchSession>, busy: Ticks) {
    let weak = Arc::downgrade(session);
    let handle = session.ctx().scheduler.run_later(busy, move || {
        if let Some(session) = weak.upgrade() {
            schedule_next(&session);
        }
    });
    session.track_round_task(handle);
}

/// Runs one hazard against the current alive set. Returns how long it
/// keeps acting, or zero if nobody could be targeted.
pub(crate) fn fire(session: &Arc<MatchSession>, hazard: Hazard) -> Ticks {
    let ctx = session.ctx();
    let alive = session.alive_players();
    let targets: Vec<(PlayerId, Location)> = alive
        .iter()
        .filter_map(|&p| ctx.world.location(p).map(|at| (p, at)))
        .collect();
    if targets.is_empty() {
        return Ticks::ZERO;
    }

    info!(arena = %session.name(), %hazard, "hazard event");
    ctx.notify(&alive, Notice::title(hazard.to_string(), "Watch out!"));
    ctx.notify(&alive, Notice::cue(Cue::Hazard));

    let mut rng = rand::rng();
    let Some((target, at)) = targets.choose(&mut rng).cloned() else {
        return Ticks::ZERO;
    };

    match hazard {
        Hazard::ArrowRain => arrow_rain(session),
        Hazard::Ghast => spawn(ctx, at.offset(0.0, 10.0, 0.0), EntityKind::Ghast, None),
        Hazard::ZombieSiege => {
            for _ in 0..3 {
                let spot = jitter(&at, 3.0, 0.0, &mut rng);
                spawn(ctx, spot, EntityKind::Zombie, None);
            }
        }
        Hazard::CreeperRain => {
            let fall = StatusEffect::new(EffectKind::SlowFalling, 200);
            for _ in 0..5 {
                let spot = jitter(&at, 2.0, 30.0, &mut rng);
                spawn(ctx, spot, EntityKind::Creeper, Some(fall));
            }
        }
        Hazard::GravityFlip => {
            for (player, _) in &targets {
                let player = *player;
                if let Some(job) = ctx.at_player(player, move |w| {
                    w.apply_effect(player, StatusEffect::new(EffectKind::Levitation, 400));
                    w.apply_effect(player, StatusEffect::new(EffectKind::SlowFalling, 600));
                }) {
                    job.detach();
                }
            }
        }
        Hazard::CrystalBlast => {
            let spots: Vec<Location> = (0..3).map(|_| jitter(&at, 4.0, 0.0, &mut rng)).collect();
            for spot in &spots {
                spawn(ctx, spot.clone(), EntityKind::EndCrystal, None);
            }
            let fuse_ctx = ctx.clone();
            let handle = ctx.scheduler.run_later(CRYSTAL_FUSE, move || {
                for spot in spots {
                    let at = spot.clone();
                    fuse_ctx.at(&spot, move |w| w.explode(&at, CRYSTAL_POWER)).detach();
                }
            });
            session.track_hazard_task(handle);
        }
    }
    debug!(arena = %session.name(), %hazard, %target, "hazard dispatched");
    hazard.duration()
}

fn arrow_rain(session: &Arc<MatchSession>) {
    let weak = Arc::downgrade(session);
    let mut waves = 0;
    let handle = session
        .ctx()
        .scheduler
        .run_timer(Ticks::ZERO, ARROW_WAVE_SPACING, move || {
            let Some(session) = weak.upgrade() else {
                return TaskFlow::Stop;
            };
            if !session.is_running() || waves >= ARROW_WAVES {
                return TaskFlow::Stop;
            }
            waves += 1;
            let ctx = session.ctx();
            let mut rng = rand::rng();
            for player in session.alive_players() {
                let Some(at) = ctx.world.location(player) else {
                    continue;
                };
                for _ in 0..ARROWS_PER_PLAYER {
                    let spot = jitter(&at, 5.0, 25.0, &mut rng);
                    spawn(ctx, spot, EntityKind::Arrow, None);
                }
            }
            if waves >= ARROW_WAVES {
                TaskFlow::Stop
            } else {
                TaskFlow::Continue
            }
        });
    session.track_hazard_task(handle);
}

fn jitter<R: Rng + ?Sized>(at: &Location, spread: f64, dy: f64, rng: &mut R) -> Location {
    at.offset(
        rng.random_range(-spread..=spread),
        dy,
        rng.random_range(-spread..=spread),
    )
}

fn spawn(ctx: &ArenaContext, at: Location, kind: EntityKind, effect: Option<StatusEffect>) {
    let spot = at.clone();
    ctx.at(&at, move |w| w.spawn_entity(&spot, kind, effect)).detach();
}
