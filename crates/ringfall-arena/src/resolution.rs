//! Eliminations and the end of a round.
//!
//! Every way out of a running round (death, disconnect, leaving) goes
//! through [`eliminate`]. The elimination that leaves at most one player
//! alive moves the arena to `ENDING` exactly once; the win/loss sequence
//! follows after the end grace period.

use std::sync::Arc;

use ringfall_model::{Cue, Notice, PlayerId};
use tracing::{debug, info};

use crate::rewards::kill_rewards;
use crate::{MatchSession, StatEvent};

/// How a player left the alive set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EliminationCause {
    Death,
    Disconnect,
    Left,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elimination {
    pub player: PlayerId,
    pub cause: EliminationCause,
    /// Credited only for deaths.
    pub killer: Option<PlayerId>,
}

impl Elimination {
    pub fn death(player: PlayerId, killer: Option<PlayerId>) -> Self {
        Self {
            player,
            cause: EliminationCause::Death,
            killer,
        }
    }

    pub fn without_credit(player: PlayerId, cause: EliminationCause) -> Self {
        Self {
            player,
            cause,
            killer: None,
        }
    }
}

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundOutcome {
    Winner(PlayerId),
    NoSurvivors,
}

/// The outcome for the given survivors. Meaningful once at most one remains.
pub fn outcome_for(survivors: &[PlayerId]) -> RoundOutcome {
    match survivors {
        [winner] => RoundOutcome::Winner(*winner),
        _ => RoundOutcome::NoSurvivors,
    }
}

/// Removes a player from the alive set and resolves the consequences.
///
/// Returns `false` if the player was not alive.
pub(crate) fn eliminate(session: &Arc<MatchSession>, elimination: Elimination) -> bool {
    let Elimination {
        player,
        cause,
        killer,
    } = elimination;
    if !session.remove_alive(player) {
        return false;
    }
    let ctx = session.ctx();
    let killer = killer.filter(|k| *k != player && session.is_participant(*k));

    if cause == EliminationCause::Death {
        ctx.record(player, StatEvent::Death);
    }
    match killer {
        Some(killer) => {
            ctx.record(killer, StatEvent::Kill);
            reward_killer(session, killer, player);
        }
        None => session.streaks().record_death(player),
    }

    let survivors = session.alive_players();
    let audience = session.audience();
    let line = match (cause, killer) {
        (EliminationCause::Death, Some(k)) => format!("{player} was eliminated by {k}. {} remain.", survivors.len()),
        (EliminationCause::Disconnect, _) => format!("{player} disconnected. {} remain.", survivors.len()),
        (EliminationCause::Left, _) => format!("{player} left the round. {} remain.", survivors.len()),
        _ => format!("{player} was eliminated. {} remain.", survivors.len()),
    };
    ctx.notify(&audience, Notice::chat(line));
    ctx.notify(&audience, Notice::cue(Cue::Elimination));
    info!(arena = %session.name(), %player, ?cause, alive = survivors.len(), "player eliminated");

    if survivors.len() <= 1 {
        if let Some(outcome) = session.begin_ending() {
            schedule_finish(session, outcome);
        }
    }
    true
}

fn reward_killer(session: &Arc<MatchSession>, killer: PlayerId, victim: PlayerId) {
    let outcome = session.streaks().record_kill(killer, victim);
    let Some(settings) = session.round_settings() else {
        return;
    };
    if !settings.rewards {
        return;
    }
    let grants = kill_rewards(&outcome, &mut rand::rng());
    debug!(arena = %session.name(), %killer, %victim, multiplier = outcome.bounty_multiplier(), "kill rewarded");
    session.apply_grants(killer, grants);
}

fn schedule_finish(session: &Arc<MatchSession>, outcome: RoundOutcome) {
    let Some(settings) = session.round_settings() else {
        finish_round(session, outcome);
        return;
    };
    let weak = Arc::downgrade(session);
    let handle = session.ctx().scheduler.run_later(settings.end_grace, move || {
        if let Some(session) = weak.upgrade() {
            finish_round(&session, outcome);
        }
    });
    session.track_task(handle);
}

/// Announces the result, records wins and losses, then stops the round.
pub(crate) fn finish_round(session: &Arc<MatchSession>, outcome: RoundOutcome) {
    let ctx = session.ctx();
    let audience = session.audience();

    match outcome {
        RoundOutcome::Winner(winner) => {
            ctx.notify(&audience, Notice::title(format!("{winner} wins!"), "Victory Royale"));
            ctx.notify(&audience, Notice::cue(Cue::Victory));
        }
        RoundOutcome::NoSurvivors => {
            ctx.notify(&audience, Notice::title("No survivors", "Nobody wins this round"));
        }
    }

    for player in session.entrants() {
        let event = match outcome {
            RoundOutcome::Winner(winner) if winner == player => StatEvent::Win,
            _ => StatEvent::Loss,
        };
        ctx.record(player, event);
    }
    info!(arena = %session.name(), ?outcome, "round finished");
    session.stop();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_for() {
        assert_eq!(outcome_for(&[PlayerId(4)]), RoundOutcome::Winner(PlayerId(4)));
        assert_eq!(outcome_for(&[]), RoundOutcome::NoSurvivors);
    }

    #[test]
    fn test_elimination_constructors() {
        let e = Elimination::death(PlayerId(1), Some(PlayerId(2)));
        assert_eq!(e.cause, EliminationCause::Death);
        let e = Elimination::without_credit(PlayerId(1), EliminationCause::Disconnect);
        assert!(e.killer.is_none());
    }
}
