//! The shrinking zone.

use std::sync::Arc;

use ringfall_model::{Cue, Location, Notice};
use ringfall_tick::{TaskFlow, TaskHandle};
use tracing::debug;

use crate::{MatchSession, MatchSettings, ZoneBounds};

/// Diameter bookkeeping for one round's zone.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneShrink {
    diameter: f64,
    minimum: f64,
    amount: f64,
}

/// What one shrink tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShrinkStep {
    /// The zone shrank and can shrink further.
    Shrunk { from: f64, to: f64 },
    /// The zone shrank onto the minimum. No further steps.
    Final { from: f64, to: f64 },
    /// Already at the minimum; nothing changed.
    AtMinimum,
}

impl ShrinkStep {
    pub fn is_done(&self) -> bool {
        !matches!(self, Self::Shrunk { .. })
    }
}

impl ZoneShrink {
    pub fn new(initial: f64, minimum: f64, amount: f64) -> Self {
        Self {
            diameter: initial.max(minimum),
            minimum,
            amount,
        }
    }

    pub fn from_settings(settings: &MatchSettings) -> Self {
        Self::new(
            settings.initial_diameter(),
            settings.min_diameter,
            settings.shrink_amount,
        )
    }

    pub fn diameter(&self) -> f64 {
        self.diameter
    }

    pub fn minimum(&self) -> f64 {
        self.minimum
    }

    /// Shrinks by one step, never below the minimum.
    pub fn step(&mut self) -> ShrinkStep {
        if self.diameter <= self.minimum {
            return ShrinkStep::AtMinimum;
        }
        let from = self.diameter;
        let to = (from - self.amount).max(self.minimum);
        self.diameter = to;
        if to <= self.minimum {
            ShrinkStep::Final { from, to }
        } else {
            ShrinkStep::Shrunk { from, to }
        }
    }

    /// The last stretch of a round, when hazards come faster.
    pub fn is_final_phase(&self) -> bool {
        self.diameter <= self.minimum * 1.2
    }
}

/// The zone of a running round.
#[derive(Debug, Clone)]
pub struct ActiveZone {
    pub center: Location,
    pub shrink: ZoneShrink,
}

impl ActiveZone {
    pub fn bounds(&self) -> ZoneBounds {
        ZoneBounds::new(&self.center, self.shrink.diameter())
    }
}

/// Starts the shrink timer for `session`'s current round.
pub(crate) fn start(session: &Arc<MatchSession>, settings: &MatchSettings) -> TaskHandle {
    let weak = Arc::downgrade(session);
    let transition = session.ctx().scheduler.config().duration_of(settings.shrink_interval);

    session.ctx().scheduler.run_timer(
        settings.shrink_delay,
        settings.shrink_interval,
        move || {
            let Some(session) = weak.upgrade() else {
                return TaskFlow::Stop;
            };
            if !session.is_running() {
                return TaskFlow::Stop;
            }
            let Some((step, center)) = session.shrink_zone() else {
                return TaskFlow::Stop;
            };

            let ctx = session.ctx();
            let alive = session.alive_players();
            match step {
                ShrinkStep::Shrunk { to, .. } | ShrinkStep::Final { to, .. } => {
                    debug!(arena = %session.name(), diameter = to, "zone shrinking");
                    let world = center.world.clone();
                    let at = center.clone();
                    ctx.at(&center, move |w| w.set_border(&world, &at, to, transition))
                        .detach();
                    ctx.notify(&alive, Notice::chat(format!("The zone is shrinking to {to:.0} blocks!")));
                    ctx.notify(&alive, Notice::cue(Cue::ZoneShrink));
                }
                ShrinkStep::AtMinimum => {}
            }
            if step.is_done() {
                ctx.notify(&alive, Notice::chat("The zone has reached its minimum size."));
                debug!(arena = %session.name(), "zone at minimum, shrink stopped");
                return TaskFlow::Stop;
            }
            TaskFlow::Continue
        },
    )
}
