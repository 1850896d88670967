//! Kill streaks, bounties, and death-streak compensation.

use dashmap::DashMap;
use rand::Rng;
use rand::seq::IndexedRandom;
use ringfall_model::{EffectKind, ItemKind, ItemStack, PlayerId, StatusEffect};

/// Consecutive kills and deaths of one player.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Streak {
    pub kills: u32,
    pub deaths: u32,
}

/// The result of crediting one kill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KillOutcome {
    pub killer: PlayerId,
    pub victim: PlayerId,
    /// The killer's kill streak including this kill.
    pub killer_streak: u32,
    /// The victim's kill streak that this kill ended.
    pub ended_streak: u32,
}

impl KillOutcome {
    /// `max(1, ended_streak / 2)`.
    pub fn bounty_multiplier(&self) -> u32 {
        (self.ended_streak / 2).max(1)
    }
}

/// Something to hand to a player.
#[derive(Debug, Clone, PartialEq)]
pub enum Grant {
    /// Restore this much health, up to the maximum.
    Heal(f64),
    Item(ItemStack),
    /// This many draws from the round's item table.
    Draws(u32),
    Effect(StatusEffect),
    /// A line to show everyone in the arena.
    Announce(String),
}

/// Per-arena streak counters.
#[derive(Debug, Default)]
pub struct StreakBook {
    streaks: DashMap<PlayerId, Streak>,
}

impl StreakBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, player: PlayerId) -> Streak {
        self.streaks.get(&player).map(|s| *s).unwrap_or_default()
    }

    /// Credits `killer` with a kill of `victim`.
    pub fn record_kill(&self, killer: PlayerId, victim: PlayerId) -> KillOutcome {
        let ended_streak = {
            let mut v = self.streaks.entry(victim).or_default();
            let ended = v.kills;
            v.kills = 0;
            v.deaths += 1;
            ended
        };
        let killer_streak = {
            let mut k = self.streaks.entry(killer).or_default();
            k.kills += 1;
            k.deaths = 0;
            k.kills
        };
        KillOutcome {
            killer,
            victim,
            killer_streak,
            ended_streak,
        }
    }

    /// A death nobody is credited for.
    pub fn record_death(&self, victim: PlayerId) {
        let mut v = self.streaks.entry(victim).or_default();
        v.kills = 0;
        v.deaths += 1;
    }

    pub fn forget(&self, player: PlayerId) {
        self.streaks.remove(&player);
    }

    pub fn clear(&self) {
        self.streaks.clear();
    }

    /// Help for a player on a losing run, applied at round start.
    pub fn compensation(&self, player: PlayerId) -> Vec<Grant> {
        let deaths = self.get(player).deaths;
        let mut grants = Vec::new();
        if deaths >= 3 {
            grants.push(Grant::Item(ItemStack::new(ItemKind::GoldenApple, 2)));
            grants.push(Grant::Effect(StatusEffect::new(EffectKind::Resistance, 600)));
        }
        if deaths >= 5 {
            grants.push(Grant::Item(ItemStack::one(ItemKind::Shield)));
            grants.push(Grant::Item(ItemStack::new(ItemKind::EnderPearl, 2)));
        }
        grants
    }
}

const BOUNTY_BONUSES: [(ItemKind, u32); 5] = [
    (ItemKind::GoldenApple, 1),
    (ItemKind::EnderPearl, 1),
    (ItemKind::Arrow, 4),
    (ItemKind::CookedBeef, 2),
    (ItemKind::GoldenCarrot, 2),
];

/// Everything the killer earns for `outcome`.
pub fn kill_rewards<R: Rng + ?Sized>(outcome: &KillOutcome, rng: &mut R) -> Vec<Grant> {
    let m = outcome.bounty_multiplier();
    let killer = outcome.killer;
    let mut grants = vec![
        Grant::Heal(4.0 * f64::from(m.min(3))),
        Grant::Draws(m.min(2)),
    ];
    if m >= 2 {
        if let Some(&(kind, amount)) = BOUNTY_BONUSES.choose(rng) {
            grants.push(Grant::Item(ItemStack::new(kind, amount)));
        }
        grants.push(Grant::Announce(format!(
            "{killer} claimed a x{m} bounty on {}!",
            outcome.victim
        )));
    }
    grants.push(Grant::Effect(StatusEffect::new(EffectKind::Speed, 100)));

    match outcome.killer_streak {
        3 => grants.push(Grant::Announce(format!("{killer} is on a 3 kill streak!"))),
        5 => {
            grants.push(Grant::Item(ItemStack::one(ItemKind::GoldenApple)));
            grants.push(Grant::Announce(format!("{killer} is unstoppable with 5 kills!")));
        }
        7 => {
            grants.push(Grant::Effect(StatusEffect::new(EffectKind::Glowing, 600)));
            grants.push(Grant::Announce(format!("{killer} is on a rampage! 7 kills!")));
        }
        n if n >= 10 => {
            grants.push(Grant::Effect(StatusEffect::new(EffectKind::Glowing, 6000)));
            grants.push(Grant::Effect(StatusEffect::new(EffectKind::Slowness, 400)));
            grants.push(Grant::Announce(format!("{killer} is legendary with {n} kills!")));
        }
        _ => {}
    }

    if outcome.ended_streak >= 5 {
        let prize = if outcome.ended_streak >= 7 {
            ItemStack::one(ItemKind::EnchantedGoldenApple)
        } else {
            ItemStack::new(ItemKind::GoldenApple, 3)
        };
        grants.push(Grant::Item(prize));
        grants.push(Grant::Announce(format!(
            "{killer} ended {}'s {} kill streak!",
            outcome.victim, outcome.ended_streak
        )));
    }
    grants
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn pid(id: u64) -> PlayerId {
        PlayerId(id)
    }

    fn items(grants: &[Grant]) -> Vec<ItemStack> {
        grants
            .iter()
            .filter_map(|g| match g {
                Grant::Item(stack) => Some(stack.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_kill_moves_streaks() {
        let book = StreakBook::new();
        book.record_kill(pid(1), pid(2));
        book.record_kill(pid(1), pid(3));
        let out = book.record_kill(pid(2), pid(1));

        assert_eq!(out.ended_streak, 2);
        assert_eq!(out.killer_streak, 1);
        assert_eq!(book.get(pid(1)), Streak { kills: 0, deaths: 1 });
        assert_eq!(book.get(pid(2)), Streak { kills: 1, deaths: 0 });
    }

    #[test]
    fn test_bounty_multiplier() {
        let mk = |ended| KillOutcome {
            killer: pid(1),
            victim: pid(2),
            killer_streak: 1,
            ended_streak: ended,
        };
        assert_eq!(mk(0).bounty_multiplier(), 1);
        assert_eq!(mk(3).bounty_multiplier(), 1);
        assert_eq!(mk(4).bounty_multiplier(), 2);
        assert_eq!(mk(9).bounty_multiplier(), 4);
    }

    #[test]
    fn test_plain_kill_reward() {
        let out = KillOutcome {
            killer: pid(1),
            victim: pid(2),
            killer_streak: 1,
            ended_streak: 0,
        };
        let grants = kill_rewards(&out, &mut StdRng::seed_from_u64(1));
        assert_eq!(
            grants,
            vec![
                Grant::Heal(4.0),
                Grant::Draws(1),
                Grant::Effect(StatusEffect::new(EffectKind::Speed, 100)),
            ]
        );
    }

    #[test]
    fn test_big_bounty_caps_heal_and_draws() {
        let out = KillOutcome {
            killer: pid(1),
            victim: pid(2),
            killer_streak: 1,
            ended_streak: 8,
        };
        let grants = kill_rewards(&out, &mut StdRng::seed_from_u64(1));
        assert!(grants.contains(&Grant::Heal(12.0)));
        assert!(grants.contains(&Grant::Draws(2)));
        // bounty bonus plus the shutdown prize
        let got = items(&grants);
        assert_eq!(got.len(), 2);
        assert_eq!(got[1], ItemStack::one(ItemKind::EnchantedGoldenApple));
    }

    #[test]
    fn test_streak_milestones() {
        let at = |streak| KillOutcome {
            killer: pid(1),
            victim: pid(2),
            killer_streak: streak,
            ended_streak: 0,
        };
        let mut rng = StdRng::seed_from_u64(2);
        assert!(items(&kill_rewards(&at(5), &mut rng)).contains(&ItemStack::one(ItemKind::GoldenApple)));
        assert!(kill_rewards(&at(7), &mut rng)
            .contains(&Grant::Effect(StatusEffect::new(EffectKind::Glowing, 600))));
        let twelve = kill_rewards(&at(12), &mut rng);
        assert!(twelve.contains(&Grant::Effect(StatusEffect::new(EffectKind::Glowing, 6000))));
        assert!(twelve.contains(&Grant::Effect(StatusEffect::new(EffectKind::Slowness, 400))));
    }

    #[test]
    fn test_compensation_tiers() {
        let book = StreakBook::new();
        for _ in 0..3 {
            book.record_death(pid(9));
        }
        assert_eq!(book.compensation(pid(9)).len(), 2);
        for _ in 0..2 {
            book.record_death(pid(9));
        }
        assert_eq!(book.compensation(pid(9)).len(), 4);
        book.forget(pid(9));
        assert!(book.compensation(pid(9)).is_empty());
    }
}
