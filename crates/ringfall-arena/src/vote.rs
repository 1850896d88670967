//! Map voting while an arena waits for its countdown.

use std::collections::{BTreeMap, HashMap};

use rand::Rng;
use rand::seq::IndexedRandom;
use ringfall_model::PlayerId;

use crate::ArenaError;

/// One arena's open map vote. Each player holds at most one ballot.
#[derive(Debug, Clone, Default)]
pub struct MapVote {
    candidates: Vec<String>,
    ballots: HashMap<PlayerId, String>,
}

impl MapVote {
    pub fn new(candidates: impl IntoIterator<Item = String>) -> Self {
        let mut candidates: Vec<String> = candidates.into_iter().collect();
        candidates.sort();
        candidates.dedup();
        Self {
            candidates,
            ballots: HashMap::new(),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Records `player`'s ballot, replacing any earlier one. `None`
    /// withdraws it.
    pub fn cast(&mut self, player: PlayerId, map: Option<&str>) -> Result<(), ArenaError> {
        match map {
            None => {
                self.ballots.remove(&player);
            }
            Some(map) if self.candidates.iter().any(|c| c == map) => {
                self.ballots.insert(player, map.to_string());
            }
            Some(map) => return Err(ArenaError::UnknownMap(map.to_string())),
        }
        Ok(())
    }

    /// Drops ballots of players `keep` rejects.
    pub fn retain(&mut self, mut keep: impl FnMut(PlayerId) -> bool) {
        self.ballots.retain(|player, _| keep(*player));
    }

    pub fn ballots(&self) -> usize {
        self.ballots.len()
    }

    /// Votes per candidate, including candidates nobody voted for.
    pub fn tally(&self) -> BTreeMap<String, usize> {
        let mut tally: BTreeMap<String, usize> =
            self.candidates.iter().map(|c| (c.clone(), 0)).collect();
        for map in self.ballots.values() {
            if let Some(count) = tally.get_mut(map) {
                *count += 1;
            }
        }
        tally
    }

    /// The most voted map, ties broken at random. `None` without ballots.
    pub fn winner<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        if self.ballots.is_empty() {
            return None;
        }
        let tally = self.tally();
        let top = tally.values().copied().max()?;
        let leaders: Vec<&String> = tally
            .iter()
            .filter(|(_, votes)| **votes == top)
            .map(|(map, _)| map)
            .collect();
        leaders.choose(rng).map(|map| (*map).clone())
    }
}
