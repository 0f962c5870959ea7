//! Coin-flip attrition combat.
//!
//! Every round each unit on each side survives independently with [`SURVIVAL_CHANCE`]. A round
//! that changes nothing is a push: one unit is removed from a randomly chosen side that still has
//! fleets, so every fight terminates.

use starfall_protocol::{CombatRound, PlayerId, SkirmishRound};

use crate::constants::SURVIVAL_CHANCE;
use crate::rng::SeededRng;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkirmishOutcome {
    pub rounds: Vec<SkirmishRound>,
    /// Last attacker standing, or `None` on mutual annihilation.
    pub survivor: Option<(PlayerId, u32)>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DuelOutcome {
    pub rounds: Vec<CombatRound>,
    pub attacker: u32,
    pub defender: u32,
}

impl DuelOutcome {
    pub fn attacker_won(&self) -> bool {
        self.attacker > 0 && self.defender == 0
    }
}

fn survivors(count: u32, rng: &mut SeededRng) -> u32 {
    (0..count).filter(|_| rng.chance(SURVIVAL_CHANCE)).count() as u32
}

/// Whittle several attackers down until at most one has fleets left.
///
/// `attackers` should already be grouped by player; order is preserved in every round record.
pub fn skirmish(attackers: &[(PlayerId, u32)], rng: &mut SeededRng) -> SkirmishOutcome {
    let mut fleets: Vec<(PlayerId, u32)> = attackers.iter().copied().filter(|&(_, n)| n > 0).collect();
    let mut rounds = Vec::new();

    while fleets.iter().filter(|&&(_, n)| n > 0).count() > 1 {
        let before: Vec<u32> = fleets.iter().map(|&(_, n)| n).collect();
        for entry in fleets.iter_mut() {
            entry.1 = survivors(entry.1, rng);
        }

        let unchanged = fleets.iter().zip(&before).all(|(&(_, n), &b)| n == b);
        if unchanged {
            let alive: Vec<usize> = (0..fleets.len()).filter(|&i| fleets[i].1 > 0).collect();
            if let Some(&idx) = rng.pick(&alive) {
                fleets[idx].1 -= 1;
            }
        }

        rounds.push(SkirmishRound {
            fleets: fleets.clone(),
        });
    }

    SkirmishOutcome {
        rounds,
        survivor: fleets.into_iter().find(|&(_, n)| n > 0),
    }
}

/// Head-to-head attrition until one side (or both) is gone.
pub fn duel(attacker: u32, defender: u32, rng: &mut SeededRng) -> DuelOutcome {
    let (mut a, mut d) = (attacker, defender);
    let mut rounds = Vec::new();

    while a > 0 && d > 0 {
        let (na, nd) = (survivors(a, rng), survivors(d, rng));
        if na == a && nd == d {
            // Push: both sides still have fleets here.
            if rng.chance(0.5) {
                a -= 1;
            } else {
                d -= 1;
            }
        } else {
            a = na;
            d = nd;
        }
        rounds.push(CombatRound {
            attacker: a,
            defender: d,
        });
    }

    DuelOutcome {
        rounds,
        attacker: a,
        defender: d,
    }
}
