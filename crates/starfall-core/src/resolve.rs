//! Simultaneous movement resolution.
//!
//! [`resolve_turn`] is pure: it reads a snapshot of systems, links and each player's move orders
//! and produces a [`ResolutionPlan`] that the room commits later. Placements and powerups have
//! already been applied to the snapshot by the time this runs.
//!
//! Per target system, in ascending id order:
//! 1. the owner's own arrivals reinforce the garrison;
//! 2. hostile arrivals are grouped by player (id order);
//! 3. two or more attackers skirmish down to one survivor;
//! 4. the survivor fights the garrison head to head.
//!
//! A source emptied by its owner's departures loses its owner and shield. If that source is the
//! owner's wormhole anchor, the wormhole is cancelled; emptying any other source leaves it open.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use starfall_protocol::{
    Battle, BattleParticipant, BattleRole, MoveOrder, PlayerId, RevealedMove, SystemId,
};
use tracing::trace;

use crate::combat::{duel, skirmish};
use crate::constants::{BATTLE_BASE_MS, BATTLE_ROUND_MS, BATTLE_STAGGER_MS, MOVEMENT_WINDOW_MS};
use crate::graph::{reachable_through, LinkGraph};
use crate::rng::SeededRng;
use crate::system::StarSystem;

/// One player's movement intent and the effects that bear on its legality.
#[derive(Clone, Debug)]
pub struct MoverInput {
    pub player: PlayerId,
    pub moves: Vec<MoveOrder>,
    pub wormhole: bool,
    pub wormhole_anchor: Option<SystemId>,
    pub allies: BTreeSet<PlayerId>,
}

#[derive(Clone, Debug)]
pub struct ResolutionInput<'a> {
    pub systems: &'a [StarSystem],
    pub links: &'a LinkGraph,
    /// Processed in the order given; callers pass players in id order.
    pub movers: Vec<MoverInput>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemUpdate {
    pub id: SystemId,
    pub owner: Option<PlayerId>,
    pub fleets: u32,
    pub defense_net_turns: u32,
}

/// Computed but uncommitted outcome of one turn.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionPlan {
    /// One entry per system, in id order.
    pub updates: Vec<SystemUpdate>,
    pub battles: Vec<Battle>,
    /// Moves that survived legality checks, with clamped counts.
    pub executed: Vec<RevealedMove>,
    /// Players whose wormhole anchor was emptied this turn.
    pub cancelled_wormholes: Vec<PlayerId>,
    /// Animation window: movement plus every battle.
    pub window_ms: u64,
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    owner: Option<PlayerId>,
    fleets: u32,
    shield: u32,
}

fn is_legal_move(
    input: &ResolutionInput<'_>,
    mover: &MoverInput,
    order: &MoveOrder,
) -> bool {
    let (Some(from), Some(to)) = (
        input.systems.get(order.from.index()),
        input.systems.get(order.to.index()),
    ) else {
        return false;
    };
    let me = mover.player;

    if order.from == order.to || !from.is_owned_by(me) {
        return false;
    }
    if let Some(owner) = to.owner {
        if owner != me && (mover.allies.contains(&owner) || to.is_shielded()) {
            return false;
        }
    }

    input.links.are_linked(order.from, order.to)
        || mover.wormhole
        || (to.is_owned_by(me)
            && reachable_through(input.links, order.from, order.to, |id| {
                input
                    .systems
                    .get(id.index())
                    .is_some_and(|s| s.is_owned_by(me))
            }))
}

/// Battle duration for the given number of skirmish and head-to-head rounds.
pub fn battle_duration_ms(skirmish_rounds: usize, combat_rounds: usize) -> u64 {
    BATTLE_BASE_MS + BATTLE_ROUND_MS * (skirmish_rounds + combat_rounds) as u64
}

/// Compute the turn's outcome without touching the inputs.
pub fn resolve_turn(input: &ResolutionInput<'_>, rng: &mut SeededRng) -> ResolutionPlan {
    let mut slots: Vec<Slot> = input
        .systems
        .iter()
        .map(|s| Slot {
            owner: s.owner,
            fleets: s.fleets,
            shield: s.defense_net_turns,
        })
        .collect();

    // Departures: sequential consumption per source.
    let mut executed = Vec::new();
    let mut drained: BTreeSet<SystemId> = BTreeSet::new();
    for mover in &input.movers {
        for order in &mover.moves {
            if order.count == 0 || !is_legal_move(input, mover, order) {
                continue;
            }
            let Some(source) = slots.get_mut(order.from.index()) else {
                continue;
            };
            let count = order.count.min(source.fleets);
            if count == 0 {
                continue;
            }
            source.fleets -= count;
            drained.insert(order.from);
            executed.push(RevealedMove {
                player: mover.player,
                from: order.from,
                to: order.to,
                count,
            });
        }
    }

    let mut cancelled_wormholes = Vec::new();
    for &id in &drained {
        let slot = &mut slots[id.index()];
        if slot.fleets > 0 {
            continue;
        }
        let former = slot.owner.take();
        slot.shield = 0;
        if let Some(owner) = former {
            let anchored = input
                .movers
                .iter()
                .any(|m| m.player == owner && m.wormhole && m.wormhole_anchor == Some(id));
            if anchored {
                cancelled_wormholes.push(owner);
            }
        }
    }

    // Arrivals grouped by target, then by player.
    let mut arrivals: BTreeMap<SystemId, BTreeMap<PlayerId, u32>> = BTreeMap::new();
    for mv in &executed {
        *arrivals.entry(mv.to).or_default().entry(mv.player).or_default() += mv.count;
    }

    let mut battles = Vec::new();
    for (target, mut incoming) in arrivals {
        let slot = &mut slots[target.index()];

        if let Some(owner) = slot.owner {
            if let Some(reinforcements) = incoming.remove(&owner) {
                slot.fleets += reinforcements;
            }
        }
        if incoming.is_empty() {
            continue;
        }

        let attackers: Vec<(PlayerId, u32)> = incoming.into_iter().collect();
        let mut participants: Vec<BattleParticipant> = attackers
            .iter()
            .map(|&(p, n)| BattleParticipant {
                player: Some(p),
                role: BattleRole::Attacker,
                starting_fleets: n,
            })
            .collect();

        let (skirmish_rounds, survivor) = if attackers.len() > 1 {
            let outcome = skirmish(&attackers, rng);
            (outcome.rounds, outcome.survivor)
        } else {
            (Vec::new(), attackers.first().copied())
        };

        let defender = slot.owner;
        let Some((attacker, force)) = survivor else {
            // Attackers wiped each other out; the garrison is untouched.
            participants.push(BattleParticipant {
                player: defender,
                role: BattleRole::Defender,
                starting_fleets: slot.fleets,
            });
            battles.push(Battle {
                system: target,
                participants,
                skirmish: skirmish_rounds,
                rounds: Vec::new(),
                attacker: None,
                winner: defender,
                final_owner: defender,
                final_fleets: slot.fleets,
                start_offset_ms: 0,
                duration_ms: 0,
            });
            continue;
        };

        if slot.fleets == 0 && skirmish_rounds.is_empty() {
            // Unguarded: the lone attacker walks in.
            slot.owner = Some(attacker);
            slot.fleets = force;
            slot.shield = 0;
            continue;
        }

        participants.push(BattleParticipant {
            player: defender,
            role: BattleRole::Defender,
            starting_fleets: slot.fleets,
        });

        let fight = duel(force, slot.fleets, rng);
        let winner = if fight.attacker > 0 {
            slot.owner = Some(attacker);
            slot.fleets = fight.attacker;
            slot.shield = 0;
            Some(attacker)
        } else if fight.defender > 0 {
            slot.fleets = fight.defender;
            defender
        } else {
            slot.owner = None;
            slot.fleets = 0;
            slot.shield = 0;
            None
        };

        trace!(
            system = %target,
            attacker = %attacker,
            rounds = fight.rounds.len(),
            "battle resolved"
        );

        battles.push(Battle {
            system: target,
            participants,
            skirmish: skirmish_rounds,
            rounds: fight.rounds,
            attacker: Some(attacker),
            winner,
            final_owner: slot.owner,
            final_fleets: slot.fleets,
            start_offset_ms: 0,
            duration_ms: 0,
        });
    }

    let window_ms = schedule_battles(&mut battles);

    ResolutionPlan {
        updates: input
            .systems
            .iter()
            .zip(&slots)
            .map(|(sys, slot)| SystemUpdate {
                id: sys.id,
                owner: slot.owner,
                fleets: slot.fleets,
                defense_net_turns: slot.shield,
            })
            .collect(),
        battles,
        executed,
        cancelled_wormholes,
        window_ms,
    }
}

/// Assign staggered presentation offsets. Returns the overall window.
fn schedule_battles(battles: &mut [Battle]) -> u64 {
    let mut window = MOVEMENT_WINDOW_MS;
    for (i, battle) in battles.iter_mut().enumerate() {
        battle.start_offset_ms = i as u64 * BATTLE_STAGGER_MS;
        battle.duration_ms = battle_duration_ms(battle.skirmish.len(), battle.rounds.len());
        window = window.max(battle.end_offset_ms());
    }
    window
}

#[cfg(test)]
mod tests {
    use super::*;
    use starfall_protocol::{Hex, Resources};

    fn p(n: u8) -> PlayerId {
        PlayerId(n)
    }

    fn s(n: u32) -> SystemId {
        SystemId(n)
    }

    fn sys(id: u32, owner: Option<u8>, fleets: u32) -> StarSystem {
        StarSystem {
            id: s(id),
            hex: Hex::new(id as i32, 0),
            tier: 0,
            resources: Resources::ZERO,
            owner: owner.map(PlayerId),
            fleets,
            defense_net_turns: 0,
            terraformed: false,
            is_home: false,
        }
    }

    fn mover(player: u8, moves: &[(u32, u32, u32)]) -> MoverInput {
        MoverInput {
            player: p(player),
            moves: moves
                .iter()
                .map(|&(from, to, count)| MoveOrder {
                    from: s(from),
                    to: s(to),
                    count,
                })
                .collect(),
            wormhole: false,
            wormhole_anchor: None,
            allies: BTreeSet::new(),
        }
    }

    fn chain(len: u32) -> LinkGraph {
        let mut g = LinkGraph::new();
        for i in 0..len - 1 {
            g.link(s(i), s(i + 1));
        }
        g
    }

    fn update(plan: &ResolutionPlan, id: u32) -> SystemUpdate {
        plan.updates[id as usize]
    }

    #[test]
    fn uncontested_move_conserves_fleets() {
        let systems = vec![sys(0, Some(0), 10), sys(1, Some(0), 4)];
        let links = chain(2);
        let input = ResolutionInput {
            systems: &systems,
            links: &links,
            movers: vec![mover(0, &[(0, 1, 7)])],
        };
        let plan = resolve_turn(&input, &mut SeededRng::from_seed("move"));

        assert_eq!(update(&plan, 0).fleets, 3);
        assert_eq!(update(&plan, 1).fleets, 11);
        assert!(plan.battles.is_empty());
        assert_eq!(plan.window_ms, MOVEMENT_WINDOW_MS);
    }

    #[test]
    fn moves_from_one_source_consume_sequentially() {
        let systems = vec![sys(0, Some(0), 5), sys(1, Some(0), 0), sys(2, Some(0), 0)];
        let mut links = chain(3);
        links.link(s(0), s(2));
        let input = ResolutionInput {
            systems: &systems,
            links: &links,
            movers: vec![mover(0, &[(0, 1, 4), (0, 2, 4)])],
        };
        let plan = resolve_turn(&input, &mut SeededRng::from_seed("seq"));

        assert_eq!(plan.executed.len(), 2);
        assert_eq!(plan.executed[1].count, 1);
        assert_eq!(update(&plan, 1).fleets, 4);
        assert_eq!(update(&plan, 2).fleets, 1);
        // Emptied source loses its owner.
        assert_eq!(update(&plan, 0).owner, None);
        assert_eq!(update(&plan, 0).fleets, 0);
    }

    #[test]
    fn friendly_transfer_needs_contiguous_territory() {
        // 0(p0) - 1(p0) - 2(p0) - 3(p1) - 4(p0)
        let systems = vec![
            sys(0, Some(0), 6),
            sys(1, Some(0), 1),
            sys(2, Some(0), 1),
            sys(3, Some(1), 1),
            sys(4, Some(0), 1),
        ];
        let links = chain(5);
        let input = ResolutionInput {
            systems: &systems,
            links: &links,
            movers: vec![mover(0, &[(0, 2, 2), (0, 4, 2)])],
        };
        let plan = resolve_turn(&input, &mut SeededRng::from_seed("transfer"));

        assert_eq!(update(&plan, 2).fleets, 3);
        assert_eq!(update(&plan, 4).fleets, 1);
        assert_eq!(update(&plan, 0).fleets, 4);
    }

    #[test]
    fn wormhole_allows_any_to_any() {
        let systems = vec![sys(0, Some(0), 6), sys(1, None, 0), sys(2, None, 0), sys(3, None, 0)];
        let links = chain(4);
        let mut m = mover(0, &[(0, 3, 2)]);
        m.wormhole = true;
        let input = ResolutionInput {
            systems: &systems,
            links: &links,
            movers: vec![m],
        };
        let plan = resolve_turn(&input, &mut SeededRng::from_seed("worm"));

        assert_eq!(update(&plan, 3).owner, Some(p(0)));
        assert_eq!(update(&plan, 3).fleets, 2);
    }

    #[test]
    fn draining_the_anchor_cancels_the_wormhole() {
        let systems = vec![sys(0, Some(0), 3), sys(1, None, 0)];
        let links = chain(2);
        let mut m = mover(0, &[(0, 1, 3)]);
        m.wormhole = true;
        m.wormhole_anchor = Some(s(0));
        let input = ResolutionInput {
            systems: &systems,
            links: &links,
            movers: vec![m],
        };
        let plan = resolve_turn(&input, &mut SeededRng::from_seed("anchor"));

        assert_eq!(plan.cancelled_wormholes, vec![p(0)]);
        assert_eq!(update(&plan, 0).owner, None);
    }

    #[test]
    fn draining_another_source_keeps_the_wormhole() {
        let systems = vec![sys(0, Some(0), 3), sys(1, Some(0), 2), sys(2, None, 0)];
        let links = chain(3);
        let mut m = mover(0, &[(1, 2, 2)]);
        m.wormhole = true;
        m.wormhole_anchor = Some(s(0));
        let input = ResolutionInput {
            systems: &systems,
            links: &links,
            movers: vec![m],
        };
        let plan = resolve_turn(&input, &mut SeededRng::from_seed("elsewhere"));

        assert!(plan.cancelled_wormholes.is_empty());
        assert_eq!(update(&plan, 1).owner, None);
        assert_eq!(update(&plan, 2).owner, Some(p(0)));
    }

    #[test]
    fn shielded_and_allied_targets_cannot_be_entered() {
        let mut systems = vec![sys(0, Some(0), 6), sys(1, Some(1), 2), sys(2, Some(2), 2)];
        systems[1].defense_net_turns = 2;
        let mut links = chain(3);
        links.link(s(0), s(2));
        let mut m = mover(0, &[(0, 1, 3), (0, 2, 3)]);
        m.allies.insert(p(2));
        let input = ResolutionInput {
            systems: &systems,
            links: &links,
            movers: vec![m],
        };
        let plan = resolve_turn(&input, &mut SeededRng::from_seed("blocked"));

        assert!(plan.executed.is_empty());
        assert_eq!(update(&plan, 1).owner, Some(p(1)));
        assert_eq!(update(&plan, 1).defense_net_turns, 2);
        assert_eq!(update(&plan, 2).owner, Some(p(2)));
        assert_eq!(update(&plan, 0).fleets, 6);
    }

    #[test]
    fn unguarded_neutral_is_taken_without_battle() {
        let systems = vec![sys(0, Some(0), 6), sys(1, None, 0)];
        let links = chain(2);
        let input = ResolutionInput {
            systems: &systems,
            links: &links,
            movers: vec![mover(0, &[(0, 1, 4)])],
        };
        let plan = resolve_turn(&input, &mut SeededRng::from_seed("free"));

        assert!(plan.battles.is_empty());
        assert_eq!(update(&plan, 1).owner, Some(p(0)));
        assert_eq!(update(&plan, 1).fleets, 4);
    }

    #[test]
    fn attack_produces_a_decisive_battle() {
        for seed in 0..30 {
            let systems = vec![sys(0, Some(0), 10), sys(1, Some(1), 10)];
            let links = chain(2);
            let input = ResolutionInput {
                systems: &systems,
                links: &links,
                movers: vec![mover(0, &[(0, 1, 10)])],
            };
            let plan = resolve_turn(&input, &mut SeededRng::from_seed(&format!("atk-{seed}")));

            assert_eq!(plan.battles.len(), 1);
            let battle = &plan.battles[0];
            let last = battle.rounds.last().copied().expect("rounds");
            assert!(last.attacker == 0 || last.defender == 0);
            assert_eq!(battle.final_owner, update(&plan, 1).owner);
            assert_eq!(battle.final_fleets, update(&plan, 1).fleets);
            assert_eq!(
                battle.duration_ms,
                BATTLE_BASE_MS + BATTLE_ROUND_MS * battle.rounds.len() as u64
            );
            assert_eq!(plan.window_ms, MOVEMENT_WINDOW_MS.max(battle.end_offset_ms()));
            // The attacker's home was emptied.
            assert_eq!(update(&plan, 0).owner, None);
        }
    }

    #[test]
    fn three_attackers_skirmish_before_combat() {
        //    1(p0)
        //      |
        // 2(p1)-0(p3)-3(p2)
        let systems = vec![
            sys(0, Some(3), 4),
            sys(1, Some(0), 9),
            sys(2, Some(1), 9),
            sys(3, Some(2), 9),
        ];
        let mut links = LinkGraph::new();
        for i in 1..=3 {
            links.link(s(0), s(i));
        }
        let input = ResolutionInput {
            systems: &systems,
            links: &links,
            movers: vec![
                mover(0, &[(1, 0, 8)]),
                mover(1, &[(2, 0, 8)]),
                mover(2, &[(3, 0, 8)]),
            ],
        };
        let plan = resolve_turn(&input, &mut SeededRng::from_seed("three"));

        let battle = &plan.battles[0];
        assert_eq!(battle.participants.len(), 4);
        assert!(!battle.skirmish.is_empty());
        let last = battle.skirmish.last().expect("skirmish");
        assert!(last.fleets.iter().filter(|&&(_, n)| n > 0).count() <= 1);
        let survivor = last.fleets.iter().find(|&&(_, n)| n > 0).map(|&(p, _)| p);
        assert_eq!(battle.attacker, survivor);
        // Head-to-head happens only after the skirmish produced a survivor.
        assert_eq!(battle.rounds.is_empty(), survivor.is_none());
    }

    #[test]
    fn resolution_is_deterministic_and_pure() {
        let systems = vec![sys(0, Some(0), 12), sys(1, Some(1), 12), sys(2, None, 3)];
        let mut links = chain(3);
        links.link(s(0), s(2));
        let input = ResolutionInput {
            systems: &systems,
            links: &links,
            movers: vec![mover(0, &[(0, 1, 6), (0, 2, 6)]), mover(1, &[(1, 2, 12)])],
        };
        let a = resolve_turn(&input, &mut SeededRng::for_turn("det", 3));
        let b = resolve_turn(&input, &mut SeededRng::for_turn("det", 3));

        assert_eq!(a, b);
        assert_eq!(systems[0].fleets, 12);
    }
}
