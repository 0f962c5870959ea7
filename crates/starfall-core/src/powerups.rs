//! Powerup effects, applied before movement.
//!
//! Support effects (terraform, defense net, wormhole) land before attack effects (stellar bomb),
//! so a same-turn shield blocks a bomb and a bomb never undoes a same-turn purchase. Illegal or
//! unaffordable orders are silently skipped; costs come out of research only on success.

use std::collections::BTreeMap;

use starfall_protocol::{PlayerId, PowerupKind, PowerupOrder, SystemId};
use tracing::debug;

use crate::constants::{powerup_cost, DEFENSE_NET_TURNS, WORMHOLE_TURNS};
use crate::graph::LinkGraph;
use crate::player::Player;
use crate::rng::SeededRng;
use crate::system::{roll_resources, StarSystem};

/// Application order of powerup kinds within a turn.
pub const POWERUP_PHASES: [PowerupKind; 4] = [
    PowerupKind::Terraform,
    PowerupKind::DefenseNet,
    PowerupKind::Wormhole,
    PowerupKind::StellarBomb,
];

/// Terraform only upgrades systems at or below this tier.
const TERRAFORM_MAX_TIER: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AppliedPowerup {
    pub player: PlayerId,
    pub order: PowerupOrder,
}

/// Apply every player's powerup orders in phase order. Returns what actually landed.
pub fn apply_powerups(
    systems: &mut [StarSystem],
    links: &LinkGraph,
    players: &mut BTreeMap<PlayerId, Player>,
    turn: u32,
    rng: &mut SeededRng,
) -> Vec<AppliedPowerup> {
    let mut applied = Vec::new();
    let ids: Vec<PlayerId> = players.keys().copied().collect();

    for kind in POWERUP_PHASES {
        for &pid in &ids {
            let orders: Vec<PowerupOrder> = match players.get(&pid) {
                Some(p) => p.orders.powerups.iter().copied().filter(|o| o.kind() == kind).collect(),
                None => continue,
            };

            for order in orders {
                let legal = {
                    let Some(player) = players.get(&pid) else { break };
                    is_legal(&order, player, systems, links, players)
                };
                if !legal {
                    debug!(player = %pid, ?order, "powerup rejected");
                    continue;
                }

                let Some(player) = players.get_mut(&pid) else { break };
                if !player.research.try_spend(&powerup_cost(kind)) {
                    debug!(player = %pid, ?order, "powerup unaffordable");
                    continue;
                }
                player.record_powerup(kind, turn);
                apply_effect(&order, player, systems, rng);
                applied.push(AppliedPowerup { player: pid, order });
            }
        }
    }

    applied
}

fn system(systems: &[StarSystem], id: SystemId) -> Option<&StarSystem> {
    systems.get(id.index())
}

fn is_legal(
    order: &PowerupOrder,
    player: &Player,
    systems: &[StarSystem],
    links: &LinkGraph,
    players: &BTreeMap<PlayerId, Player>,
) -> bool {
    let me = player.id;
    match *order {
        PowerupOrder::Terraform { target } => system(systems, target).is_some_and(|s| {
            s.is_owned_by(me) && !s.terraformed && s.tier <= TERRAFORM_MAX_TIER
        }),
        PowerupOrder::DefenseNet { target } => {
            system(systems, target).is_some_and(|s| s.is_owned_by(me))
        }
        PowerupOrder::Wormhole { from, to } => {
            system(systems, from).is_some_and(|s| s.is_owned_by(me))
                && system(systems, to).is_some()
        }
        PowerupOrder::StellarBomb { target } => {
            let Some(sys) = system(systems, target) else {
                return false;
            };
            if sys.is_owned_by(me) || sys.is_shielded() {
                return false;
            }
            if let Some(owner) = sys.owner {
                let allied = player.is_allied_with(owner)
                    || players.get(&owner).is_some_and(|o| o.is_allied_with(me));
                if allied {
                    return false;
                }
            }
            player.has_wormhole()
                || links
                    .neighbors(target)
                    .any(|n| system(systems, n).is_some_and(|s| s.is_owned_by(me)))
        }
    }
}

fn apply_effect(
    order: &PowerupOrder,
    player: &mut Player,
    systems: &mut [StarSystem],
    rng: &mut SeededRng,
) {
    match *order {
        PowerupOrder::Terraform { target } => {
            if let Some(sys) = systems.get_mut(target.index()) {
                sys.tier += 1;
                sys.resources = roll_resources(sys.tier, rng).max(sys.resources);
                sys.terraformed = true;
            }
        }
        PowerupOrder::DefenseNet { target } => {
            if let Some(sys) = systems.get_mut(target.index()) {
                sys.defense_net_turns = sys.defense_net_turns.max(DEFENSE_NET_TURNS);
            }
        }
        PowerupOrder::Wormhole { from, .. } => {
            player.wormhole_turns = WORMHOLE_TURNS;
            player.wormhole_anchor = Some(from);
        }
        PowerupOrder::StellarBomb { target } => {
            if let Some(sys) = systems.get_mut(target.index()) {
                sys.fleets /= 2;
            }
        }
    }
}
