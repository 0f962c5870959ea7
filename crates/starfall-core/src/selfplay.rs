//! Headless self-play.
//!
//! Runs bot-vs-bot rooms with the same state machine servers use, with a virtual clock. Handy for
//! balance checks and for replay determinism tests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use starfall_protocol::{
    MapSize, MoveOrder, Orders, Phase, PlayerId, PowerupKind, PowerupOrder, PublicRoomState,
    RoomConfig, RoomId, SystemId,
};
use tracing::debug;

use crate::constants::powerup_cost;
use crate::error::GameError;
use crate::room::Room;

/// Configuration for a self-play run.
#[derive(Clone, Debug)]
pub struct SelfPlayConfig {
    /// Number of bot players (2-8).
    pub players: u8,
    pub map_size: MapSize,
    /// Turns before the room completes on territory.
    pub max_turns: u32,
    /// Seed for galaxy and every turn's combat.
    pub seed: String,
}

impl Default for SelfPlayConfig {
    fn default() -> Self {
        Self {
            players: 2,
            map_size: MapSize::Small,
            max_turns: 20,
            seed: "selfplay".to_string(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelfPlayResult {
    pub winner: Option<PlayerId>,
    pub turns_played: u32,
    pub total_battles: u32,
    /// Systems owned per player at the end.
    pub territory: BTreeMap<PlayerId, u32>,
    /// Spectator view of the final room.
    pub final_state: PublicRoomState,
}

/// Planning-phase length used for the virtual clock.
const VIRTUAL_TURN_MS: u64 = 1_000;

pub fn run_selfplay(config: &SelfPlayConfig) -> Result<SelfPlayResult, GameError> {
    let room_config = RoomConfig {
        max_players: config.players,
        map_size: config.map_size,
        max_turns: config.max_turns,
        turn_seconds: 1,
        is_private: true,
    };
    let mut room = Room::new(RoomId::new("SELFPLAY"), room_config, config.seed.clone(), 0)?;
    for i in 0..config.players {
        room.add_player(&format!("Bot {}", i + 1), None)?;
    }

    let mut now = 0;
    room.start(now)?;

    let mut total_battles = 0;
    while room.phase() != Phase::Complete {
        let ids: Vec<PlayerId> = room.players().map(|p| p.id).collect();
        for id in ids {
            let orders = plan_orders(&room, id);
            room.submit_orders(id, orders)?;
            room.lock_in(id)?;
        }

        room.begin_resolution(now);
        let resolution = room.resolution();
        total_battles += resolution.map_or(0, |r| r.battles().len() as u32);
        now = resolution.map_or(now, |r| r.ends_at_ms);

        room.finalize_resolution(now)?;
        now += VIRTUAL_TURN_MS;
        debug!(turn = room.turn(), "selfplay turn done");
    }

    let territory = room
        .players()
        .map(|p| (p.id, room.owned_systems(p.id).len() as u32))
        .collect();

    Ok(SelfPlayResult {
        winner: room.winner(),
        turns_played: room.turn(),
        total_battles,
        territory,
        final_state: room.view(None),
    })
}

/// Greedy bot: stack production on the busiest frontier system, push into the weakest
/// neighbouring target it can outnumber, shield a threatened home when affordable.
pub fn plan_orders(room: &Room, me: PlayerId) -> Orders {
    let mut orders = Orders::default();
    let Some(player) = room.player(me) else {
        return orders;
    };
    let systems = room.systems();
    let links = room.links();

    let hostile = |id: SystemId| {
        systems.get(id.index()).is_some_and(|s| {
            s.owner != Some(me)
                && !s.is_shielded()
                && s.owner.map_or(true, |o| !player.is_allied_with(o))
        })
    };

    let owned = room.owned_systems(me);
    let frontier = owned
        .iter()
        .copied()
        .filter(|&id| links.neighbors(id).any(hostile))
        .max_by_key(|id| (systems[id.index()].fleets, std::cmp::Reverse(*id)));

    let mut garrison: BTreeMap<SystemId, u32> =
        owned.iter().map(|&id| (id, systems[id.index()].fleets)).collect();
    if let Some(stack) = frontier.or(player.home).filter(|id| garrison.contains_key(id)) {
        orders.placements.insert(stack, player.fleets_to_place);
        *garrison.entry(stack).or_default() += player.fleets_to_place;
    }

    for (&from, &fleets) in &garrison {
        if fleets < 2 {
            continue;
        }
        let target = links
            .neighbors(from)
            .filter(|&n| hostile(n))
            .min_by_key(|n| (systems[n.index()].fleets, *n));
        if let Some(to) = target {
            if fleets - 1 > systems[to.index()].fleets + 1 {
                orders.moves.push(MoveOrder {
                    from,
                    to,
                    count: fleets - 1,
                });
            }
        }
    }

    if let Some(home) = player.home {
        let threatened = links.neighbors(home).any(|n| {
            systems
                .get(n.index())
                .is_some_and(|s| s.owner.is_some_and(|o| o != me))
        });
        let home_held = garrison.contains_key(&home);
        if threatened
            && home_held
            && player.research.covers(&powerup_cost(PowerupKind::DefenseNet))
        {
            orders.powerups.push(PowerupOrder::DefenseNet { target: home });
        }
    }

    orders
}
