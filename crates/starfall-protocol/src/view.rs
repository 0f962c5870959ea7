//! Viewer-facing room state.
//!
//! A `PublicRoomState` is always built for one viewer (a player or a spectator) and contains only
//! what that viewer may see.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    Battle, Hex, Orders, Phase, PlayerId, PowerupKind, PowerupState, Resources, RoomConfig, RoomId,
    SystemId,
};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublicRoomState {
    pub id: RoomId,
    /// `None` for spectators.
    pub viewer: Option<PlayerId>,
    pub phase: Phase,
    pub turn: u32,
    pub config: RoomConfig,
    pub created_at_ms: u64,
    #[serde(default)]
    pub turn_ends_at_ms: Option<u64>,
    pub systems: Vec<SystemView>,
    pub links: Vec<(SystemId, SystemId)>,
    pub players: Vec<PlayerView>,
    /// Populated only while resolving.
    #[serde(default)]
    pub revealed_moves: Vec<RevealedMove>,
    #[serde(default)]
    pub battles: Vec<Battle>,
    #[serde(default)]
    pub resolution_started_at_ms: Option<u64>,
    #[serde(default)]
    pub resolution_ends_at_ms: Option<u64>,
    #[serde(default)]
    pub winner: Option<PlayerId>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemView {
    pub id: SystemId,
    pub hex: Hex,
    pub tier: u8,
    pub resources: Resources,
    pub bonus: u32,
    pub owner: Option<PlayerId>,
    pub fleets: u32,
    pub defense_net_turns: u32,
    pub terraformed: bool,
    pub is_home: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: PlayerId,
    pub name: String,
    pub color: String,
    pub home: Option<SystemId>,
    pub connected: bool,
    pub locked: bool,
    pub systems_owned: u32,
    pub fleets_total: u32,
    pub wormhole_turns: u32,
    pub alliances: Vec<(PlayerId, u32)>,
    /// Economy details; only present for the viewer's own player.
    #[serde(default)]
    pub economy: Option<PlayerEconomy>,
    /// The viewer's own orders, or everyone's once revealed.
    #[serde(default)]
    pub orders: Option<Orders>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerEconomy {
    pub income: Resources,
    pub research: Resources,
    pub fleets_to_place: u32,
    pub powerups: BTreeMap<PowerupKind, PowerupState>,
}

/// A move order made public at the start of resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevealedMove {
    pub player: PlayerId,
    pub from: SystemId,
    pub to: SystemId,
    pub count: u32,
}

/// Lobby listing entry for open rooms.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub players: u8,
    pub max_players: u8,
    pub map_size: crate::MapSize,
    pub max_turns: u32,
    pub turn_seconds: u32,
}
