//! Session-level messages between a transport and the room store.

use serde::{Deserialize, Serialize};
use starfall_protocol::wire::{self, WireError};
use starfall_protocol::{PlayerId, PublicRoomState, RoomConfig, RoomId, RoomSummary};

/// Client-to-server messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Create a room; missing fields use the server defaults
    CreateRoom {
        #[serde(default)]
        config: Option<RoomConfig>,
        #[serde(default)]
        seed: Option<String>,
    },
    /// List public rooms that can still be joined
    ListRooms,
    Join {
        room: RoomId,
        name: String,
        #[serde(default)]
        color: Option<String>,
    },
    Spectate { room: RoomId },
    /// Rebind a dropped session to its seat
    Reconnect { room: RoomId, token: String },
    StartRoom,
    /// Untrusted order payload, parsed leniently
    SubmitOrders { orders: serde_json::Value },
    LockIn,
    SetAlliance { target: PlayerId },
    Leave,
}

/// Server-to-client messages
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    RoomCreated { room: RoomId },
    RoomList { rooms: Vec<RoomSummary> },
    Joined {
        room: RoomId,
        player: PlayerId,
        reconnect_token: String,
    },
    Spectating { room: RoomId },
    /// Redacted state for the receiving session
    RoomState { state: Box<PublicRoomState> },
    /// Request acknowledged with nothing else to report
    Ok,
    Rejected { reason: String },
}

impl ServerMessage {
    pub fn rejected(reason: impl std::fmt::Display) -> Self {
        ServerMessage::Rejected {
            reason: reason.to_string(),
        }
    }
}

/// Serialize a client message for network transmission
pub fn serialize_client_message(msg: &ClientMessage) -> Result<Vec<u8>, WireError> {
    wire::to_msgpack(msg)
}

/// Deserialize a client message from network data
pub fn deserialize_client_message(data: &[u8]) -> Result<ClientMessage, WireError> {
    wire::from_msgpack(data)
}

/// Serialize a server message for network transmission
pub fn serialize_server_message(msg: &ServerMessage) -> Result<Vec<u8>, WireError> {
    wire::to_msgpack(msg)
}

/// Deserialize a server message from network data
pub fn deserialize_server_message(data: &[u8]) -> Result<ServerMessage, WireError> {
    wire::from_msgpack(data)
}
