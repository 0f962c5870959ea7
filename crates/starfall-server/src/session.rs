//! Client session bindings and generated codes.

use std::collections::HashMap;

use rand::Rng;
use starfall_protocol::{ClientId, PlayerId, RoomId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionRole {
    Player(PlayerId),
    Spectator,
}

impl SessionRole {
    /// Viewer id used for redaction.
    pub fn viewer(self) -> Option<PlayerId> {
        match self {
            SessionRole::Player(id) => Some(id),
            SessionRole::Spectator => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub room: RoomId,
    pub role: SessionRole,
}

/// Which room (and seat) each connected client is bound to. A client is in at most one room.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<ClientId, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, client: ClientId, room: RoomId, role: SessionRole) {
        self.sessions.insert(client, Session { room, role });
    }

    pub fn unbind(&mut self, client: ClientId) -> Option<Session> {
        self.sessions.remove(&client)
    }

    pub fn get(&self, client: ClientId) -> Option<&Session> {
        self.sessions.get(&client)
    }

    /// Sessions watching `room`, sorted by client id.
    pub fn sessions_in(&self, room: &RoomId) -> Vec<(ClientId, SessionRole)> {
        let mut found: Vec<_> = self
            .sessions
            .iter()
            .filter(|(_, s)| &s.room == room)
            .map(|(&client, s)| (client, s.role))
            .collect();
        found.sort_by_key(|&(client, _)| client);
        found
    }

    /// Unbind whichever clients hold this seat, returning them.
    pub fn release_seat(&mut self, room: &RoomId, player: PlayerId) -> Vec<ClientId> {
        let holders: Vec<ClientId> = self
            .sessions
            .iter()
            .filter(|(_, s)| &s.room == room && s.role == SessionRole::Player(player))
            .map(|(&c, _)| c)
            .collect();
        for client in &holders {
            self.sessions.remove(client);
        }
        holders
    }

    pub fn spectator_count(&self, room: &RoomId) -> usize {
        self.sessions
            .values()
            .filter(|s| &s.room == room && s.role == SessionRole::Spectator)
            .count()
    }

    /// Drop every binding for `room`, returning the affected clients.
    pub fn remove_room(&mut self, room: &RoomId) -> Vec<ClientId> {
        let clients: Vec<ClientId> = self
            .sessions
            .iter()
            .filter(|(_, s)| &s.room == room)
            .map(|(&c, _)| c)
            .collect();
        for client in &clients {
            self.sessions.remove(client);
        }
        clients
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Generate a reconnection token
pub fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..36);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'a' + idx - 10) as char
            }
        })
        .collect()
}

/// Shareable room code: uppercase letters and digits.
pub fn generate_room_code(len: usize) -> RoomId {
    let mut rng = rand::thread_rng();
    let code: String = (0..len.max(1))
        .map(|_| {
            let idx = rng.gen_range(0..36u8);
            if idx < 10 {
                (b'0' + idx) as char
            } else {
                (b'A' + idx - 10) as char
            }
        })
        .collect();
    RoomId(code)
}

/// Seed for rooms created without one.
pub fn generate_seed() -> String {
    format!("{:016x}", rand::thread_rng().gen::<u64>())
}
