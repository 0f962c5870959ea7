//! Room registry, session routing and timer dispatch.
//!
//! Lock order is registry, then room, then sessions, then scheduler. Nothing takes a room lock
//! while holding the session table or the scheduler.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use starfall_core::{GameError, Room};
use starfall_protocol::{
    ClientId, Orders, Phase, PlayerId, PublicRoomState, RoomConfig, RoomId, RoomSummary,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::scheduler::{Scheduler, TimerEntry, TimerKind};
use crate::session::{generate_room_code, generate_seed, generate_token, SessionRole, SessionTable};

/// Where per-client messages go. The transport decides what a `ClientId` means.
pub trait Outbox: Send + Sync {
    fn send(&self, client: ClientId, message: ServerMessage);
}

/// Discards everything.
pub struct NullOutbox;

impl Outbox for NullOutbox {
    fn send(&self, _client: ClientId, _message: ServerMessage) {}
}

/// Collects messages in memory.
#[derive(Default)]
pub struct MemoryOutbox {
    sent: Mutex<Vec<(ClientId, ServerMessage)>>,
}

impl MemoryOutbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<(ClientId, ServerMessage)> {
        std::mem::take(&mut *lock(&self.sent))
    }
}

impl Outbox for MemoryOutbox {
    fn send(&self, client: ClientId, message: ServerMessage) {
        lock(&self.sent).push((client, message));
    }
}

impl<T: Outbox + ?Sized> Outbox for Arc<T> {
    fn send(&self, client: ClientId, message: ServerMessage) {
        (**self).send(client, message);
    }
}

/// Forwards messages to an async consumer.
pub struct ChannelOutbox {
    tx: mpsc::UnboundedSender<(ClientId, ServerMessage)>,
}

impl ChannelOutbox {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(ClientId, ServerMessage)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Outbox for ChannelOutbox {
    fn send(&self, client: ClientId, message: ServerMessage) {
        if self.tx.send((client, message)).is_err() {
            debug!("Outbox receiver dropped; message for client {} discarded", client);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Game(#[from] GameError),
    #[error("Unknown room {0}")]
    UnknownRoom(RoomId),
    #[error("Client is not in a room")]
    NotInRoom,
    #[error("Client is already in room {0}")]
    AlreadyInRoom(RoomId),
    #[error("Server is at its room limit")]
    TooManyRooms,
    #[error("Spectators cannot do that")]
    NotAPlayer,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type RoomHandle = Arc<Mutex<Room>>;

pub struct RoomStore {
    config: ServerConfig,
    rooms: RwLock<HashMap<RoomId, RoomHandle>>,
    sessions: Mutex<SessionTable>,
    scheduler: Mutex<Scheduler>,
    outbox: Box<dyn Outbox>,
}

impl RoomStore {
    pub fn new(config: ServerConfig, outbox: Box<dyn Outbox>) -> Self {
        Self {
            config,
            rooms: RwLock::new(HashMap::new()),
            sessions: Mutex::new(SessionTable::new()),
            scheduler: Mutex::new(Scheduler::new()),
            outbox,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn registry(&self) -> RwLockReadGuard<'_, HashMap<RoomId, RoomHandle>> {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn registry_mut(&self) -> RwLockWriteGuard<'_, HashMap<RoomId, RoomHandle>> {
        self.rooms.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn sessions(&self) -> MutexGuard<'_, SessionTable> {
        lock(&self.sessions)
    }

    fn scheduler(&self) -> MutexGuard<'_, Scheduler> {
        lock(&self.scheduler)
    }

    fn room(&self, id: &RoomId) -> Result<RoomHandle, StoreError> {
        self.registry()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownRoom(id.clone()))
    }

    /// The room and seat bound to a player session.
    fn seat(&self, client: ClientId) -> Result<(RoomHandle, PlayerId), StoreError> {
        let session = self.sessions().get(client).cloned().ok_or(StoreError::NotInRoom)?;
        let SessionRole::Player(player) = session.role else {
            return Err(StoreError::NotAPlayer);
        };
        Ok((self.room(&session.room)?, player))
    }

    fn ensure_unbound(&self, client: ClientId) -> Result<(), StoreError> {
        match self.sessions().get(client) {
            Some(session) => Err(StoreError::AlreadyInRoom(session.room.clone())),
            None => Ok(()),
        }
    }

    pub fn room_count(&self) -> usize {
        self.registry().len()
    }

    /// Timers currently queued for a room.
    pub fn pending_timers(&self, room: &RoomId) -> usize {
        self.scheduler().pending_for(room)
    }

    /// Run `f` against a room under its lock.
    pub fn with_room<R>(&self, id: &RoomId, f: impl FnOnce(&mut Room) -> R) -> Result<R, StoreError> {
        let handle = self.room(id)?;
        let mut room = lock(&handle);
        Ok(f(&mut room))
    }

    // ---- Lobby ----

    pub fn create_room(
        &self,
        config: Option<RoomConfig>,
        seed: Option<String>,
        now_ms: u64,
    ) -> Result<RoomId, StoreError> {
        let config = config.unwrap_or_else(|| self.config.default_room.clone());
        let seed = seed.unwrap_or_else(generate_seed);

        let mut rooms = self.registry_mut();
        if rooms.len() >= self.config.max_rooms {
            return Err(StoreError::TooManyRooms);
        }
        let id = loop {
            let code = generate_room_code(self.config.room_code_len);
            if !rooms.contains_key(&code) {
                break code;
            }
        };
        let room = Room::new(id.clone(), config, seed, now_ms)?;
        info!(
            "Room {} created: {:?} map, up to {} players",
            id,
            room.config().map_size,
            room.config().max_players
        );
        rooms.insert(id.clone(), Arc::new(Mutex::new(room)));
        Ok(id)
    }

    /// Public rooms that have not started and still have a free seat.
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let handles: Vec<RoomHandle> = self.registry().values().cloned().collect();
        let mut rooms: Vec<RoomSummary> = handles
            .iter()
            .filter_map(|handle| {
                let room = lock(handle);
                let config = room.config();
                let open = !config.is_private && !room.is_started() && !room.is_full();
                open.then(|| RoomSummary {
                    id: room.id().clone(),
                    players: room.player_count() as u8,
                    max_players: config.max_players,
                    map_size: config.map_size,
                    max_turns: config.max_turns,
                    turn_seconds: config.turn_seconds,
                })
            })
            .collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    /// Seat a client in a room. Returns the seat and its reconnect token.
    pub fn join(
        &self,
        client: ClientId,
        room_id: &RoomId,
        name: &str,
        color: Option<&str>,
    ) -> Result<(PlayerId, String), StoreError> {
        self.ensure_unbound(client)?;
        let handle = self.room(room_id)?;
        let mut room = lock(&handle);

        let player = room.add_player(name, color)?;
        let token = generate_token();
        room.set_reconnect_token(player, token.clone())?;
        self.sessions()
            .bind(client, room_id.clone(), SessionRole::Player(player));

        self.publish(&room);
        Ok((player, token))
    }

    pub fn spectate(&self, client: ClientId, room_id: &RoomId) -> Result<(), StoreError> {
        self.ensure_unbound(client)?;
        let handle = self.room(room_id)?;
        let room = lock(&handle);
        self.sessions()
            .bind(client, room_id.clone(), SessionRole::Spectator);
        debug!("Client {} spectating room {}", client, room_id);
        self.publish(&room);
        Ok(())
    }

    /// Rebind a client to the seat owning `token`. Any stale session on that seat is dropped.
    ///
    /// The client must not be bound anywhere; a seated client leaves (or disconnects) first.
    pub fn reconnect(
        &self,
        client: ClientId,
        room_id: &RoomId,
        token: &str,
    ) -> Result<PlayerId, StoreError> {
        self.ensure_unbound(client)?;
        let handle = self.room(room_id)?;
        let mut room = lock(&handle);
        let player = room.reconnect(token)?;
        {
            let mut sessions = self.sessions();
            sessions.release_seat(room_id, player);
            sessions.bind(client, room_id.clone(), SessionRole::Player(player));
        }
        info!("Player {} reconnected to room {}", player, room_id);
        self.publish(&room);
        Ok(player)
    }

    // ---- Player actions ----

    pub fn start_room(&self, client: ClientId, now_ms: u64) -> Result<(), StoreError> {
        let (handle, _) = self.seat(client)?;
        let mut room = lock(&handle);
        room.start(now_ms)?;
        self.schedule_expire(&room);
        self.publish(&room);
        Ok(())
    }

    /// Replace the client's orders with a leniently parsed payload.
    pub fn submit_orders(&self, client: ClientId, orders: &serde_json::Value) -> Result<(), StoreError> {
        let (handle, player) = self.seat(client)?;
        let mut room = lock(&handle);
        room.submit_orders(player, Orders::from_json(orders))?;
        self.publish(&room);
        Ok(())
    }

    /// Lock the client's orders. Returns true when this call began resolution.
    ///
    /// The all-locked check and `begin_resolution` share one room lock, so exactly one caller
    /// wins when lock-ins race.
    pub fn lock_in(&self, client: ClientId, now_ms: u64) -> Result<bool, StoreError> {
        let (handle, player) = self.seat(client)?;
        let mut room = lock(&handle);
        let all_locked = room.lock_in(player)?;
        let began = all_locked && room.begin_resolution(now_ms);
        if began {
            info!("Room {} resolving turn {} (all locked)", room.id(), room.turn());
            self.schedule_finalize(&room, now_ms);
        }
        self.publish(&room);
        Ok(began)
    }

    pub fn set_alliance(&self, client: ClientId, target: PlayerId) -> Result<(), StoreError> {
        let (handle, player) = self.seat(client)?;
        let mut room = lock(&handle);
        room.set_alliance(player, target)?;
        self.publish(&room);
        Ok(())
    }

    /// Drop a client's session. Unstarted rooms release the seat, started rooms keep it for
    /// reconnection. A room with nobody left connected is torn down.
    pub fn disconnect(&self, client: ClientId) {
        let Some(session) = self.sessions().unbind(client) else {
            return;
        };
        let Ok(handle) = self.room(&session.room) else {
            return;
        };

        let empty = {
            let mut room = lock(&handle);
            if let SessionRole::Player(player) = session.role {
                let result = if room.is_started() {
                    room.set_connected(player, false)
                } else {
                    room.remove_player(player)
                };
                if let Err(e) = result {
                    warn!("Disconnect of {} in room {}: {}", player, session.room, e);
                }
                info!("Player {} left room {}", player, session.room);
            }
            let empty = self.is_abandoned(&room);
            if !empty {
                self.publish(&room);
            }
            empty
        };

        if empty {
            self.teardown(&session.room);
        }
    }

    fn is_abandoned(&self, room: &Room) -> bool {
        room.connected_count() == 0 && self.sessions().spectator_count(room.id()) == 0
    }

    /// Remove an abandoned room along with its timers and sessions.
    fn teardown(&self, id: &RoomId) {
        let mut rooms = self.registry_mut();
        let Some(handle) = rooms.get(id).cloned() else {
            return;
        };
        // Someone may have joined since the disconnect released the room lock.
        if !self.is_abandoned(&lock(&handle)) {
            return;
        }
        rooms.remove(id);
        self.sessions().remove_room(id);
        self.scheduler().cancel_room(id);
        info!("Room {} torn down", id);
    }

    pub fn view(&self, room_id: &RoomId, viewer: Option<PlayerId>) -> Result<PublicRoomState, StoreError> {
        let handle = self.room(room_id)?;
        let room = lock(&handle);
        Ok(room.view(viewer))
    }

    // ---- Timers ----

    /// Force the planning deadline now. Returns whether resolution began.
    pub fn force_expire(&self, room_id: &RoomId, now_ms: u64) -> Result<bool, StoreError> {
        let handle = self.room(room_id)?;
        let mut room = lock(&handle);
        Ok(self.expire_locked(&mut room, now_ms))
    }

    /// Commit a room's pending resolution. On failure the room reopens planning.
    pub fn finalize(&self, room_id: &RoomId, now_ms: u64) -> Result<bool, StoreError> {
        let handle = self.room(room_id)?;
        let mut room = lock(&handle);
        self.finalize_locked(&mut room, now_ms)
    }

    /// Fire every due timer. Each entry runs in isolation: a failure or panic in one room
    /// recovers that room and never stops the others. Returns the number of entries fired.
    pub fn tick(&self, now_ms: u64) -> usize {
        let due = self.scheduler().pop_due(now_ms);
        let fired = due.len();
        for entry in due {
            match panic::catch_unwind(AssertUnwindSafe(|| self.fire(&entry, now_ms))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{:?} timer for room {} failed: {}", entry.kind, entry.room, e),
                Err(_) => {
                    error!(
                        "{:?} timer for room {} panicked on turn {}; recovering",
                        entry.kind, entry.room, entry.turn
                    );
                    self.recover(&entry.room, now_ms);
                }
            }
        }
        fired
    }

    fn fire(&self, entry: &TimerEntry, now_ms: u64) -> Result<(), StoreError> {
        let handle = match self.room(&entry.room) {
            Ok(handle) => handle,
            // Torn down after the entry was queued.
            Err(_) => return Ok(()),
        };
        let mut room = lock(&handle);
        if room.turn() != entry.turn {
            debug!(room = %entry.room, turn = entry.turn, "stale timer");
            return Ok(());
        }

        match entry.kind {
            TimerKind::Expire => {
                if room.is_expired(now_ms) {
                    self.expire_locked(&mut room, now_ms);
                }
            }
            TimerKind::Finalize => {
                if room.phase() == Phase::Resolving {
                    self.finalize_locked(&mut room, now_ms)?;
                }
            }
        }
        Ok(())
    }

    fn recover(&self, room_id: &RoomId, now_ms: u64) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let Ok(handle) = self.room(room_id) else {
                return;
            };
            let mut room = lock(&handle);
            room.recover_to_planning(now_ms);
            self.schedule_expire(&room);
            self.publish(&room);
        }));
        if outcome.is_err() {
            error!("Recovery of room {} panicked", room_id);
        }
    }

    fn expire_locked(&self, room: &mut Room, now_ms: u64) -> bool {
        if !room.expire(now_ms) {
            return false;
        }
        info!("Room {} resolving turn {} (deadline)", room.id(), room.turn());
        self.schedule_finalize(room, now_ms);
        self.publish(room);
        true
    }

    fn finalize_locked(&self, room: &mut Room, now_ms: u64) -> Result<bool, StoreError> {
        match room.finalize_resolution(now_ms) {
            Ok(finalized) => {
                if finalized {
                    self.schedule_expire(room);
                    self.publish(room);
                }
                Ok(finalized)
            }
            Err(e) => {
                error!("Finalize failed for room {} on turn {}: {}", room.id(), room.turn(), e);
                room.recover_to_planning(now_ms);
                self.schedule_expire(room);
                self.publish(room);
                Err(e.into())
            }
        }
    }

    fn schedule_expire(&self, room: &Room) {
        if room.phase() != Phase::Planning {
            return;
        }
        if let Some(deadline) = room.turn_ends_at_ms() {
            self.scheduler()
                .schedule(deadline, room.id().clone(), TimerKind::Expire, room.turn());
        }
    }

    /// Finalize no sooner than the configured delay, and never before the battle window ends.
    fn schedule_finalize(&self, room: &Room, now_ms: u64) {
        let window = room
            .resolution()
            .map_or(0, |r| r.ends_at_ms.saturating_sub(r.started_at_ms));
        let delay = self.config.finalize_delay_ms.max(window);
        self.scheduler()
            .schedule(now_ms + delay, room.id().clone(), TimerKind::Finalize, room.turn());
    }

    /// Send every session in the room its own redacted view.
    fn publish(&self, room: &Room) {
        let viewers = self.sessions().sessions_in(room.id());
        for (client, role) in viewers {
            let state = Box::new(room.view(role.viewer()));
            self.outbox.send(client, ServerMessage::RoomState { state });
        }
    }

    // ---- Dispatch ----

    /// Apply one client message and build the direct reply. State updates go out separately
    /// through the outbox.
    pub fn handle_message(&self, client: ClientId, message: ClientMessage, now_ms: u64) -> ServerMessage {
        let result = match message {
            ClientMessage::CreateRoom { config, seed } => self
                .create_room(config, seed, now_ms)
                .map(|room| ServerMessage::RoomCreated { room }),
            ClientMessage::ListRooms => Ok(ServerMessage::RoomList {
                rooms: self.list_rooms(),
            }),
            ClientMessage::Join { room, name, color } => self
                .join(client, &room, &name, color.as_deref())
                .map(|(player, reconnect_token)| ServerMessage::Joined {
                    room,
                    player,
                    reconnect_token,
                }),
            ClientMessage::Spectate { room } => self
                .spectate(client, &room)
                .map(|()| ServerMessage::Spectating { room }),
            ClientMessage::Reconnect { room, token } => {
                self.reconnect(client, &room, &token)
                    .map(|player| ServerMessage::Joined {
                        room,
                        player,
                        reconnect_token: token,
                    })
            }
            ClientMessage::StartRoom => self.start_room(client, now_ms).map(|()| ServerMessage::Ok),
            ClientMessage::SubmitOrders { orders } => {
                self.submit_orders(client, &orders).map(|()| ServerMessage::Ok)
            }
            ClientMessage::LockIn => self.lock_in(client, now_ms).map(|_| ServerMessage::Ok),
            ClientMessage::SetAlliance { target } => {
                self.set_alliance(client, target).map(|()| ServerMessage::Ok)
            }
            ClientMessage::Leave => {
                self.disconnect(client);
                Ok(ServerMessage::Ok)
            }
        };

        result.unwrap_or_else(|e| {
            debug!("Rejected request from client {}: {}", client, e);
            ServerMessage::rejected(e)
        })
    }
}
