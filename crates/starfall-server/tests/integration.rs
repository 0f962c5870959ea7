//! Integration tests for the room store.
//!
//! Drives rooms through sessions and the timer queue with a virtual clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use starfall_core::{GameError, SystemUpdate};
use starfall_protocol::{ClientId, MapSize, Phase, PlayerId, RoomConfig, RoomId, SystemId};
use starfall_server::{
    ChannelOutbox, ClientMessage, MemoryOutbox, NullOutbox, Outbox, RoomStore, ServerConfig,
    ServerMessage, StoreError,
};

fn room_config(max_players: u8) -> RoomConfig {
    RoomConfig {
        max_players,
        map_size: MapSize::Small,
        max_turns: 10,
        turn_seconds: 10,
        is_private: false,
    }
}

fn server_config() -> ServerConfig {
    ServerConfig {
        finalize_delay_ms: 3_000,
        ..ServerConfig::default()
    }
}

/// Two seated players (clients 1 and 2), started at t=0 with a 10s planning deadline.
fn started_room(store: &RoomStore, seed: &str) -> RoomId {
    let room = store
        .create_room(Some(room_config(2)), Some(seed.into()), 0)
        .unwrap();
    store.join(1, &room, "Ada", None).unwrap();
    store.join(2, &room, "Bea", None).unwrap();
    store.start_room(1, 0).unwrap();
    room
}

fn phase_and_turn(store: &RoomStore, room: &RoomId) -> (Phase, u32) {
    store.with_room(room, |r| (r.phase(), r.turn())).unwrap()
}

#[test]
fn lobby_flow_join_list_start() {
    let outbox = Arc::new(MemoryOutbox::new());
    let store = RoomStore::new(server_config(), Box::new(Arc::clone(&outbox)));

    let room = store
        .create_room(Some(room_config(2)), Some("lobby".into()), 0)
        .unwrap();
    let hidden = store
        .create_room(
            Some(RoomConfig {
                is_private: true,
                ..room_config(2)
            }),
            None,
            0,
        )
        .unwrap();

    let listed = store.list_rooms();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, room);
    assert_eq!(listed[0].players, 0);

    let (ada, token) = store.join(1, &room, "Ada", Some("azure")).unwrap();
    assert_eq!(ada, PlayerId(0));
    assert_eq!(token.len(), 32);
    assert_eq!(store.list_rooms()[0].players, 1);

    assert_eq!(
        store.join(2, &room, "ADA", None),
        Err(StoreError::Game(GameError::NameTaken("ADA".into())))
    );
    assert_eq!(
        store.join(2, &room, "Bea", Some("Azure")),
        Err(StoreError::Game(GameError::ColorTaken("azure".into())))
    );
    let (bea, _) = store.join(2, &room, "Bea", None).unwrap();
    assert_eq!(bea, PlayerId(1));

    // Full rooms drop out of the listing.
    assert!(store.list_rooms().is_empty());
    assert_ne!(room, hidden);

    outbox.drain();
    store.start_room(2, 0).unwrap();
    assert_eq!(phase_and_turn(&store, &room), (Phase::Planning, 1));
    assert_eq!(store.pending_timers(&room), 1);
    assert_eq!(
        store.start_room(1, 0),
        Err(StoreError::Game(GameError::AlreadyStarted))
    );

    let sent = outbox.drain();
    let viewers: Vec<(ClientId, Option<PlayerId>)> = sent
        .iter()
        .map(|(client, msg)| match msg {
            ServerMessage::RoomState { state } => (*client, state.viewer),
            other => panic!("unexpected message {other:?}"),
        })
        .collect();
    assert_eq!(viewers, vec![(1, Some(PlayerId(0))), (2, Some(PlayerId(1)))]);
}

#[test]
fn views_redact_other_players_orders() {
    let store = RoomStore::new(server_config(), Box::new(NullOutbox));
    let room = started_room(&store, "redact");

    let home = store
        .view(&room, Some(PlayerId(0)))
        .unwrap()
        .players[0]
        .home
        .unwrap();
    store
        .submit_orders(1, &serde_json::json!({ "placements": [{ "system": home.0, "count": 1 }] }))
        .unwrap();

    let own = store.view(&room, Some(PlayerId(0))).unwrap();
    assert!(own.players[0].orders.is_some());
    assert!(own.players[0].economy.is_some());

    let rival = store.view(&room, Some(PlayerId(1))).unwrap();
    assert!(rival.players[0].orders.is_none());
    assert!(rival.players[0].economy.is_none());

    let spectator = store.view(&room, None).unwrap();
    assert!(spectator.players.iter().all(|p| p.orders.is_none()));
}

#[test]
fn unstarted_room_releases_seat_on_disconnect() {
    let store = RoomStore::new(server_config(), Box::new(NullOutbox));
    let room = store.create_room(Some(room_config(2)), None, 0).unwrap();
    store.join(1, &room, "Ada", None).unwrap();
    store.join(2, &room, "Bea", None).unwrap();

    store.disconnect(2);
    assert_eq!(store.with_room(&room, |r| r.player_count()).unwrap(), 1);

    // The name is free again.
    store.join(3, &room, "Bea", None).unwrap();
    assert_eq!(store.room_count(), 1);
}

#[test]
fn reconnect_rebinds_seat() {
    let store = RoomStore::new(server_config(), Box::new(NullOutbox));
    let room = store
        .create_room(Some(room_config(2)), Some("reconnect".into()), 0)
        .unwrap();
    store.join(1, &room, "Ada", None).unwrap();
    let (bea, token) = store.join(2, &room, "Bea", None).unwrap();
    store.start_room(1, 0).unwrap();

    store.disconnect(2);
    let view = store.view(&room, None).unwrap();
    assert!(!view.players[1].connected);
    assert_eq!(store.room_count(), 1);

    assert_eq!(
        store.reconnect(9, &room, "not-a-token"),
        Err(StoreError::Game(GameError::InvalidToken))
    );
    assert_eq!(store.reconnect(7, &room, &token), Ok(bea));
    assert!(store.view(&room, None).unwrap().players[1].connected);

    // The new session acts for the seat.
    assert_eq!(store.lock_in(7, 1_000), Ok(false));
    assert_eq!(store.lock_in(2, 1_000), Err(StoreError::NotInRoom));
}

#[test]
fn seated_client_cannot_reconnect_elsewhere() {
    let store = RoomStore::new(server_config(), Box::new(NullOutbox));
    let first = started_room(&store, "first");
    let second = store
        .create_room(Some(room_config(2)), Some("second".into()), 0)
        .unwrap();
    store.join(3, &second, "Cy", None).unwrap();
    let (_, token) = store.join(4, &second, "Dee", None).unwrap();
    store.start_room(3, 0).unwrap();
    store.disconnect(4);

    assert_eq!(
        store.reconnect(1, &second, &token),
        Err(StoreError::AlreadyInRoom(first.clone()))
    );
    assert_eq!(
        store.handle_message(
            1,
            ClientMessage::Reconnect {
                room: second.clone(),
                token: token.clone(),
            },
            0,
        ),
        ServerMessage::rejected(StoreError::AlreadyInRoom(first.clone()))
    );
    // The seat stays free and the first room keeps its player.
    assert!(!store.view(&second, None).unwrap().players[1].connected);
    assert_eq!(store.with_room(&first, |r| r.connected_count()), Ok(2));

    for client in [2, 1, 3] {
        store.disconnect(client);
    }
    assert_eq!(store.room_count(), 0);
}

#[test]
fn room_torn_down_when_everyone_leaves() {
    let store = RoomStore::new(server_config(), Box::new(NullOutbox));
    let room = started_room(&store, "teardown");
    store.spectate(3, &room).unwrap();

    store.disconnect(1);
    store.disconnect(2);
    // The spectator keeps it alive.
    assert_eq!(store.room_count(), 1);

    store.disconnect(3);
    assert_eq!(store.room_count(), 0);
    assert_eq!(store.pending_timers(&room), 0);
    assert_eq!(
        store.view(&room, None),
        Err(StoreError::UnknownRoom(room.clone()))
    );
    // Timers for the removed room are gone, so ticking is harmless.
    assert_eq!(store.tick(60_000), 0);
}

#[test]
fn concurrent_lock_ins_begin_resolution_once() {
    let store = Arc::new(RoomStore::new(server_config(), Box::new(NullOutbox)));
    let room = store
        .create_room(
            Some(RoomConfig {
                map_size: MapSize::Medium,
                ..room_config(4)
            }),
            Some("race".into()),
            0,
        )
        .unwrap();
    for (client, name) in [(1, "Ada"), (2, "Bea"), (3, "Cy"), (4, "Dee")] {
        store.join(client, &room, name, None).unwrap();
    }
    store.start_room(1, 0).unwrap();

    let handles: Vec<_> = (1..=4u64)
        .map(|client| {
            let store = Arc::clone(&store);
            thread::spawn(move || store.lock_in(client, 1_000))
        })
        .collect();
    let began: Vec<bool> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    assert_eq!(began.iter().filter(|&&b| b).count(), 1);
    assert_eq!(phase_and_turn(&store, &room), (Phase::Resolving, 1));
    // The original deadline plus exactly one finalize.
    assert_eq!(store.pending_timers(&room), 2);
}

#[test]
fn tick_finalizes_after_delay_and_opens_next_turn() {
    let store = RoomStore::new(server_config(), Box::new(NullOutbox));
    let room = started_room(&store, "tick");

    store.lock_in(1, 1_000).unwrap();
    assert_eq!(store.lock_in(2, 1_000), Ok(true));

    // No battles, so the configured delay wins over the resolution window.
    assert_eq!(store.tick(3_999), 0);
    assert_eq!(phase_and_turn(&store, &room), (Phase::Resolving, 1));

    assert_eq!(store.tick(4_000), 1);
    assert_eq!(phase_and_turn(&store, &room), (Phase::Planning, 2));
    assert_eq!(
        store.with_room(&room, |r| r.turn_ends_at_ms()).unwrap(),
        Some(14_000)
    );

    // Turn 1's deadline fires as a stale no-op.
    assert_eq!(store.tick(10_000), 1);
    assert_eq!(phase_and_turn(&store, &room), (Phase::Planning, 2));

    // Turn 2 expires on its own deadline with nobody locked in.
    assert_eq!(store.tick(14_000), 1);
    assert_eq!(phase_and_turn(&store, &room), (Phase::Resolving, 2));
}

#[test]
fn stale_timers_are_ignored() {
    let store = RoomStore::new(server_config(), Box::new(NullOutbox));
    let room = started_room(&store, "stale");

    assert_eq!(store.force_expire(&room, 500), Ok(true));
    assert_eq!(store.force_expire(&room, 501), Ok(false));
    assert_eq!(store.finalize(&room, 600), Ok(true));
    assert_eq!(store.finalize(&room, 601), Ok(false));
    assert_eq!(phase_and_turn(&store, &room), (Phase::Planning, 2));

    // Turn 1's finalize and deadline are both stale now.
    assert_eq!(store.tick(3_500), 1);
    assert_eq!(store.tick(10_000), 1);
    assert_eq!(phase_and_turn(&store, &room), (Phase::Planning, 2));

    assert_eq!(store.tick(10_600), 1);
    assert_eq!(phase_and_turn(&store, &room), (Phase::Resolving, 2));
}

/// Panics the first time it is asked to deliver to `target` after being armed.
struct PanicOnce {
    target: ClientId,
    armed: AtomicBool,
}

impl Outbox for PanicOnce {
    fn send(&self, client: ClientId, _message: ServerMessage) {
        if client == self.target && self.armed.swap(false, Ordering::SeqCst) {
            panic!("transport blew up");
        }
    }
}

#[test]
fn panicking_room_recovers_without_stopping_others() {
    let outbox = Arc::new(PanicOnce {
        target: 1,
        armed: AtomicBool::new(false),
    });
    let store = RoomStore::new(server_config(), Box::new(Arc::clone(&outbox)));

    let broken = started_room(&store, "broken");
    let healthy = store
        .create_room(Some(room_config(2)), Some("healthy".into()), 0)
        .unwrap();
    store.join(3, &healthy, "Cy", None).unwrap();
    store.join(4, &healthy, "Dee", None).unwrap();
    store.start_room(3, 0).unwrap();

    outbox.armed.store(true, Ordering::SeqCst);
    assert_eq!(store.tick(10_000), 2);

    // The broken room reopened planning with a fresh deadline.
    assert_eq!(phase_and_turn(&store, &broken), (Phase::Planning, 1));
    assert_eq!(
        store.with_room(&broken, |r| r.turn_ends_at_ms()).unwrap(),
        Some(20_000)
    );
    assert!(store.with_room(&broken, |r| r.resolution().is_none()).unwrap());

    // The other room resolved as usual.
    assert_eq!(phase_and_turn(&store, &healthy), (Phase::Resolving, 1));
    assert_eq!(store.tick(13_000), 2);
    assert_eq!(phase_and_turn(&store, &healthy), (Phase::Planning, 2));
    assert_eq!(phase_and_turn(&store, &broken), (Phase::Planning, 1));

    // And the broken room keeps running on its new deadline.
    store.tick(20_000);
    assert_eq!(phase_and_turn(&store, &broken), (Phase::Resolving, 1));
}

/// Two started rooms, both fully locked in at t=1000 so each finalizes at t=4000.
fn locked_in_pair(store: &RoomStore) -> (RoomId, RoomId) {
    let first = started_room(store, "first-pair");
    let second = store
        .create_room(Some(room_config(2)), Some("second-pair".into()), 0)
        .unwrap();
    store.join(3, &second, "Cy", None).unwrap();
    store.join(4, &second, "Dee", None).unwrap();
    store.start_room(3, 0).unwrap();

    for client in 1..=4 {
        store.lock_in(client, 1_000).unwrap();
    }
    assert_eq!(phase_and_turn(store, &first), (Phase::Resolving, 1));
    assert_eq!(phase_and_turn(store, &second), (Phase::Resolving, 1));
    (first, second)
}

#[test]
fn panic_during_finalize_reopens_planning() {
    let outbox = Arc::new(PanicOnce {
        target: 1,
        armed: AtomicBool::new(false),
    });
    let store = RoomStore::new(server_config(), Box::new(Arc::clone(&outbox)));
    let (broken, healthy) = locked_in_pair(&store);

    outbox.armed.store(true, Ordering::SeqCst);
    assert_eq!(store.tick(4_000), 2);

    assert_eq!(phase_and_turn(&store, &broken), (Phase::Planning, 2));
    assert_eq!(
        store.with_room(&broken, |r| r.turn_ends_at_ms()).unwrap(),
        Some(14_000)
    );
    assert!(store.with_room(&broken, |r| r.resolution().is_none()).unwrap());
    assert_eq!(phase_and_turn(&store, &healthy), (Phase::Planning, 2));

    // Both rooms run on from their turn 2 deadlines.
    store.tick(14_000);
    assert_eq!(phase_and_turn(&store, &broken), (Phase::Resolving, 2));
    assert_eq!(phase_and_turn(&store, &healthy), (Phase::Resolving, 2));
}

#[test]
fn failed_finalize_reopens_planning_on_the_same_turn() {
    let store = RoomStore::new(server_config(), Box::new(NullOutbox));
    let (faulty, healthy) = locked_in_pair(&store);

    store
        .with_room(&faulty, |room| {
            let mut plan = room
                .resolution()
                .and_then(|pending| pending.plan.clone())
                .expect("pending plan");
            plan.updates.push(SystemUpdate {
                id: SystemId(9_999),
                owner: None,
                fleets: 0,
                defense_net_turns: 0,
            });
            room.replace_pending_plan(Some(plan));
        })
        .unwrap();

    assert_eq!(store.tick(4_000), 2);

    // Nothing was committed, so the turn does not advance.
    assert_eq!(phase_and_turn(&store, &faulty), (Phase::Planning, 1));
    assert_eq!(
        store.with_room(&faulty, |r| r.turn_ends_at_ms()).unwrap(),
        Some(14_000)
    );
    assert!(store.with_room(&faulty, |r| r.resolution().is_none()).unwrap());
    assert_eq!(phase_and_turn(&store, &healthy), (Phase::Planning, 2));

    // The old turn 1 deadline is not the current one.
    store.tick(10_000);
    assert_eq!(phase_and_turn(&store, &faulty), (Phase::Planning, 1));

    store.tick(14_000);
    assert_eq!(phase_and_turn(&store, &faulty), (Phase::Resolving, 1));
    store.tick(17_000);
    assert_eq!(phase_and_turn(&store, &faulty), (Phase::Planning, 2));
}

#[test]
fn message_dispatch_end_to_end() {
    let store = RoomStore::new(server_config(), Box::new(NullOutbox));

    let ServerMessage::RoomCreated { room } = store.handle_message(
        1,
        ClientMessage::CreateRoom {
            config: Some(room_config(2)),
            seed: Some("dispatch".into()),
        },
        0,
    ) else {
        panic!("room not created");
    };

    for (client, name) in [(1, "Ada"), (2, "Bea")] {
        let reply = store.handle_message(
            client,
            ClientMessage::Join {
                room: room.clone(),
                name: name.into(),
                color: None,
            },
            0,
        );
        assert!(matches!(reply, ServerMessage::Joined { .. }));
    }

    assert_eq!(
        store.handle_message(1, ClientMessage::LockIn, 0),
        ServerMessage::rejected(GameError::NotStarted)
    );
    assert_eq!(store.handle_message(1, ClientMessage::StartRoom, 0), ServerMessage::Ok);
    assert_eq!(
        store.handle_message(1, ClientMessage::SetAlliance { target: PlayerId(1) }, 0),
        ServerMessage::Ok
    );
    assert_eq!(
        store.handle_message(
            2,
            ClientMessage::SubmitOrders {
                orders: serde_json::json!({ "moves": "garbage" }),
            },
            0,
        ),
        ServerMessage::Ok
    );

    let view = store.view(&room, None).unwrap();
    assert_eq!(view.players[0].alliances, vec![(PlayerId(1), 3)]);

    assert_eq!(store.handle_message(2, ClientMessage::Leave, 0), ServerMessage::Ok);
    assert_eq!(
        store.handle_message(2, ClientMessage::LockIn, 0),
        ServerMessage::rejected(StoreError::NotInRoom)
    );
}

#[tokio::test]
async fn channel_outbox_delivers_room_states() {
    let (outbox, mut rx) = ChannelOutbox::new();
    let store = RoomStore::new(server_config(), Box::new(outbox));
    let room = store.create_room(Some(room_config(2)), None, 0).unwrap();
    store.spectate(5, &room).unwrap();

    let (client, message) = rx.recv().await.unwrap();
    assert_eq!(client, 5);
    let ServerMessage::RoomState { state } = message else {
        panic!("expected room state");
    };
    assert_eq!(state.viewer, None);
    assert_eq!(state.phase, Phase::Lobby);
}

#[test]
fn scheduler_loop_under_tokio_time() {
    tokio_test::block_on(async {
        let store = RoomStore::new(server_config(), Box::new(NullOutbox));
        let room = started_room(&store, "loop");

        let mut now = 0;
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(1));
        while phase_and_turn(&store, &room).1 < 3 {
            ticker.tick().await;
            now += 1_000;
            store.tick(now);
        }
        // Two full turns: 10s planning plus 3s finalize each.
        assert_eq!(now, 26_000);
    });
}
