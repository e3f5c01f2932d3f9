//! Integration tests for the room actor: lobby clocks, spawn indices,
//! capacity, and the combat flow as seen from another member.
//!
//! All timer behavior runs under `start_paused`, so the 14-second wait
//! and the countdown complete instantly and deterministically.

use std::time::Duration;

use aethercore_protocol::{
    CharacterClass, RoomId, ServerEvent, SessionId, StatBlock,
};
use aethercore_room::{
    MemberProfile, RoomConfig, RoomError, RoomEvent, RoomManager,
};
use aethercore_router::{EventReceiver, Router};
use tokio::time::{Instant, timeout};

fn profile(name: &str) -> MemberProfile {
    MemberProfile {
        username: name.to_string(),
        class: CharacterClass::Warrior,
        level: 1,
        stats: StatBlock::default(),
    }
}

fn sid(id: u64) -> SessionId {
    SessionId(id)
}

/// Registers a session with the router and returns its event stream.
fn connect(router: &Router, id: u64) -> EventReceiver {
    router.connect(sid(id))
}

/// Receives events until one matches, skipping the rest. Panics if
/// nothing matches within a (paused-time) minute.
async fn next_matching(
    rx: &mut EventReceiver,
    pred: impl Fn(&ServerEvent) -> bool,
) -> ServerEvent {
    timeout(Duration::from_secs(60), async {
        loop {
            let event = rx.recv().await.expect("event stream closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("no matching event within a minute")
}

/// Drains everything currently queued without waiting.
fn drain(rx: &mut EventReceiver) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn test_lobby_waits_counts_down_and_starts_exactly_once() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    let mut rx_a = connect(&router, 1);
    let _rx_b = connect(&router, 2);
    let room = RoomId::new("arena");
    let started_at = Instant::now();

    manager
        .join_room(sid(1), room.clone(), profile("ada"))
        .await
        .unwrap();
    manager
        .join_room(sid(2), room.clone(), profile("bob"))
        .await
        .unwrap();

    let created =
        next_matching(&mut rx_a, |e| matches!(e, ServerEvent::LobbyCreated { .. })).await;
    assert_eq!(
        created,
        ServerEvent::LobbyCreated {
            room_id: room.clone(),
            wait_secs: 14,
            player_count: 2,
        }
    );

    for expected in [3u8, 2, 1] {
        let tick = next_matching(&mut rx_a, |e| {
            matches!(e, ServerEvent::CountdownTick { .. })
        })
        .await;
        assert_eq!(tick, ServerEvent::CountdownTick { count: expected });
    }

    let start =
        next_matching(&mut rx_a, |e| matches!(e, ServerEvent::GameStart { .. })).await;
    match start {
        ServerEvent::GameStart {
            players,
            already_started,
            ..
        } => {
            assert!(!already_started);
            assert_eq!(players.len(), 2);
        }
        other => panic!("expected GameStart, got {other:?}"),
    }

    // Wait plus one tick per countdown step, and not a second longer.
    assert_eq!(started_at.elapsed(), Duration::from_secs(17));

    // Nothing else may start the game again.
    tokio::time::advance(Duration::from_secs(60)).await;
    let leftovers = drain(&mut rx_a);
    assert!(
        !leftovers
            .iter()
            .any(|e| matches!(e, ServerEvent::GameStart { .. })),
        "second game start observed: {leftovers:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_leave_below_threshold_cancels_lobby() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    let mut rx_a = connect(&router, 1);
    let _rx_b = connect(&router, 2);
    let room = RoomId::new("arena");

    manager
        .join_room(sid(1), room.clone(), profile("ada"))
        .await
        .unwrap();
    manager
        .join_room(sid(2), room.clone(), profile("bob"))
        .await
        .unwrap();
    next_matching(&mut rx_a, |e| matches!(e, ServerEvent::LobbyCreated { .. })).await;

    manager.leave_room(sid(2)).await.unwrap();
    let cancelled = next_matching(&mut rx_a, |e| {
        matches!(e, ServerEvent::LobbyCancelled { .. })
    })
    .await;
    assert!(matches!(cancelled, ServerEvent::LobbyCancelled { .. }));

    // The wait clock is gone: well past it, still no start.
    tokio::time::advance(Duration::from_secs(120)).await;
    let leftovers = drain(&mut rx_a);
    assert!(
        !leftovers.iter().any(|e| matches!(
            e,
            ServerEvent::GameStart { .. } | ServerEvent::CountdownTick { .. }
        )),
        "lobby kept running after cancel: {leftovers:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_leave_during_countdown_cancels_and_reverts() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    let mut rx_a = connect(&router, 1);
    let _rx_b = connect(&router, 2);
    let room = RoomId::new("arena");

    manager
        .join_room(sid(1), room.clone(), profile("ada"))
        .await
        .unwrap();
    manager
        .join_room(sid(2), room.clone(), profile("bob"))
        .await
        .unwrap();

    // Into the countdown, then drop below threshold.
    next_matching(&mut rx_a, |e| {
        matches!(e, ServerEvent::CountdownTick { count: 3 })
    })
    .await;
    manager.leave_room(sid(2)).await.unwrap();

    next_matching(&mut rx_a, |e| {
        matches!(e, ServerEvent::LobbyCancelled { .. })
    })
    .await;
    tokio::time::advance(Duration::from_secs(60)).await;
    let leftovers = drain(&mut rx_a);
    assert!(
        !leftovers
            .iter()
            .any(|e| matches!(e, ServerEvent::GameStart { .. })),
        "game started after countdown cancel: {leftovers:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_spawn_indices_lowest_free_and_reused() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    for id in 1..=3 {
        let _ = connect(&router, id);
    }

    let a = manager
        .join_room(sid(1), RoomId::world(), profile("ada"))
        .await
        .unwrap();
    let b = manager
        .join_room(sid(2), RoomId::world(), profile("bob"))
        .await
        .unwrap();
    assert_eq!(a.spawn_index, 0);
    assert_eq!(b.spawn_index, 1);

    manager.leave_room(sid(1)).await.unwrap();
    let c = manager
        .join_room(sid(3), RoomId::world(), profile("cyd"))
        .await
        .unwrap();
    assert_eq!(c.spawn_index, 0, "freed index should be reused");
}

#[tokio::test(start_paused = true)]
async fn test_room_full_rejects_join_and_keeps_roster() {
    let router = Router::new();
    let config = RoomConfig {
        capacity: 2,
        ..RoomConfig::default()
    };
    let mut manager = RoomManager::new(config, router.clone());
    for id in 1..=3 {
        let _ = connect(&router, id);
    }
    let room = RoomId::new("duel");

    manager
        .join_room(sid(1), room.clone(), profile("ada"))
        .await
        .unwrap();
    manager
        .join_room(sid(2), room.clone(), profile("bob"))
        .await
        .unwrap();

    let result = manager.join_room(sid(3), room.clone(), profile("cyd")).await;
    assert!(matches!(result, Err(RoomError::RoomFull(_))));

    let info = manager.room_info(&room).await.unwrap();
    assert_eq!(info.player_count, 2);
}

#[tokio::test(start_paused = true)]
async fn test_second_join_while_in_a_room_is_rejected() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    let _rx = connect(&router, 1);

    manager
        .join_room(sid(1), RoomId::world(), profile("ada"))
        .await
        .unwrap();
    let again = manager
        .join_room(sid(1), RoomId::new("arena"), profile("ada"))
        .await;
    assert!(matches!(again, Err(RoomError::AlreadyInRoom(..))));
}

#[tokio::test(start_paused = true)]
async fn test_empty_ephemeral_room_is_destroyed() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    let _rx = connect(&router, 1);

    manager
        .join_room(sid(1), RoomId::new("arena"), profile("ada"))
        .await
        .unwrap();
    assert_eq!(manager.room_count(), 2); // world + arena

    manager.leave_room(sid(1)).await.unwrap();
    assert_eq!(manager.room_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_world_room_starts_active_and_survives_emptiness() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    let mut rx = connect(&router, 1);

    let snapshot = manager
        .join_room(sid(1), RoomId::world(), profile("ada"))
        .await
        .unwrap();
    assert!(snapshot.game_started);

    // Late joiners get the running game handed to them directly.
    let start =
        next_matching(&mut rx, |e| matches!(e, ServerEvent::GameStart { .. })).await;
    assert!(matches!(
        start,
        ServerEvent::GameStart {
            already_started: true,
            ..
        }
    ));

    manager.leave_room(sid(1)).await.unwrap();
    assert_eq!(manager.room_count(), 1, "world room must not be destroyed");
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_of_unroomed_session_is_noop() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    assert!(manager.disconnect(sid(42)).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_attack_at_thirty_health_kills_target() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    let mut rx_a = connect(&router, 1);
    let _rx_b = connect(&router, 2);

    manager
        .join_room(sid(1), RoomId::world(), profile("ada"))
        .await
        .unwrap();
    manager
        .join_room(sid(2), RoomId::world(), profile("bob"))
        .await
        .unwrap();
    manager
        .send_event(
            sid(1),
            RoomEvent::ReportStats {
                max_health: 100.0,
                health: None,
            },
        )
        .await
        .unwrap();
    manager
        .send_event(
            sid(2),
            RoomEvent::ReportStats {
                max_health: 100.0,
                health: Some(30.0),
            },
        )
        .await
        .unwrap();

    manager
        .send_event(
            sid(1),
            RoomEvent::Attack {
                target_id: Some(sid(2)),
                damage: 50.0,
            },
        )
        .await
        .unwrap();

    let damaged = next_matching(&mut rx_a, |e| {
        matches!(e, ServerEvent::PlayerDamaged { .. })
    })
    .await;
    assert_eq!(
        damaged,
        ServerEvent::PlayerDamaged {
            target_id: sid(2),
            attacker_id: sid(1),
            damage: 50.0,
            health: 0.0,
            max_health: 100.0,
        }
    );

    let died =
        next_matching(&mut rx_a, |e| matches!(e, ServerEvent::PlayerDied { .. })).await;
    assert_eq!(
        died,
        ServerEvent::PlayerDied {
            session_id: sid(2),
            killer_id: Some(sid(1)),
            respawn_ms: 10_000,
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_respawn_only_after_window_elapses() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    let mut rx_a = connect(&router, 1);
    let _rx_b = connect(&router, 2);

    manager
        .join_room(sid(1), RoomId::world(), profile("ada"))
        .await
        .unwrap();
    manager
        .join_room(sid(2), RoomId::world(), profile("bob"))
        .await
        .unwrap();
    for id in [1, 2] {
        manager
            .send_event(
                sid(id),
                RoomEvent::ReportStats {
                    max_health: 100.0,
                    health: None,
                },
            )
            .await
            .unwrap();
    }
    manager
        .send_event(
            sid(1),
            RoomEvent::Attack {
                target_id: Some(sid(2)),
                damage: 200.0,
            },
        )
        .await
        .unwrap();
    next_matching(&mut rx_a, |e| matches!(e, ServerEvent::PlayerDied { .. })).await;

    // Too early: request is swallowed.
    manager
        .send_event(sid(2), RoomEvent::RequestRespawn)
        .await
        .unwrap();
    // Round-trip through the actor so the event is processed.
    manager.room_info(&RoomId::world()).await.unwrap();
    assert!(
        !drain(&mut rx_a)
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerRespawned { .. })),
        "respawned before the window elapsed"
    );

    tokio::time::advance(Duration::from_secs(10)).await;
    manager
        .send_event(sid(2), RoomEvent::RequestRespawn)
        .await
        .unwrap();

    let respawned = next_matching(&mut rx_a, |e| {
        matches!(e, ServerEvent::PlayerRespawned { .. })
    })
    .await;
    match respawned {
        ServerEvent::PlayerRespawned {
            session_id,
            spawn_point,
            health,
            max_health,
        } => {
            assert_eq!(session_id, sid(2));
            assert!(spawn_point < 20);
            assert_eq!((health, max_health), (100.0, 100.0));
        }
        other => panic!("expected PlayerRespawned, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_move_relay_excludes_sender() {
    let router = Router::new();
    let mut manager = RoomManager::new(RoomConfig::default(), router.clone());
    let mut rx_a = connect(&router, 1);
    let mut rx_b = connect(&router, 2);

    manager
        .join_room(sid(1), RoomId::world(), profile("ada"))
        .await
        .unwrap();
    manager
        .join_room(sid(2), RoomId::world(), profile("bob"))
        .await
        .unwrap();
    drain(&mut rx_a);
    drain(&mut rx_b);

    manager
        .send_event(
            sid(1),
            RoomEvent::Animate {
                state: "run".into(),
            },
        )
        .await
        .unwrap();
    let animated = next_matching(&mut rx_b, |e| {
        matches!(e, ServerEvent::PlayerAnimated { .. })
    })
    .await;
    assert_eq!(
        animated,
        ServerEvent::PlayerAnimated {
            session_id: sid(1),
            state: "run".into(),
        }
    );

    manager.room_info(&RoomId::world()).await.unwrap();
    assert!(
        !drain(&mut rx_a)
            .iter()
            .any(|e| matches!(e, ServerEvent::PlayerAnimated { .. })),
        "sender received its own relay"
    );
}
