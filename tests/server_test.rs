// Scenario tests for the realtime server: presence, typing, access
// control and fan-out, driven through the dispatcher without a socket.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use warp::ws::Message;

use trip_sync::auth::token::JwtTokenValidator;
use trip_sync::config::ServerConfig;
use trip_sync::core::connection::ConnectionHandle;
use trip_sync::core::events::ClientEvent;
use trip_sync::core::server::RealtimeServer;
use trip_sync::error::TripSyncError;
use trip_sync::storage::memory::MemoryDirectory;

async fn server_with_directory() -> (Arc<RealtimeServer>, Arc<MemoryDirectory>) {
    let config = ServerConfig::for_testing();
    let directory = Arc::new(MemoryDirectory::new());
    let validator = Arc::new(JwtTokenValidator::new(&config.jwt_secret));
    let server = Arc::new(RealtimeServer::new(
        config,
        validator,
        directory.clone(),
        directory.clone(),
    ));
    (server, directory)
}

/// Admit a user and return the handle plus the outbound message stream
async fn connect(
    server: &RealtimeServer,
    user: &str,
) -> (ConnectionHandle, mpsc::UnboundedReceiver<Message>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let identity = trip_sync::auth::token::Identity {
        user_id: user.to_string(),
        email: format!("{}@example.com", user),
    };
    let conn = server.admit(identity, tx).await.expect("admission failed");
    (conn, rx)
}

/// Drain every event currently queued on a connection
fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<Value> {
    let mut events = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        if let Ok(text) = msg.to_str() {
            events.push(serde_json::from_str(text).expect("invalid event json"));
        }
    }
    events
}

fn join(room_id: &str) -> ClientEvent {
    ClientEvent::JoinRoom {
        room_id: room_id.to_string(),
    }
}

#[tokio::test]
async fn test_presence_scenario() {
    let (server, directory) = server_with_directory().await;
    directory.add_trip_member("trip-1", "alice").await;
    directory.add_trip_member("trip-1", "bob").await;

    // Alice joins an empty room: nobody to notify
    let (alice, mut alice_rx) = connect(&server, "alice").await;
    server.dispatch(&alice, join("trip-1")).await;
    assert_eq!(server.room_members("trip-1").await.len(), 1);
    assert!(drain(&mut alice_rx).is_empty());

    // Bob joins: alice is told, bob is not echoed at
    let (bob, mut bob_rx) = connect(&server, "bob").await;
    server.dispatch(&bob, join("trip-1")).await;
    assert_eq!(server.room_members("trip-1").await.len(), 2);

    let alice_events = drain(&mut alice_rx);
    assert_eq!(alice_events.len(), 1);
    assert_eq!(alice_events[0]["type"], "user-online");
    assert_eq!(alice_events[0]["payload"]["userId"], "bob");
    assert_eq!(alice_events[0]["payload"]["roomId"], "trip-1");
    assert!(drain(&mut bob_rx).is_empty());

    // Bob types: alice sees it, bob does not
    server
        .dispatch(&bob, ClientEvent::TypingStart { room_id: "trip-1".to_string() })
        .await;
    let alice_events = drain(&mut alice_rx);
    assert_eq!(alice_events.len(), 1);
    assert_eq!(alice_events[0]["type"], "typing-start");
    assert_eq!(alice_events[0]["payload"]["userId"], "bob");
    assert!(drain(&mut bob_rx).is_empty());

    // Bob disconnects: alice sees user-offline, state unwinds fully
    server.release(&bob.id).await;
    let alice_events = drain(&mut alice_rx);
    assert_eq!(alice_events.len(), 1);
    assert_eq!(alice_events[0]["type"], "user-offline");
    assert_eq!(alice_events[0]["payload"]["userId"], "bob");

    assert_eq!(server.room_members("trip-1").await, vec![alice.id.clone()]);
    assert_eq!(server.user_connection_count("bob").await, 0);
}

#[tokio::test]
async fn test_forbidden_join_mutates_nothing() {
    let (server, directory) = server_with_directory().await;
    directory.add_trip_member("trip-1", "alice").await;

    let (carol, mut carol_rx) = connect(&server, "carol").await;
    server.dispatch(&carol, join("trip-2")).await;

    let events = drain(&mut carol_rx);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["type"], "error");
    assert_eq!(events[0]["payload"]["code"], "forbidden");
    assert_eq!(events[0]["payload"]["relatedEvent"], "join-room");

    assert!(server.room_members("trip-2").await.is_empty());
    assert!(server.rooms_of(&carol.id).await.is_empty());
}

#[tokio::test]
async fn test_direct_join_forbidden_error() {
    let (server, _) = server_with_directory().await;
    let (carol, _carol_rx) = connect(&server, "carol").await;

    let result = server.join_room(&carol, "trip-2").await;
    assert!(matches!(result, Err(TripSyncError::Forbidden)));
}

#[tokio::test]
async fn test_typing_from_non_member_is_dropped() {
    let (server, directory) = server_with_directory().await;
    directory.add_trip_member("trip-1", "alice").await;

    let (alice, mut alice_rx) = connect(&server, "alice").await;
    server.dispatch(&alice, join("trip-1")).await;

    // Mallory has access to nothing and joined nothing
    let (mallory, mut mallory_rx) = connect(&server, "mallory").await;
    server
        .dispatch(&mallory, ClientEvent::TypingStart { room_id: "trip-1".to_string() })
        .await;

    assert!(drain(&mut alice_rx).is_empty());
    assert!(drain(&mut mallory_rx).is_empty());
}

#[tokio::test]
async fn test_leave_room_notifies_remaining() {
    let (server, directory) = server_with_directory().await;
    directory.add_trip_member("trip-1", "alice").await;
    directory.add_trip_member("trip-1", "bob").await;

    let (alice, mut alice_rx) = connect(&server, "alice").await;
    let (bob, mut bob_rx) = connect(&server, "bob").await;
    server.dispatch(&alice, join("trip-1")).await;
    server.dispatch(&bob, join("trip-1")).await;
    drain(&mut alice_rx);

    server
        .dispatch(&bob, ClientEvent::LeaveRoom { room_id: "trip-1".to_string() })
        .await;

    let alice_events = drain(&mut alice_rx);
    assert_eq!(alice_events.len(), 1);
    assert_eq!(alice_events[0]["type"], "user-offline");
    assert!(drain(&mut bob_rx).is_empty());
    assert_eq!(server.room_members("trip-1").await, vec![alice.id.clone()]);

    // Leaving again is a no-op, not an error
    server
        .dispatch(&bob, ClientEvent::LeaveRoom { room_id: "trip-1".to_string() })
        .await;
    assert!(drain(&mut alice_rx).is_empty());
    assert!(drain(&mut bob_rx).is_empty());
}

#[tokio::test]
async fn test_release_is_idempotent_at_server_level() {
    let (server, directory) = server_with_directory().await;
    directory.add_trip_member("trip-1", "alice").await;
    directory.add_trip_member("trip-1", "bob").await;

    let (alice, mut alice_rx) = connect(&server, "alice").await;
    let (bob, _bob_rx) = connect(&server, "bob").await;
    server.dispatch(&alice, join("trip-1")).await;
    server.dispatch(&bob, join("trip-1")).await;
    drain(&mut alice_rx);

    server.release(&bob.id).await;
    server.release(&bob.id).await;

    // Exactly one user-offline, exactly one decrement
    let alice_events = drain(&mut alice_rx);
    assert_eq!(alice_events.len(), 1);
    assert_eq!(server.user_connection_count("bob").await, 0);
    assert_eq!(server.connection_count().await, 1);
}

#[tokio::test]
async fn test_broadcast_to_room_survives_stale_member() {
    let (server, directory) = server_with_directory().await;
    for user in ["alice", "bob", "carol"] {
        directory.add_trip_member("trip-1", user).await;
    }

    let (alice, mut alice_rx) = connect(&server, "alice").await;
    let (bob, bob_rx) = connect(&server, "bob").await;
    let (carol, mut carol_rx) = connect(&server, "carol").await;
    server.dispatch(&alice, join("trip-1")).await;
    server.dispatch(&bob, join("trip-1")).await;
    server.dispatch(&carol, join("trip-1")).await;
    drain(&mut alice_rx);
    drain(&mut carol_rx);

    // Bob's transport dies without releasing the connection yet
    drop(bob_rx);

    server
        .broadcast_to_room("trip-1", "itinerary-updated", serde_json::json!({ "tripId": "trip-1" }))
        .await;

    for rx in [&mut alice_rx, &mut carol_rx] {
        let events = drain(rx);
        assert_eq!(events.len(), 1, "delivery must not stop at the stale member");
        assert_eq!(events[0]["type"], "itinerary-updated");
        assert_eq!(events[0]["payload"]["tripId"], "trip-1");
    }
}

#[tokio::test]
async fn test_broadcast_to_user_reaches_every_device() {
    let (server, _) = server_with_directory().await;

    let (_tab1, mut tab1_rx) = connect(&server, "alice").await;
    let (_tab2, mut tab2_rx) = connect(&server, "alice").await;
    let (_other, mut other_rx) = connect(&server, "bob").await;

    server
        .broadcast_to_user("alice", "invite-received", serde_json::json!({ "tripId": "trip-9" }))
        .await;

    for rx in [&mut tab1_rx, &mut tab2_rx] {
        let events = drain(rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["type"], "invite-received");
    }
    assert!(drain(&mut other_rx).is_empty());
}

#[tokio::test]
async fn test_simultaneous_joins_notify_prior_members() {
    let (server, directory) = server_with_directory().await;
    directory.add_trip_member("trip-1", "alice").await;
    directory.add_trip_member("trip-1", "bob").await;
    directory.add_trip_member("trip-1", "carol").await;

    let (alice, mut alice_rx) = connect(&server, "alice").await;
    server.dispatch(&alice, join("trip-1")).await;

    let (bob, _bob_rx) = connect(&server, "bob").await;
    let (carol, _carol_rx) = connect(&server, "carol").await;

    let (s1, s2) = (server.clone(), server.clone());
    let j1 = tokio::spawn(async move { s1.dispatch(&bob, join("trip-1")).await });
    let j2 = tokio::spawn(async move { s2.dispatch(&carol, join("trip-1")).await });
    j1.await.unwrap();
    j2.await.unwrap();

    // Whatever the interleaving, the member who was already present
    // hears about both newcomers exactly once each
    let events = drain(&mut alice_rx);
    let mut joined: Vec<String> = events
        .iter()
        .filter(|e| e["type"] == "user-online")
        .map(|e| e["payload"]["userId"].as_str().unwrap().to_string())
        .collect();
    joined.sort();
    assert_eq!(joined, vec!["bob".to_string(), "carol".to_string()]);
    assert_eq!(server.room_members("trip-1").await.len(), 3);
}
