//! Room registry integration tests.
//!
//! Exercises the registry and room actors under concurrent joins and leaves,
//! and checks the election scenarios against the membership the registry
//! reports.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use common::election::elect_offerer;
use common::protocol::ServerMessage;
use common::types::{SessionId, UserId};
use sc_test_utils::TestConnection;
use session_coordinator::actors::{ActorMetrics, RoomEvent, RoomRegistryHandle};
use tokio::sync::mpsc;

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    registry: RoomRegistryHandle,
    events: mpsc::UnboundedReceiver<RoomEvent>,
    metrics: Arc<ActorMetrics>,
}

fn harness() -> Harness {
    let metrics = ActorMetrics::new();
    let (tx, events) = mpsc::unbounded_channel();
    let registry = RoomRegistryHandle::new("sc-test".to_string(), 100, tx, Arc::clone(&metrics));
    Harness {
        registry,
        events,
        metrics,
    }
}

fn user(id: &str) -> UserId {
    UserId::from(id)
}

fn set(ids: &[&str]) -> BTreeSet<UserId> {
    ids.iter().map(|id| user(id)).collect()
}

/// Drain every event already published, waiting briefly for stragglers.
async fn drain_events(events: &mut mpsc::UnboundedReceiver<RoomEvent>) -> Vec<RoomEvent> {
    let mut drained = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(200), events.recv()).await
    {
        drained.push(event);
    }
    drained
}

/// Wait until the registry reports no live rooms.
async fn wait_for_no_rooms(registry: &RoomRegistryHandle) {
    let mut room_count = usize::MAX;
    for _ in 0..100 {
        room_count = registry.status().await.unwrap().room_count;
        if room_count == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(room_count, 0, "rooms never drained");
}

// ============================================================================
// Activation
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_joins_activate_room_exactly_once() {
    let mut h = harness();
    let session = SessionId::from("s1");

    let mut joins = Vec::new();
    for i in 0..16 {
        let registry = h.registry.clone();
        let session = session.clone();
        let connection = TestConnection::spawn(Arc::clone(&h.metrics));
        let identity = if i % 2 == 0 { user("alice") } else { user("bob") };
        joins.push(tokio::spawn(async move {
            let outcome = registry
                .join(session, identity, connection.handle())
                .await
                .unwrap();
            (outcome.became_active, connection)
        }));
    }

    let mut activations = 0;
    let mut connections = Vec::new();
    for join in joins {
        let (became_active, connection) = join.await.unwrap();
        if became_active {
            activations += 1;
        }
        connections.push(connection);
    }

    assert_eq!(activations, 1);
    assert_eq!(h.registry.members(session.clone()).await.unwrap(), set(&["alice", "bob"]));

    let events = drain_events(&mut h.events).await;
    assert_eq!(events, vec![RoomEvent::BecameActive { session_id: session }]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_join_leave_churn_alternates_active_and_empty() {
    let mut h = harness();
    let session = SessionId::from("churn");
    let alice = TestConnection::spawn(Arc::clone(&h.metrics));
    let bob = TestConnection::spawn(Arc::clone(&h.metrics));

    for _ in 0..20 {
        let (a, b) = tokio::join!(
            h.registry.join(session.clone(), user("alice"), alice.handle()),
            h.registry.join(session.clone(), user("bob"), bob.handle()),
        );
        a.unwrap();
        b.unwrap();

        let (a, b) = tokio::join!(
            h.registry.leave(session.clone(), user("alice")),
            h.registry.leave(session.clone(), user("bob")),
        );
        a.unwrap();
        b.unwrap();
    }

    wait_for_no_rooms(&h.registry).await;
    let events = drain_events(&mut h.events).await;

    // Strictly alternating: every empty->non-empty transition fires once
    assert_eq!(events.len(), 40);
    for (i, event) in events.iter().enumerate() {
        let expected = if i % 2 == 0 {
            RoomEvent::BecameActive {
                session_id: session.clone(),
            }
        } else {
            RoomEvent::BecameEmpty {
                session_id: session.clone(),
            }
        };
        assert_eq!(event, &expected, "event {i} out of order");
    }
    assert_eq!(h.metrics.activation_count(), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_interleaved_churn_never_emits_two_activations_in_a_row() {
    let mut h = harness();
    let session = SessionId::from("racy");

    let mut tasks = Vec::new();
    for i in 0..8 {
        let registry = h.registry.clone();
        let session = session.clone();
        let connection = TestConnection::spawn(Arc::clone(&h.metrics));
        let identity = user(&format!("user-{i}"));
        tasks.push(tokio::spawn(async move {
            for _ in 0..10 {
                registry
                    .join(session.clone(), identity.clone(), connection.handle())
                    .await
                    .unwrap();
                tokio::task::yield_now().await;
                registry.leave(session.clone(), identity.clone()).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    wait_for_no_rooms(&h.registry).await;
    let events = drain_events(&mut h.events).await;

    assert!(!events.is_empty());
    let mut active = false;
    for event in &events {
        match event {
            RoomEvent::BecameActive { .. } => {
                assert!(!active, "activated twice without emptying");
                active = true;
            }
            RoomEvent::BecameEmpty { .. } => {
                assert!(active, "emptied without being active");
                active = false;
            }
        }
    }
    assert!(!active, "room left active after every participant left");
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn test_join_and_leave_are_idempotent() {
    let mut h = harness();
    let session = SessionId::from("s1");
    let alice = TestConnection::spawn(Arc::clone(&h.metrics));
    let bob = TestConnection::spawn(Arc::clone(&h.metrics));

    h.registry
        .join(session.clone(), user("bob"), bob.handle())
        .await
        .unwrap();
    let first = h
        .registry
        .join(session.clone(), user("alice"), alice.handle())
        .await
        .unwrap();
    let second = h
        .registry
        .join(session.clone(), user("alice"), alice.handle())
        .await
        .unwrap();

    assert!(first.newly_joined);
    assert!(!second.newly_joined);
    assert_eq!(first.members, second.members);

    let left = h.registry.leave(session.clone(), user("alice")).await.unwrap();
    let again = h.registry.leave(session.clone(), user("alice")).await.unwrap();
    assert!(left.removed);
    assert!(!again.removed);
    assert_eq!(left.remaining, again.remaining);
    assert_eq!(again.remaining, set(&["bob"]));

    let events = drain_events(&mut h.events).await;
    assert_eq!(events.len(), 1, "only the first join activates");
}

// ============================================================================
// Election scenarios
// ============================================================================

#[tokio::test]
async fn test_later_smaller_identity_is_offerer_on_both_sides() {
    let h = harness();
    let session = SessionId::from("s1");
    let mut a = TestConnection::spawn(Arc::clone(&h.metrics));
    let mut b = TestConnection::spawn(Arc::clone(&h.metrics));

    h.registry
        .join(session.clone(), user("B"), b.handle())
        .await
        .unwrap();
    h.registry
        .join(session.clone(), user("A"), a.handle())
        .await
        .unwrap();

    // Each side elects from the participant list it was sent
    for connection in [&mut a, &mut b] {
        let message = loop {
            let message = connection.recv_kind("participants").await;
            if let ServerMessage::Participants { identities, .. } = &message {
                if identities.len() == 2 {
                    break message;
                }
            }
        };
        let ServerMessage::Participants { identities, .. } = message else {
            unreachable!("expected participants");
        };
        assert_eq!(elect_offerer(&identities), Some(user("A")));
    }
}

#[tokio::test]
async fn test_single_participant_activates_without_election() {
    let mut h = harness();
    let session = SessionId::from("solo");
    let a = TestConnection::spawn(Arc::clone(&h.metrics));

    let outcome = h
        .registry
        .join(session.clone(), user("A"), a.handle())
        .await
        .unwrap();

    assert_eq!(outcome.members.len(), 1);
    assert!(outcome.became_active);
    assert_eq!(elect_offerer(&outcome.members), None);
    assert_eq!(
        drain_events(&mut h.events).await,
        vec![RoomEvent::BecameActive { session_id: session }]
    );
}

#[tokio::test]
async fn test_reelection_after_offerer_disconnects() {
    let mut h = harness();
    let session = SessionId::from("s1");
    let a = TestConnection::spawn(Arc::clone(&h.metrics));
    let mut b = TestConnection::spawn(Arc::clone(&h.metrics));
    let c = TestConnection::spawn(Arc::clone(&h.metrics));

    h.registry
        .join(session.clone(), user("A"), a.handle())
        .await
        .unwrap();
    let outcome = h
        .registry
        .join(session.clone(), user("B"), b.handle())
        .await
        .unwrap();
    assert_eq!(elect_offerer(&outcome.members), Some(user("A")));

    // A's link drops
    let closed = h
        .registry
        .connection_closed(session.clone(), user("A"), a.connection_id())
        .await
        .unwrap();
    assert!(closed.removed);

    let outcome = h
        .registry
        .join(session.clone(), user("C"), c.handle())
        .await
        .unwrap();
    assert_eq!(outcome.members, set(&["B", "C"]));
    assert_eq!(elect_offerer(&outcome.members), Some(user("B")));
    assert!(!outcome.became_active, "room never emptied");

    let left = b.recv_kind("participant-left").await;
    assert_eq!(
        left,
        ServerMessage::ParticipantLeft {
            session_id: session.clone(),
            identity: user("A"),
        }
    );

    assert_eq!(drain_events(&mut h.events).await.len(), 1);
}

#[tokio::test]
async fn test_second_connection_keeps_identity_present() {
    let h = harness();
    let session = SessionId::from("s1");
    let first = TestConnection::spawn(Arc::clone(&h.metrics));
    let second = TestConnection::spawn(Arc::clone(&h.metrics));

    h.registry
        .join(session.clone(), user("A"), first.handle())
        .await
        .unwrap();
    h.registry
        .join(session.clone(), user("A"), second.handle())
        .await
        .unwrap();

    let outcome = h
        .registry
        .connection_closed(session.clone(), user("A"), first.connection_id())
        .await
        .unwrap();
    assert!(!outcome.removed);
    assert_eq!(outcome.remaining, set(&["A"]));
}

#[tokio::test]
async fn test_capacity_is_enforced_per_room() {
    let metrics = ActorMetrics::new();
    let (tx, _events) = mpsc::unbounded_channel();
    let registry = RoomRegistryHandle::new("sc-test".to_string(), 1, tx, Arc::clone(&metrics));
    let a = TestConnection::spawn(Arc::clone(&metrics));

    registry
        .join(SessionId::from("s1"), user("A"), a.handle())
        .await
        .unwrap();
    // Same room is fine
    registry
        .join(SessionId::from("s1"), user("B"), a.handle())
        .await
        .unwrap();

    let err = registry
        .join(SessionId::from("s2"), user("A"), a.handle())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), 7);
}
