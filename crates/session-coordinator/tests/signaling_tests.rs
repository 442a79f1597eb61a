//! Signaling handler integration tests.
//!
//! Drives `ConnectionHandler`s directly against in-process services: the
//! real gate (JWT verification plus a mock session directory), the room
//! registry, and the status bridge.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use common::protocol::{ClientMessage, IceCandidate, ServerMessage, SessionDescription};
use common::types::{SessionId, SessionStatus, UserId};
use sc_test_utils::{
    credential_for, MockSessionDirectory, TestConnection, TestContext, TestSession,
    TestTokenBuilder,
};
use session_coordinator::signaling::{ConnectionHandler, MALFORMED_MESSAGE};

const QUIET: Duration = Duration::from_millis(150);

// ============================================================================
// Helpers
// ============================================================================

fn lesson() -> TestSession {
    TestSession::new("lesson-1")
        .with_teacher("alice")
        .with_learner("bob")
}

fn services() -> TestContext {
    TestContext::new(MockSessionDirectory::new().with_session(lesson().build()))
}

fn link(ctx: &TestContext) -> (ConnectionHandler, TestConnection) {
    let connection = TestConnection::spawn(ctx.metrics.clone());
    let handler = ConnectionHandler::new(connection.handle(), ctx.context.clone());
    (handler, connection)
}

fn join(user: &str) -> ClientMessage {
    ClientMessage::Join {
        session_id: lesson().session_id(),
        credential: credential_for(user),
    }
}

fn chat(text: &str) -> ClientMessage {
    ClientMessage::Chat {
        session_id: lesson().session_id(),
        message: text.to_string(),
    }
}

async fn wait_for_updates(
    directory: &MockSessionDirectory,
    session_id: &SessionId,
    expected: usize,
) -> Vec<SessionStatus> {
    let mut updates = Vec::new();
    for _ in 0..100 {
        updates = directory.updates_for(session_id);
        if updates.len() >= expected {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    updates
}

/// Join both participants and drain their join traffic.
async fn joined_pair(
    ctx: &TestContext,
) -> (
    (ConnectionHandler, TestConnection),
    (ConnectionHandler, TestConnection),
) {
    let (mut alice, mut alice_rx) = link(ctx);
    let (mut bob, mut bob_rx) = link(ctx);

    alice.handle_message(join("alice")).await;
    bob.handle_message(join("bob")).await;

    alice_rx.recv_kind("participant-joined").await;
    alice_rx.recv_kind("participants").await;
    bob_rx.recv_kind("participants").await;
    alice_rx.collect_for(QUIET).await;
    bob_rx.collect_for(QUIET).await;

    ((alice, alice_rx), (bob, bob_rx))
}

// ============================================================================
// Join
// ============================================================================

#[tokio::test]
async fn test_join_acknowledges_then_lists_participants() {
    let ctx = services();
    let (mut handler, mut rx) = link(&ctx);

    handler.handle_message(join("alice")).await;

    assert_eq!(
        rx.recv().await,
        ServerMessage::Joined {
            session_id: lesson().session_id(),
            identity: UserId::from("alice"),
        }
    );
    assert_eq!(
        rx.recv().await,
        ServerMessage::Participants {
            session_id: lesson().session_id(),
            identities: vec![UserId::from("alice")],
        }
    );
    assert_eq!(handler.identity(), Some(&UserId::from("alice")));
    assert!(handler.is_authorized(&lesson().session_id()));
}

#[tokio::test]
async fn test_first_join_marks_session_in_progress() {
    let ctx = services();
    let (mut handler, _rx) = link(&ctx);

    handler.handle_message(join("alice")).await;

    let updates = wait_for_updates(&ctx.directory, &lesson().session_id(), 1).await;
    assert_eq!(updates, vec![SessionStatus::InProgress]);
}

#[tokio::test]
async fn test_second_join_notifies_existing_member() {
    let ctx = services();
    let (mut alice, mut alice_rx) = link(&ctx);
    let (mut bob, mut bob_rx) = link(&ctx);

    alice.handle_message(join("alice")).await;
    alice_rx.recv_kind("participants").await;

    bob.handle_message(join("bob")).await;

    assert_eq!(
        alice_rx.recv().await,
        ServerMessage::ParticipantJoined {
            session_id: lesson().session_id(),
            identity: UserId::from("bob"),
        }
    );
    let expected = ServerMessage::Participants {
        session_id: lesson().session_id(),
        identities: vec![UserId::from("alice"), UserId::from("bob")],
    };
    assert_eq!(alice_rx.recv().await, expected);
    assert_eq!(bob_rx.recv_kind("participants").await, expected);

    // Only the activating join requests a status change
    let updates = wait_for_updates(&ctx.directory, &lesson().session_id(), 1).await;
    assert_eq!(updates, vec![SessionStatus::InProgress]);
}

#[tokio::test]
async fn test_join_with_invalid_credentials_is_rejected() {
    let ctx = services();
    let (mut handler, mut rx) = link(&ctx);

    let bad_tokens = [
        TestTokenBuilder::new().for_user("alice").expires_in(-3600).credential(),
        TestTokenBuilder::new()
            .for_user("alice")
            .signed_with("some-other-secret-that-is-long-enough")
            .credential(),
        common::protocol::Credential("not-a-jwt".to_string()),
    ];

    for credential in bad_tokens {
        handler
            .handle_message(ClientMessage::Join {
                session_id: lesson().session_id(),
                credential,
            })
            .await;
        assert_eq!(
            rx.recv().await,
            ServerMessage::Error {
                message: "The access token is invalid or expired".to_string(),
            }
        );
    }

    assert!(handler.identity().is_none());
    assert!(!handler.is_authorized(&lesson().session_id()));
    assert_eq!(ctx.registry.status().await.unwrap().room_count, 0);
}

#[tokio::test]
async fn test_join_by_non_member_is_forbidden() {
    let ctx = services();
    let (mut handler, mut rx) = link(&ctx);

    handler.handle_message(join("mallory")).await;

    assert_eq!(
        rx.recv().await,
        ServerMessage::Error {
            message: "Not authorized for this session".to_string(),
        }
    );
    assert!(!handler.is_authorized(&lesson().session_id()));
    assert!(ctx
        .registry
        .members(lesson().session_id())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_join_unknown_session_is_not_found() {
    let ctx = services();
    let (mut handler, mut rx) = link(&ctx);

    handler
        .handle_message(ClientMessage::Join {
            session_id: SessionId::from("no-such-lesson"),
            credential: credential_for("alice"),
        })
        .await;

    assert_eq!(
        rx.recv().await,
        ServerMessage::Error {
            message: "Session not found".to_string(),
        }
    );
}

#[tokio::test]
async fn test_join_with_different_identity_on_bound_link_is_forbidden() {
    let ctx = services();
    let (mut handler, mut rx) = link(&ctx);

    handler.handle_message(join("alice")).await;
    rx.recv_kind("participants").await;

    handler.handle_message(join("bob")).await;

    assert_eq!(
        rx.recv().await,
        ServerMessage::Error {
            message: "Not authorized for this session".to_string(),
        }
    );
    assert_eq!(handler.identity(), Some(&UserId::from("alice")));
    assert_eq!(
        ctx.registry.members(lesson().session_id()).await.unwrap(),
        [UserId::from("alice")].into_iter().collect()
    );
}

#[tokio::test]
async fn test_join_to_completed_session_is_admitted() {
    let directory = MockSessionDirectory::new().with_session(
        lesson().with_status(SessionStatus::Completed).build(),
    );
    let ctx = TestContext::new(directory);
    let (mut handler, mut rx) = link(&ctx);

    handler.handle_message(join("alice")).await;

    assert_eq!(rx.recv().await.kind(), "joined");
    assert!(handler.is_authorized(&lesson().session_id()));

    // The bridge only tracks what it requested; the persistence service
    // owns the stored transition
    let updates = wait_for_updates(&ctx.directory, &lesson().session_id(), 1).await;
    assert_eq!(updates, vec![SessionStatus::InProgress]);
}

#[tokio::test]
async fn test_session_lookup_failure_rejects_join() {
    let directory = MockSessionDirectory::new().with_session(lesson().build());
    directory.fail_fetches(true);
    let ctx = TestContext::new(directory);
    let (mut handler, mut rx) = link(&ctx);

    handler.handle_message(join("alice")).await;

    assert_eq!(
        rx.recv().await,
        ServerMessage::Error {
            message: "An internal error occurred".to_string(),
        }
    );
    assert!(!handler.is_authorized(&lesson().session_id()));
}

// ============================================================================
// Relay
// ============================================================================

#[tokio::test]
async fn test_offer_is_relayed_to_peer_without_echo() {
    let ctx = services();
    let ((mut alice, mut alice_rx), (_bob, mut bob_rx)) = joined_pair(&ctx).await;

    let sdp = SessionDescription::offer("v=0 alice");
    alice
        .handle_message(ClientMessage::Offer {
            session_id: lesson().session_id(),
            sdp: sdp.clone(),
        })
        .await;

    assert_eq!(
        bob_rx.recv().await,
        ServerMessage::Offer {
            session_id: lesson().session_id(),
            from: UserId::from("alice"),
            sdp,
        }
    );
    alice_rx.assert_silent(QUIET).await;
}

#[tokio::test]
async fn test_answer_and_candidates_are_relayed() {
    let ctx = services();
    let ((_alice, mut alice_rx), (mut bob, _bob_rx)) = joined_pair(&ctx).await;

    let candidate = IceCandidate {
        candidate: "candidate:1 1 udp 2122260223 10.0.0.2 54400 typ host".to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_m_line_index: Some(0),
        username_fragment: None,
    };
    bob.handle_message(ClientMessage::Answer {
        session_id: lesson().session_id(),
        sdp: SessionDescription::answer("v=0 bob"),
    })
    .await;
    bob.handle_message(ClientMessage::IceCandidate {
        session_id: lesson().session_id(),
        candidate: candidate.clone(),
    })
    .await;

    assert_eq!(alice_rx.recv().await.kind(), "answer");
    assert_eq!(
        alice_rx.recv().await,
        ServerMessage::IceCandidate {
            session_id: lesson().session_id(),
            from: UserId::from("bob"),
            candidate,
        }
    );
}

#[tokio::test]
async fn test_chat_preserves_sender_order_and_stamps_time() {
    let ctx = services();
    let ((mut alice, _alice_rx), (_bob, mut bob_rx)) = joined_pair(&ctx).await;

    let before = chrono::Utc::now().timestamp_millis();
    for i in 0..20 {
        alice.handle_message(chat(&format!("line {i}"))).await;
    }

    let mut last_at = before;
    for i in 0..20 {
        let ServerMessage::Chat {
            from, message, at, ..
        } = bob_rx.recv().await
        else {
            unreachable!("expected chat");
        };
        assert_eq!(from, UserId::from("alice"));
        assert_eq!(message, format!("line {i}"));
        assert!(at >= last_at);
        last_at = at;
    }
}

#[tokio::test]
async fn test_relay_for_unjoined_session_is_dropped() {
    let ctx = services();
    let ((_alice, mut alice_rx), (_bob, _bob_rx)) = joined_pair(&ctx).await;

    // Authenticated nowhere: never delivered, no reply
    let (mut stranger, mut stranger_rx) = link(&ctx);
    stranger.handle_message(chat("hello?")).await;
    stranger
        .handle_message(ClientMessage::Offer {
            session_id: lesson().session_id(),
            sdp: SessionDescription::offer("v=0"),
        })
        .await;

    alice_rx.assert_silent(QUIET).await;
    stranger_rx.assert_silent(QUIET).await;
}

#[tokio::test]
async fn test_relay_after_leave_is_dropped() {
    let ctx = services();
    let ((mut alice, _alice_rx), (_bob, mut bob_rx)) = joined_pair(&ctx).await;

    alice
        .handle_message(ClientMessage::Leave {
            session_id: lesson().session_id(),
            end_call: false,
        })
        .await;
    assert_eq!(bob_rx.recv().await.kind(), "participant-left");
    assert_eq!(bob_rx.recv().await.kind(), "participants");

    alice.handle_message(chat("still here?")).await;
    bob_rx.assert_silent(QUIET).await;
}

#[tokio::test]
async fn test_malformed_frame_gets_error_reply() {
    let ctx = services();
    let (mut handler, mut rx) = link(&ctx);

    for frame in [
        "not json",
        r#"{"type":"teleport","sessionId":"lesson-1"}"#,
        r#"{"type":"offer","sessionId":"lesson-1"}"#,
    ] {
        handler.handle_text(frame).await;
        assert_eq!(
            rx.recv().await,
            ServerMessage::Error {
                message: MALFORMED_MESSAGE.to_string(),
            }
        );
    }
}

#[tokio::test]
async fn test_text_frame_join_is_parsed() {
    let ctx = services();
    let (mut handler, mut rx) = link(&ctx);

    let frame = serde_json::to_string(&join("bob")).unwrap();
    handler.handle_text(&frame).await;

    assert_eq!(rx.recv().await.kind(), "joined");
}

// ============================================================================
// Leave and disconnect
// ============================================================================

#[tokio::test]
async fn test_leave_with_end_call_completes_session() {
    let ctx = services();
    let ((mut alice, _alice_rx), (_bob, mut bob_rx)) = joined_pair(&ctx).await;

    alice
        .handle_message(ClientMessage::Leave {
            session_id: lesson().session_id(),
            end_call: true,
        })
        .await;

    assert_eq!(bob_rx.recv().await.kind(), "participant-left");
    // The completion request finishes before the leave returns
    assert_eq!(
        ctx.directory.updates_for(&lesson().session_id()),
        vec![SessionStatus::InProgress, SessionStatus::Completed]
    );
}

#[tokio::test]
async fn test_leave_without_end_call_keeps_status() {
    let ctx = services();
    let ((mut alice, _alice_rx), (mut bob, _bob_rx)) = joined_pair(&ctx).await;

    for handler in [&mut alice, &mut bob] {
        handler
            .handle_message(ClientMessage::Leave {
                session_id: lesson().session_id(),
                end_call: false,
            })
            .await;
    }

    tokio::time::sleep(QUIET).await;
    assert_eq!(
        ctx.directory.updates_for(&lesson().session_id()),
        vec![SessionStatus::InProgress]
    );
}

#[tokio::test]
async fn test_leave_without_join_is_silent() {
    let ctx = services();
    let (mut handler, mut rx) = link(&ctx);

    handler
        .handle_message(ClientMessage::Leave {
            session_id: lesson().session_id(),
            end_call: true,
        })
        .await;

    rx.assert_silent(QUIET).await;
    assert!(ctx.directory.status_updates().is_empty());
}

#[tokio::test]
async fn test_disconnect_announces_departure_once() {
    let ctx = services();
    let ((mut alice, mut alice_rx), (_bob, mut bob_rx)) = joined_pair(&ctx).await;

    alice.disconnect().await;
    alice.disconnect().await;

    assert_eq!(
        bob_rx.recv().await,
        ServerMessage::ParticipantLeft {
            session_id: lesson().session_id(),
            identity: UserId::from("alice"),
        }
    );
    assert_eq!(
        bob_rx.recv().await,
        ServerMessage::Participants {
            session_id: lesson().session_id(),
            identities: vec![UserId::from("bob")],
        }
    );
    bob_rx.assert_silent(QUIET).await;

    alice_rx.join().await;
    assert_eq!(alice_rx.close_reason().as_deref(), Some("disconnected"));
}

#[tokio::test]
async fn test_messages_after_disconnect_are_ignored() {
    let ctx = services();
    let ((mut alice, _alice_rx), (_bob, mut bob_rx)) = joined_pair(&ctx).await;

    alice.disconnect().await;
    bob_rx.recv_kind("participants").await;

    alice.handle_message(chat("ghost")).await;
    alice.handle_message(join("alice")).await;

    bob_rx.assert_silent(QUIET).await;
}

#[tokio::test]
async fn test_last_disconnect_empties_room() {
    let ctx = services();
    let ((mut alice, _alice_rx), (mut bob, _bob_rx)) = joined_pair(&ctx).await;

    alice.disconnect().await;
    bob.disconnect().await;

    let mut room_count = usize::MAX;
    for _ in 0..100 {
        room_count = ctx.registry.status().await.unwrap().room_count;
        if room_count == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(room_count, 0);

    // A fresh activation is a no-op for the bridge: in-progress already requested
    let (mut again, mut again_rx) = link(&ctx);
    again.handle_message(join("alice")).await;
    again_rx.recv_kind("participants").await;
    tokio::time::sleep(QUIET).await;
    assert_eq!(
        ctx.directory.updates_for(&lesson().session_id()),
        vec![SessionStatus::InProgress]
    );
}
