//! `RoomActor` - per-session actor that owns room membership.
//!
//! Each `RoomActor`:
//! - Owns the member set for one session (identity -> live connections)
//! - Serializes join, leave and relay for that session
//! - Emits `BecameActive` / `BecameEmpty` on member-count transitions
//!
//! # Emptying
//!
//! When the last member goes, the room emits `BecameEmpty`, closes its
//! mailbox, answers anything still queued (joins get `RoomClosed`) and exits.
//! The registry then spawns a fresh room for the next join, which is a new
//! activation.

use crate::errors::CoordinatorError;
use crate::observability::metrics as prom;

use super::connection::ConnectionActorHandle;
use super::messages::{
    LeaveOutcome, RegistryMessage, RelayPayload, RoomEvent, RoomJoin, RoomMessage,
};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::protocol::ServerMessage;
use common::types::{ConnectionId, SessionId, UserId};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// How often the room prunes connections whose actors have stopped.
const CONNECTION_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Handle to a `RoomActor`.
#[derive(Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    session_id: SessionId,
    room_id: u64,
}

impl fmt::Debug for RoomActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomActorHandle")
            .field("session_id", &self.session_id)
            .field("room_id", &self.room_id)
            .finish_non_exhaustive()
    }
}

impl RoomActorHandle {
    /// Get the session ID.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Registry-assigned id, unique per activation.
    #[must_use]
    pub fn room_id(&self) -> u64 {
        self.room_id
    }

    /// Add `identity` through `connection`.
    ///
    /// Fails with `RoomClosed` if the room emptied before handling the join.
    pub async fn join(
        &self,
        identity: UserId,
        connection: ConnectionActorHandle,
    ) -> Result<RoomJoin, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::Join {
                identity,
                connection,
                respond_to: tx,
            })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))?
    }

    /// Remove `identity` and all of its connections.
    pub async fn leave(&self, identity: UserId) -> Result<LeaveOutcome, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::Leave {
                identity,
                respond_to: tx,
            })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))
    }

    /// Drop one connection of `identity`.
    pub async fn connection_closed(
        &self,
        identity: UserId,
        connection_id: ConnectionId,
    ) -> Result<LeaveOutcome, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::ConnectionClosed {
                identity,
                connection_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))
    }

    /// Relay a signaling payload from `from` to the other members.
    pub async fn relay(&self, from: UserId, payload: RelayPayload) -> Result<(), CoordinatorError> {
        self.sender
            .send(RoomMessage::Relay { from, payload })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))
    }

    /// Snapshot the current members.
    pub async fn members(&self) -> Result<BTreeSet<UserId>, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RoomMessage::GetMembers { respond_to: tx })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))
    }

    /// True once the room has stopped accepting messages.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Cancel the room actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the room has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    session_id: SessionId,
    room_id: u64,
    receiver: mpsc::Receiver<RoomMessage>,
    cancel_token: CancellationToken,
    /// Members and the connections each is present through.
    members: BTreeMap<UserId, HashMap<ConnectionId, ConnectionActorHandle>>,
    /// Set by the first join; a room only closes after it has been occupied.
    activated: bool,
    events: mpsc::UnboundedSender<RoomEvent>,
    registry: mpsc::Sender<RegistryMessage>,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomActor {
    /// Spawn a new room actor.
    ///
    /// Returns a handle and the task join handle.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Session this room serves
    /// * `room_id` - Registry-assigned id distinguishing activations
    /// * `cancel_token` - Cancellation token (child of the registry's token)
    /// * `events` - Sink for `BecameActive` / `BecameEmpty`
    /// * `registry` - Registry mailbox, notified when the room empties
    /// * `metrics` - Shared actor metrics
    pub fn spawn(
        session_id: SessionId,
        room_id: u64,
        cancel_token: CancellationToken,
        events: mpsc::UnboundedSender<RoomEvent>,
        registry: mpsc::Sender<RegistryMessage>,
        metrics: Arc<ActorMetrics>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);

        let actor = Self {
            session_id: session_id.clone(),
            room_id,
            receiver,
            cancel_token: cancel_token.clone(),
            members: BTreeMap::new(),
            activated: false,
            events,
            registry,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Room, session_id.as_str()),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            session_id,
            room_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "sc.actor.room",
        fields(session_id = %self.session_id, room_id = self.room_id)
    )]
    async fn run(mut self) {
        debug!(
            target: "sc.actor.room",
            session_id = %self.session_id,
            room_id = self.room_id,
            "RoomActor started"
        );

        let mut sweep = tokio::time::interval(CONNECTION_SWEEP_INTERVAL);

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    debug!(
                        target: "sc.actor.room",
                        session_id = %self.session_id,
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                _ = sweep.tick() => {
                    self.sweep_closed_connections();
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            self.mailbox.record_enqueue();
                            self.handle_message(message);
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                        }
                        None => break,
                    }
                }
            }

            if self.activated && self.members.is_empty() {
                self.close_empty_room().await;
                break;
            }
        }

        debug!(
            target: "sc.actor.room",
            session_id = %self.session_id,
            room_id = self.room_id,
            members = self.members.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Join {
                identity,
                connection,
                respond_to,
            } => {
                let result = self.handle_join(identity, connection);
                let _ = respond_to.send(Ok(result));
            }

            RoomMessage::Leave {
                identity,
                respond_to,
            } => {
                let outcome = self.handle_leave(&identity);
                let _ = respond_to.send(outcome);
            }

            RoomMessage::ConnectionClosed {
                identity,
                connection_id,
                respond_to,
            } => {
                let outcome = self.handle_connection_closed(&identity, connection_id);
                let _ = respond_to.send(outcome);
            }

            RoomMessage::Relay { from, payload } => {
                self.handle_relay(&from, payload);
            }

            RoomMessage::GetMembers { respond_to } => {
                let _ = respond_to.send(self.member_set());
            }
        }
    }

    fn handle_join(&mut self, identity: UserId, connection: ConnectionActorHandle) -> RoomJoin {
        let became_active = self.members.is_empty();
        let newly_joined = !self.members.contains_key(&identity);

        self.members
            .entry(identity.clone())
            .or_default()
            .insert(connection.connection_id(), connection.clone());

        if became_active {
            self.activated = true;
            self.metrics.room_activated();
            let _ = self.events.send(RoomEvent::BecameActive {
                session_id: self.session_id.clone(),
            });
            info!(
                target: "sc.actor.room",
                session_id = %self.session_id,
                identity = %identity,
                "Room became active"
            );
        }

        debug!(
            target: "sc.actor.room",
            session_id = %self.session_id,
            identity = %identity,
            connection_id = %connection.connection_id(),
            newly_joined,
            members = self.members.len(),
            "Member joined"
        );

        // Ack goes first so the joiner sees `joined` before `participants`
        connection.try_deliver(ServerMessage::Joined {
            session_id: self.session_id.clone(),
            identity: identity.clone(),
        });

        if newly_joined {
            self.send_to_others(
                &identity,
                &ServerMessage::ParticipantJoined {
                    session_id: self.session_id.clone(),
                    identity: identity.clone(),
                },
            );
        }

        self.broadcast_participants();

        RoomJoin {
            members: self.member_set(),
            became_active,
            newly_joined,
        }
    }

    fn handle_leave(&mut self, identity: &UserId) -> LeaveOutcome {
        if self.members.remove(identity).is_none() {
            return LeaveOutcome::unchanged(self.member_set());
        }
        self.announce_departure(identity);
        LeaveOutcome {
            removed: true,
            remaining: self.member_set(),
        }
    }

    fn handle_connection_closed(
        &mut self,
        identity: &UserId,
        connection_id: ConnectionId,
    ) -> LeaveOutcome {
        let now_empty = match self.members.get_mut(identity) {
            Some(connections) => {
                connections.remove(&connection_id);
                connections.is_empty()
            }
            None => return LeaveOutcome::unchanged(self.member_set()),
        };

        if !now_empty {
            return LeaveOutcome::unchanged(self.member_set());
        }

        self.members.remove(identity);
        self.announce_departure(identity);
        LeaveOutcome {
            removed: true,
            remaining: self.member_set(),
        }
    }

    fn handle_relay(&self, from: &UserId, payload: RelayPayload) {
        if !self.members.contains_key(from) {
            debug!(
                target: "sc.actor.room",
                session_id = %self.session_id,
                from = %from,
                kind = payload.kind(),
                "Dropping relay from non-member"
            );
            prom::record_relay_dropped("not_member");
            return;
        }

        let kind = payload.kind();
        let session_id = self.session_id.clone();
        let from_id = from.clone();
        let message = match payload {
            RelayPayload::Offer(sdp) => ServerMessage::Offer {
                session_id,
                from: from_id,
                sdp,
            },
            RelayPayload::Answer(sdp) => ServerMessage::Answer {
                session_id,
                from: from_id,
                sdp,
            },
            RelayPayload::IceCandidate(candidate) => ServerMessage::IceCandidate {
                session_id,
                from: from_id,
                candidate,
            },
            RelayPayload::Chat(message) => ServerMessage::Chat {
                session_id,
                from: from_id,
                message,
                at: chrono::Utc::now().timestamp_millis(),
            },
        };

        self.send_to_others(from, &message);
        prom::record_relay(kind);
    }

    /// Remove connections whose actors have stopped without a disconnect.
    fn sweep_closed_connections(&mut self) {
        let mut departed = Vec::new();

        for (identity, connections) in &mut self.members {
            connections.retain(|_, handle| !handle.is_closed());
            if connections.is_empty() {
                departed.push(identity.clone());
            }
        }

        for identity in departed {
            debug!(
                target: "sc.actor.room",
                session_id = %self.session_id,
                identity = %identity,
                "Pruning member with no live connections"
            );
            self.members.remove(&identity);
            self.announce_departure(&identity);
        }
    }

    fn announce_departure(&self, identity: &UserId) {
        debug!(
            target: "sc.actor.room",
            session_id = %self.session_id,
            identity = %identity,
            remaining = self.members.len(),
            "Member left"
        );

        self.send_to_others(
            identity,
            &ServerMessage::ParticipantLeft {
                session_id: self.session_id.clone(),
                identity: identity.clone(),
            },
        );
        self.broadcast_participants();
    }

    /// Send to every connection of every member except `except`.
    fn send_to_others(&self, except: &UserId, message: &ServerMessage) {
        for (identity, connections) in &self.members {
            if identity == except {
                continue;
            }
            for connection in connections.values() {
                connection.try_deliver(message.clone());
            }
        }
    }

    /// Send the full member list to everyone, including the subject of the change.
    fn broadcast_participants(&self) {
        let message = ServerMessage::Participants {
            session_id: self.session_id.clone(),
            identities: self.members.keys().cloned().collect(),
        };
        for connection in self.members.values().flat_map(HashMap::values) {
            connection.try_deliver(message.clone());
        }
    }

    fn member_set(&self) -> BTreeSet<UserId> {
        self.members.keys().cloned().collect()
    }

    /// Emit `BecameEmpty`, refuse queued work, and tell the registry.
    async fn close_empty_room(&mut self) {
        let _ = self.events.send(RoomEvent::BecameEmpty {
            session_id: self.session_id.clone(),
        });
        info!(
            target: "sc.actor.room",
            session_id = %self.session_id,
            room_id = self.room_id,
            "Room became empty"
        );

        self.receiver.close();
        while let Some(message) = self.receiver.recv().await {
            match message {
                RoomMessage::Join { respond_to, .. } => {
                    let _ = respond_to.send(Err(CoordinatorError::RoomClosed(
                        self.session_id.to_string(),
                    )));
                }
                RoomMessage::Leave { respond_to, .. }
                | RoomMessage::ConnectionClosed { respond_to, .. } => {
                    let _ = respond_to.send(LeaveOutcome::unchanged(BTreeSet::new()));
                }
                RoomMessage::GetMembers { respond_to } => {
                    let _ = respond_to.send(BTreeSet::new());
                }
                RoomMessage::Relay { payload, .. } => {
                    prom::record_relay_dropped("no_room");
                    debug!(
                        target: "sc.actor.room",
                        session_id = %self.session_id,
                        kind = payload.kind(),
                        "Dropping relay queued behind room close"
                    );
                }
            }
        }

        let _ = self
            .registry
            .send(RegistryMessage::RoomEmptied {
                session_id: self.session_id.clone(),
                room_id: self.room_id,
            })
            .await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::connection::{ConnectionActor, MessageSink};
    use common::protocol::SessionDescription;

    struct ChannelSink(mpsc::UnboundedSender<ServerMessage>);

    #[async_trait::async_trait]
    impl MessageSink for ChannelSink {
        async fn send(&mut self, message: &ServerMessage) -> Result<(), CoordinatorError> {
            let _ = self.0.send(message.clone());
            Ok(())
        }

        async fn ping(&mut self) -> Result<(), CoordinatorError> {
            Ok(())
        }

        async fn close(&mut self, _reason: &str) {}
    }

    fn connection(
        metrics: &Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (handle, _task) = ConnectionActor::spawn(
            ConnectionId::new(),
            Box::new(ChannelSink(tx)),
            64,
            Duration::from_secs(15),
            CancellationToken::new(),
            Arc::clone(metrics),
        );
        (handle, rx)
    }

    struct Room {
        handle: RoomActorHandle,
        task: JoinHandle<()>,
        events: mpsc::UnboundedReceiver<RoomEvent>,
        registry: mpsc::Receiver<RegistryMessage>,
        metrics: Arc<ActorMetrics>,
    }

    fn spawn_room() -> Room {
        let metrics = ActorMetrics::new();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (registry_tx, registry) = mpsc::channel(8);
        let (handle, task) = RoomActor::spawn(
            SessionId::from("sess-1"),
            1,
            CancellationToken::new(),
            events_tx,
            registry_tx,
            Arc::clone(&metrics),
        );
        Room {
            handle,
            task,
            events,
            registry,
            metrics,
        }
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("connection closed")
    }

    fn ids(names: &[&str]) -> Vec<UserId> {
        names.iter().map(|n| UserId::from(*n)).collect()
    }

    #[tokio::test]
    async fn test_first_join_activates_room() {
        let mut room = spawn_room();
        let (conn, mut rx) = connection(&room.metrics);

        let join = room.handle.join(UserId::from("alice"), conn).await.unwrap();

        assert!(join.became_active);
        assert!(join.newly_joined);
        assert_eq!(join.members.len(), 1);
        assert_eq!(
            room.events.recv().await.unwrap(),
            RoomEvent::BecameActive {
                session_id: SessionId::from("sess-1")
            }
        );
        assert_eq!(room.metrics.activation_count(), 1);

        assert!(matches!(next(&mut rx).await, ServerMessage::Joined { .. }));
        let ServerMessage::Participants { identities, .. } = next(&mut rx).await else {
            unreachable!("expected participants")
        };
        assert_eq!(identities, ids(&["alice"]));
    }

    #[tokio::test]
    async fn test_repeat_join_is_idempotent() {
        let mut room = spawn_room();
        let (conn, mut rx) = connection(&room.metrics);

        room.handle
            .join(UserId::from("alice"), conn.clone())
            .await
            .unwrap();
        let again = room.handle.join(UserId::from("alice"), conn).await.unwrap();

        assert!(!again.became_active);
        assert!(!again.newly_joined);
        assert_eq!(again.members.len(), 1);

        // Second join still acks and re-sends participants
        let _ = next(&mut rx).await;
        let _ = next(&mut rx).await;
        assert!(matches!(next(&mut rx).await, ServerMessage::Joined { .. }));
        assert!(matches!(
            next(&mut rx).await,
            ServerMessage::Participants { .. }
        ));

        room.events.recv().await.unwrap();
        assert!(room.events.try_recv().is_err(), "only one activation");
    }

    #[tokio::test]
    async fn test_second_member_notifies_first() {
        let room = spawn_room();
        let (conn_b, mut rx_b) = connection(&room.metrics);
        let (conn_a, _rx_a) = connection(&room.metrics);

        room.handle.join(UserId::from("bob"), conn_b).await.unwrap();
        let join = room.handle.join(UserId::from("alice"), conn_a).await.unwrap();
        assert!(!join.became_active);
        assert_eq!(join.members.into_iter().collect::<Vec<_>>(), ids(&["alice", "bob"]));

        let _ = next(&mut rx_b).await; // joined
        let _ = next(&mut rx_b).await; // participants [bob]
        let ServerMessage::ParticipantJoined { identity, .. } = next(&mut rx_b).await else {
            unreachable!("expected participant-joined")
        };
        assert_eq!(identity, UserId::from("alice"));
        let ServerMessage::Participants { identities, .. } = next(&mut rx_b).await else {
            unreachable!("expected participants")
        };
        assert_eq!(identities, ids(&["alice", "bob"]));
    }

    #[tokio::test]
    async fn test_relay_reaches_others_without_echo() {
        let room = spawn_room();
        let (conn_a, mut rx_a) = connection(&room.metrics);
        let (conn_b, mut rx_b) = connection(&room.metrics);

        room.handle.join(UserId::from("alice"), conn_a).await.unwrap();
        room.handle.join(UserId::from("bob"), conn_b).await.unwrap();

        room.handle
            .relay(
                UserId::from("alice"),
                RelayPayload::Offer(SessionDescription::offer("v=0")),
            )
            .await
            .unwrap();
        room.handle
            .relay(UserId::from("alice"), RelayPayload::Chat("hi".to_string()))
            .await
            .unwrap();
        // Barrier: the room has processed both relays once this returns
        room.handle.members().await.unwrap();

        // bob: joined, participants, then offer, chat
        let _ = next(&mut rx_b).await;
        let _ = next(&mut rx_b).await;
        let ServerMessage::Offer { from, sdp, .. } = next(&mut rx_b).await else {
            unreachable!("expected offer")
        };
        assert_eq!(from, UserId::from("alice"));
        assert_eq!(sdp.sdp, "v=0");
        let ServerMessage::Chat { message, at, .. } = next(&mut rx_b).await else {
            unreachable!("expected chat")
        };
        assert_eq!(message, "hi");
        assert!(at > 0);

        // alice: joined, participants, participant-joined, participants; no echo
        for _ in 0..4 {
            let _ = next(&mut rx_a).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_relay_from_non_member_dropped() {
        let room = spawn_room();
        let (conn_a, mut rx_a) = connection(&room.metrics);
        room.handle.join(UserId::from("alice"), conn_a).await.unwrap();

        room.handle
            .relay(UserId::from("mallory"), RelayPayload::Chat("x".to_string()))
            .await
            .unwrap();
        room.handle.members().await.unwrap();

        let _ = next(&mut rx_a).await;
        let _ = next(&mut rx_a).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_extra_connection_keeps_identity_present() {
        let room = spawn_room();
        let (conn_1, _rx_1) = connection(&room.metrics);
        let (conn_2, _rx_2) = connection(&room.metrics);
        let (conn_b, _rx_b) = connection(&room.metrics);
        let first_id = conn_1.connection_id();

        room.handle.join(UserId::from("alice"), conn_1).await.unwrap();
        room.handle.join(UserId::from("alice"), conn_2).await.unwrap();
        room.handle.join(UserId::from("bob"), conn_b).await.unwrap();

        let outcome = room
            .handle
            .connection_closed(UserId::from("alice"), first_id)
            .await
            .unwrap();
        assert!(!outcome.removed);
        assert_eq!(outcome.remaining.len(), 2);
    }

    #[tokio::test]
    async fn test_leave_notifies_remaining_member() {
        let room = spawn_room();
        let (conn_a, _rx_a) = connection(&room.metrics);
        let (conn_b, mut rx_b) = connection(&room.metrics);

        room.handle.join(UserId::from("alice"), conn_a).await.unwrap();
        room.handle.join(UserId::from("bob"), conn_b).await.unwrap();

        let outcome = room.handle.leave(UserId::from("alice")).await.unwrap();
        assert!(outcome.removed);
        assert_eq!(outcome.remaining.into_iter().collect::<Vec<_>>(), ids(&["bob"]));

        let again = room.handle.leave(UserId::from("alice")).await.unwrap();
        assert!(!again.removed, "leave is idempotent");

        let _ = next(&mut rx_b).await; // joined
        let _ = next(&mut rx_b).await; // participants [bob]
        let ServerMessage::ParticipantLeft { identity, .. } = next(&mut rx_b).await else {
            unreachable!("expected participant-left")
        };
        assert_eq!(identity, UserId::from("alice"));
        let ServerMessage::Participants { identities, .. } = next(&mut rx_b).await else {
            unreachable!("expected participants")
        };
        assert_eq!(identities, ids(&["bob"]));
    }

    #[tokio::test]
    async fn test_last_leave_closes_room() {
        let mut room = spawn_room();
        let (conn, _rx) = connection(&room.metrics);

        room.handle.join(UserId::from("alice"), conn).await.unwrap();
        room.handle.leave(UserId::from("alice")).await.unwrap();

        room.task.await.unwrap();
        assert!(room.handle.is_closed());

        assert!(matches!(
            room.events.recv().await.unwrap(),
            RoomEvent::BecameActive { .. }
        ));
        assert!(matches!(
            room.events.recv().await.unwrap(),
            RoomEvent::BecameEmpty { .. }
        ));
        assert!(matches!(
            room.registry.recv().await.unwrap(),
            RegistryMessage::RoomEmptied { room_id: 1, .. }
        ));

        let (conn, _rx) = connection(&room.metrics);
        let err = room.handle.join(UserId::from("alice"), conn).await;
        assert!(err.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_prunes_stopped_connections() {
        let room = spawn_room();
        let (conn_a, _rx_a) = connection(&room.metrics);
        let (conn_b, _rx_b) = connection(&room.metrics);

        room.handle
            .join(UserId::from("alice"), conn_a.clone())
            .await
            .unwrap();
        room.handle.join(UserId::from("bob"), conn_b).await.unwrap();

        conn_a.cancel();
        tokio::time::sleep(CONNECTION_SWEEP_INTERVAL * 2).await;

        let members = room.handle.members().await.unwrap();
        assert_eq!(members.into_iter().collect::<Vec<_>>(), ids(&["bob"]));
    }
}
