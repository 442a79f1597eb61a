//! `RoomRegistryActor` - singleton owner of the session-to-room map.
//!
//! The `RoomRegistryActor` is the top-level actor in the coordinator:
//!
//! - Singleton per coordinator instance
//! - Spawns one `RoomActor` per occupied session, on demand
//! - Enforces the room capacity limit
//! - Owns the root `CancellationToken` for graceful shutdown
//! - Monitors child actor health (panic detection via `JoinHandle`)
//!
//! The registry never touches membership itself. Joins are resolved to a room
//! handle here and then executed by the room, so no lock spans rooms.
//!
//! # Graceful Shutdown
//!
//! 1. `shutdown()` stops room creation (joins to new sessions get `Draining`)
//! 2. Live rooms keep serving until they empty
//! 3. `cancel()` stops the registry and every room

use crate::errors::CoordinatorError;

use super::connection::ConnectionActorHandle;
use super::messages::{JoinOutcome, LeaveOutcome, RegistryMessage, RegistryStatus, RoomEvent};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::room::{RoomActor, RoomActorHandle};
use crate::observability::metrics as prom;

use common::types::{ConnectionId, SessionId, UserId};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// A join racing a room's close is retried against a fresh room.
const MAX_JOIN_ATTEMPTS: usize = 3;

/// Per-room wait when the registry is cancelled.
const ROOM_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the `RoomRegistryActor`.
///
/// This is the public interface for room membership.
/// All methods are async and return results via oneshot channels.
#[derive(Clone)]
pub struct RoomRegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RoomRegistryHandle {
    /// Create a new `RoomRegistryActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    ///
    /// # Arguments
    ///
    /// * `sc_id` - Coordinator instance ID
    /// * `max_rooms` - Upper bound on live rooms
    /// * `events` - Room transition sink, normally the status bridge
    /// * `metrics` - Shared actor metrics
    #[must_use]
    pub fn new(
        sc_id: String,
        max_rooms: usize,
        events: mpsc::UnboundedSender<RoomEvent>,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomRegistryActor {
            mailbox: MailboxMonitor::new(ActorType::Registry, &sc_id),
            sc_id,
            receiver,
            self_sender: sender.clone(),
            cancel_token: cancel_token.clone(),
            rooms: HashMap::new(),
            next_room_id: 1,
            max_rooms,
            accepting_new: true,
            events,
            metrics,
        };

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Join `identity` to the session's room, creating the room if needed.
    ///
    /// A join that lands on a room in the middle of closing is retried
    /// against a fresh room, which counts as a new activation.
    pub async fn join(
        &self,
        session_id: SessionId,
        identity: UserId,
        connection: ConnectionActorHandle,
    ) -> Result<JoinOutcome, CoordinatorError> {
        let mut last_error = None;

        for attempt in 1..=MAX_JOIN_ATTEMPTS {
            let room = self.get_or_create_room(session_id.clone()).await?;
            match room.join(identity.clone(), connection.clone()).await {
                Ok(join) => {
                    return Ok(JoinOutcome {
                        members: join.members,
                        became_active: join.became_active,
                        newly_joined: join.newly_joined,
                        room,
                    });
                }
                Err(e) if matches!(e, CoordinatorError::RoomClosed(_)) || room.is_closed() => {
                    debug!(
                        target: "sc.actor.registry",
                        session_id = %session_id,
                        attempt,
                        error = %e,
                        "Room closed during join, retrying"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| CoordinatorError::RoomClosed(session_id.to_string())))
    }

    /// Remove `identity` from the session's room entirely.
    ///
    /// Returns an unchanged outcome when no room exists.
    pub async fn leave(
        &self,
        session_id: SessionId,
        identity: UserId,
    ) -> Result<LeaveOutcome, CoordinatorError> {
        match self.get_room(session_id).await? {
            Some(room) => Ok(room
                .leave(identity)
                .await
                .unwrap_or_else(|_| LeaveOutcome::unchanged(BTreeSet::new()))),
            None => Ok(LeaveOutcome::unchanged(BTreeSet::new())),
        }
    }

    /// Disconnect cleanup for one connection of `identity`.
    pub async fn connection_closed(
        &self,
        session_id: SessionId,
        identity: UserId,
        connection_id: ConnectionId,
    ) -> Result<LeaveOutcome, CoordinatorError> {
        match self.get_room(session_id).await? {
            Some(room) => Ok(room
                .connection_closed(identity, connection_id)
                .await
                .unwrap_or_else(|_| LeaveOutcome::unchanged(BTreeSet::new()))),
            None => Ok(LeaveOutcome::unchanged(BTreeSet::new())),
        }
    }

    /// Current members of the session's room; empty when there is no room.
    pub async fn members(&self, session_id: SessionId) -> Result<BTreeSet<UserId>, CoordinatorError> {
        match self.get_room(session_id).await? {
            Some(room) => Ok(room.members().await.unwrap_or_default()),
            None => Ok(BTreeSet::new()),
        }
    }

    /// Get the current registry status.
    pub async fn status(&self) -> Result<RegistryStatus, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetStatus { respond_to: tx })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))
    }

    /// Stop creating rooms.
    pub async fn shutdown(&self) -> Result<(), CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::Shutdown { respond_to: tx })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that must stop with the registry.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn get_or_create_room(
        &self,
        session_id: SessionId,
    ) -> Result<RoomActorHandle, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetOrCreateRoom {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))?
    }

    async fn get_room(
        &self,
        session_id: SessionId,
    ) -> Result<Option<RoomActorHandle>, CoordinatorError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RegistryMessage::GetRoom {
                session_id,
                respond_to: tx,
            })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;

        rx.await
            .map_err(|e| CoordinatorError::Internal(format!("response receive failed: {e}")))
    }
}

/// Internal state for a managed room.
struct ManagedRoom {
    /// Handle to the room actor.
    handle: RoomActorHandle,
    /// Join handle for monitoring the actor task.
    task_handle: JoinHandle<()>,
}

impl ManagedRoom {
    /// A room that closed its mailbox or exited cannot take joins.
    fn is_live(&self) -> bool {
        !self.handle.is_closed() && !self.task_handle.is_finished()
    }
}

/// The `RoomRegistryActor` implementation.
///
/// This struct owns the actor state and runs the message loop.
pub struct RoomRegistryActor {
    /// Coordinator instance ID.
    sc_id: String,
    /// Message receiver.
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Given to rooms so they can report emptying.
    self_sender: mpsc::Sender<RegistryMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    /// Live rooms by session.
    rooms: HashMap<SessionId, ManagedRoom>,
    /// Next room activation id.
    next_room_id: u64,
    /// Capacity limit.
    max_rooms: usize,
    /// Whether new rooms may be created.
    accepting_new: bool,
    /// Room transition sink.
    events: mpsc::UnboundedSender<RoomEvent>,
    /// Shared metrics.
    metrics: Arc<ActorMetrics>,
    /// Mailbox monitor.
    mailbox: MailboxMonitor,
}

impl RoomRegistryActor {
    /// Run the actor message loop.
    #[instrument(skip_all, name = "sc.actor.registry", fields(sc_id = %self.sc_id))]
    async fn run(mut self) {
        info!(
            target: "sc.actor.registry",
            sc_id = %self.sc_id,
            max_rooms = self.max_rooms,
            "RoomRegistryActor started"
        );

        loop {
            // Check for terminated room actors
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "sc.actor.registry",
                        sc_id = %self.sc_id,
                        "RoomRegistryActor received cancellation signal"
                    );
                    self.graceful_shutdown().await;
                    break;
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
        }

        info!(
            target: "sc.actor.registry",
            sc_id = %self.sc_id,
            rooms_remaining = self.rooms.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomRegistryActor stopped"
        );
    }

    /// Handle a single message.
    fn handle_message(&mut self, message: RegistryMessage) {
        match message {
            RegistryMessage::GetOrCreateRoom {
                session_id,
                respond_to,
            } => {
                let result = self.get_or_create_room(session_id);
                let _ = respond_to.send(result);
            }

            RegistryMessage::GetRoom {
                session_id,
                respond_to,
            } => {
                let room = self
                    .rooms
                    .get(&session_id)
                    .filter(|managed| managed.is_live())
                    .map(|managed| managed.handle.clone());
                let _ = respond_to.send(room);
            }

            RegistryMessage::RoomEmptied {
                session_id,
                room_id,
            } => {
                let current = self
                    .rooms
                    .get(&session_id)
                    .is_some_and(|managed| managed.handle.room_id() == room_id);
                if current {
                    self.remove_room(&session_id);
                }
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            RegistryMessage::Shutdown { respond_to } => {
                info!(
                    target: "sc.actor.registry",
                    sc_id = %self.sc_id,
                    room_count = self.rooms.len(),
                    "Draining: no new rooms will be created"
                );
                self.accepting_new = false;
                let _ = respond_to.send(());
            }
        }
    }

    fn get_or_create_room(
        &mut self,
        session_id: SessionId,
    ) -> Result<RoomActorHandle, CoordinatorError> {
        match self.rooms.get(&session_id) {
            Some(managed) if managed.is_live() => return Ok(managed.handle.clone()),
            Some(_) => {
                // Closing room: its RoomEmptied will no longer match
                self.remove_room(&session_id);
            }
            None => {}
        }

        if !self.accepting_new {
            return Err(CoordinatorError::Draining);
        }

        if self.rooms.len() >= self.max_rooms {
            warn!(
                target: "sc.actor.registry",
                sc_id = %self.sc_id,
                max_rooms = self.max_rooms,
                "Room capacity reached"
            );
            return Err(CoordinatorError::CapacityExceeded);
        }

        let room_id = self.next_room_id;
        self.next_room_id += 1;

        let (handle, task_handle) = RoomActor::spawn(
            session_id.clone(),
            room_id,
            self.cancel_token.child_token(),
            self.events.clone(),
            self.self_sender.clone(),
            Arc::clone(&self.metrics),
        );

        self.rooms.insert(
            session_id.clone(),
            ManagedRoom {
                handle: handle.clone(),
                task_handle,
            },
        );
        self.metrics.room_created();

        debug!(
            target: "sc.actor.registry",
            sc_id = %self.sc_id,
            session_id = %session_id,
            room_id,
            room_count = self.rooms.len(),
            "Room created"
        );

        Ok(handle)
    }

    fn remove_room(&mut self, session_id: &SessionId) {
        if let Some(managed) = self.rooms.remove(session_id) {
            self.metrics.room_removed();
            debug!(
                target: "sc.actor.registry",
                sc_id = %self.sc_id,
                session_id = %session_id,
                room_id = managed.handle.room_id(),
                room_count = self.rooms.len(),
                "Room removed"
            );
        }
    }

    /// Get current status.
    fn get_status(&self) -> RegistryStatus {
        let mailbox_depth = self.mailbox.current_depth();
        prom::set_actor_mailbox_depth(ActorType::Registry.as_str(), mailbox_depth);
        RegistryStatus {
            room_count: self.rooms.len(),
            is_draining: !self.accepting_new,
            mailbox_depth,
        }
    }

    /// Perform graceful shutdown.
    async fn graceful_shutdown(&mut self) {
        info!(
            target: "sc.actor.registry",
            sc_id = %self.sc_id,
            room_count = self.rooms.len(),
            "Performing graceful shutdown"
        );

        self.accepting_new = false;

        // Cancel all room actors (already done via parent token, but be explicit)
        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        for (session_id, managed) in self.rooms.drain() {
            match tokio::time::timeout(ROOM_SHUTDOWN_TIMEOUT, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "sc.actor.registry",
                        session_id = %session_id,
                        "Room actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "sc.actor.registry",
                        session_id = %session_id,
                        error = ?e,
                        "Room actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    warn!(
                        target: "sc.actor.registry",
                        session_id = %session_id,
                        "Room actor shutdown timed out"
                    );
                }
            }
            self.metrics.room_removed();
        }

        info!(
            target: "sc.actor.registry",
            sc_id = %self.sc_id,
            "Graceful shutdown complete"
        );
    }

    /// Check health of managed room actors.
    async fn check_room_health(&mut self) {
        let finished: Vec<SessionId> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(session_id, _)| session_id.clone())
            .collect();

        for session_id in finished {
            if let Some(managed) = self.rooms.remove(&session_id) {
                match managed.task_handle.await {
                    Ok(()) => {
                        debug!(
                            target: "sc.actor.registry",
                            sc_id = %self.sc_id,
                            session_id = %session_id,
                            "Room actor exited"
                        );
                    }
                    Err(join_error) => {
                        if join_error.is_panic() {
                            error!(
                                target: "sc.actor.registry",
                                sc_id = %self.sc_id,
                                session_id = %session_id,
                                error = ?join_error,
                                "Room actor panicked"
                            );
                            self.metrics.record_panic(ActorType::Room);
                        }
                    }
                }

                self.metrics.room_removed();
            }
        }
    }
}
