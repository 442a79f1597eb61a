//! `ConnectionActor` - per-transport-link outbound actor.
//!
//! Each `ConnectionActor`:
//! - Owns the write half of exactly one client link
//! - Drains a bounded outbound mailbox in FIFO order
//! - Pings the client on a fixed interval so idle links are detected
//!
//! Rooms deliver with [`ConnectionActorHandle::try_deliver`], which never
//! waits: a full or closed mailbox drops the message for this recipient only.
//!
//! # Lifecycle
//!
//! 1. Spawned when the transport accepts a link
//! 2. Runs until closed, cancelled, or the sink fails
//! 3. Once stopped, further deliveries are dropped silently

use crate::errors::CoordinatorError;
use crate::observability::metrics as prom;

use super::messages::ConnectionMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::protocol::ServerMessage;
use common::types::ConnectionId;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Write side of a client link.
///
/// Implemented by the WebSocket transport and by in-memory test sinks.
#[async_trait::async_trait]
pub trait MessageSink: Send {
    /// Write one message to the client.
    async fn send(&mut self, message: &ServerMessage) -> Result<(), CoordinatorError>;

    /// Send a liveness probe.
    async fn ping(&mut self) -> Result<(), CoordinatorError>;

    /// Close the link. Errors are ignored; the link is going away regardless.
    async fn close(&mut self, reason: &str);
}

/// Handle to a `ConnectionActor`.
#[derive(Clone)]
pub struct ConnectionActorHandle {
    sender: mpsc::Sender<ConnectionMessage>,
    cancel_token: CancellationToken,
    connection_id: ConnectionId,
    mailbox: Arc<MailboxMonitor>,
}

impl fmt::Debug for ConnectionActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionActorHandle")
            .field("connection_id", &self.connection_id)
            .finish_non_exhaustive()
    }
}

impl ConnectionActorHandle {
    /// Get the connection ID.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue a message without waiting.
    ///
    /// Returns false when the message was dropped (mailbox full or actor gone).
    pub fn try_deliver(&self, message: ServerMessage) -> bool {
        match self.sender.try_send(ConnectionMessage::Deliver { message }) {
            Ok(()) => {
                self.mailbox.record_enqueue();
                true
            }
            Err(TrySendError::Full(_)) => {
                self.mailbox.record_drop();
                prom::record_outbound_dropped();
                false
            }
            Err(TrySendError::Closed(_)) => {
                prom::record_outbound_dropped();
                false
            }
        }
    }

    /// Queue a message, waiting for mailbox space.
    ///
    /// Used for replies to the connection's own requests, which must not be lost.
    pub async fn deliver(&self, message: ServerMessage) -> Result<(), CoordinatorError> {
        self.sender
            .send(ConnectionMessage::Deliver { message })
            .await
            .map_err(|e| CoordinatorError::Internal(format!("channel send failed: {e}")))?;
        self.mailbox.record_enqueue();
        Ok(())
    }

    /// Ask the actor to close the link after flushing queued messages.
    pub async fn close(&self, reason: impl Into<String>) {
        let _ = self
            .sender
            .send(ConnectionMessage::Close {
                reason: reason.into(),
            })
            .await;
    }

    /// Cancel the connection actor.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// True once the actor has stopped receiving.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// The `ConnectionActor` implementation.
pub struct ConnectionActor {
    connection_id: ConnectionId,
    sink: Box<dyn MessageSink>,
    receiver: mpsc::Receiver<ConnectionMessage>,
    cancel_token: CancellationToken,
    ping_interval: Duration,
    metrics: Arc<ActorMetrics>,
    mailbox: Arc<MailboxMonitor>,
}

impl ConnectionActor {
    /// Spawn a new connection actor.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        connection_id: ConnectionId,
        sink: Box<dyn MessageSink>,
        outbound_buffer: usize,
        ping_interval: Duration,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> (ConnectionActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(outbound_buffer.max(1));
        let mailbox = Arc::new(MailboxMonitor::new(
            ActorType::Connection,
            connection_id.to_string(),
        ));

        metrics.connection_created();

        let actor = Self {
            connection_id,
            sink,
            receiver,
            cancel_token: cancel_token.clone(),
            ping_interval,
            metrics,
            mailbox: Arc::clone(&mailbox),
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = ConnectionActorHandle {
            sender,
            cancel_token,
            connection_id,
            mailbox,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(
        skip_all,
        name = "sc.actor.connection",
        fields(connection_id = %self.connection_id)
    )]
    async fn run(mut self) {
        debug!(
            target: "sc.actor.connection",
            connection_id = %self.connection_id,
            "ConnectionActor started"
        );

        let mut ping = tokio::time::interval_at(
            tokio::time::Instant::now() + self.ping_interval,
            self.ping_interval,
        );
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let reason = loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    break "shutting down".to_string();
                }

                _ = ping.tick() => {
                    if let Err(e) = self.sink.ping().await {
                        debug!(
                            target: "sc.actor.connection",
                            connection_id = %self.connection_id,
                            error = %e,
                            "Ping failed, closing connection"
                        );
                        break "ping failed".to_string();
                    }
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(ConnectionMessage::Deliver { message }) => {
                            self.mailbox.record_dequeue();
                            self.metrics.record_message_processed();
                            if let Err(e) = self.sink.send(&message).await {
                                warn!(
                                    target: "sc.actor.connection",
                                    connection_id = %self.connection_id,
                                    kind = message.kind(),
                                    error = %e,
                                    "Write failed, closing connection"
                                );
                                break "write failed".to_string();
                            }
                        }
                        Some(ConnectionMessage::Close { reason }) => {
                            break reason;
                        }
                        None => {
                            break "all handles dropped".to_string();
                        }
                    }
                }
            }
        };

        // Stop accepting, then close the link
        self.receiver.close();
        self.sink.close(&reason).await;
        self.metrics.connection_closed();

        debug!(
            target: "sc.actor.connection",
            connection_id = %self.connection_id,
            reason = %reason,
            messages_processed = self.mailbox.messages_processed(),
            messages_dropped = self.mailbox.messages_dropped(),
            "ConnectionActor stopped"
        );
    }
}
