//! In-memory transport link for coordinator tests.
//!
//! [`TestConnection`] spawns a real `ConnectionActor` whose sink forwards
//! every outbound message to a channel the test reads from.

use common::protocol::ServerMessage;
use common::types::ConnectionId;
use session_coordinator::actors::{
    ActorMetrics, ConnectionActor, ConnectionActorHandle, MessageSink,
};
use session_coordinator::errors::CoordinatorError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// How long `recv` waits before failing the test.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Message sink backed by an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ServerMessage>,
    close_reason: Arc<Mutex<Option<String>>>,
}

impl ChannelSink {
    /// Create a sink and the receiver observing it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                close_reason: Arc::new(Mutex::new(None)),
            },
            rx,
        )
    }
}

#[async_trait::async_trait]
impl MessageSink for ChannelSink {
    async fn send(&mut self, message: &ServerMessage) -> Result<(), CoordinatorError> {
        self.tx
            .send(message.clone())
            .map_err(|_| CoordinatorError::Internal("test receiver dropped".to_string()))
    }

    async fn ping(&mut self) -> Result<(), CoordinatorError> {
        Ok(())
    }

    async fn close(&mut self, reason: &str) {
        *self.close_reason.lock().unwrap() = Some(reason.to_string());
    }
}

/// A spawned connection actor plus the receiving end of its sink.
pub struct TestConnection {
    handle: ConnectionActorHandle,
    task: Option<JoinHandle<()>>,
    rx: mpsc::UnboundedReceiver<ServerMessage>,
    close_reason: Arc<Mutex<Option<String>>>,
}

impl TestConnection {
    /// Spawn a connection actor with a generous mailbox and no pings.
    pub fn spawn(metrics: Arc<ActorMetrics>) -> Self {
        let (sink, rx) = ChannelSink::new();
        let close_reason = Arc::clone(&sink.close_reason);
        let (handle, task) = ConnectionActor::spawn(
            ConnectionId::new(),
            Box::new(sink),
            64,
            Duration::from_secs(3600),
            CancellationToken::new(),
            metrics,
        );
        Self {
            handle,
            task: Some(task),
            rx,
            close_reason,
        }
    }

    /// Handle to give to rooms and handlers.
    pub fn handle(&self) -> ConnectionActorHandle {
        self.handle.clone()
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.handle.connection_id()
    }

    /// Next delivered message. Panics after [`RECV_TIMEOUT`].
    pub async fn recv(&mut self) -> ServerMessage {
        tokio::time::timeout(RECV_TIMEOUT, self.rx.recv())
            .await
            .expect("timed out waiting for a server message")
            .expect("connection sink closed")
    }

    /// Skip messages until one of `kind` arrives.
    pub async fn recv_kind(&mut self, kind: &str) -> ServerMessage {
        loop {
            let message = self.recv().await;
            if message.kind() == kind {
                return message;
            }
        }
    }

    /// Assert nothing is delivered within `window`.
    pub async fn assert_silent(&mut self, window: Duration) {
        if let Ok(Some(message)) = tokio::time::timeout(window, self.rx.recv()).await {
            panic!("expected no message, got {message:?}");
        }
    }

    /// Collect everything delivered within `window`.
    pub async fn collect_for(&mut self, window: Duration) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        while let Ok(Some(message)) = tokio::time::timeout_at(deadline, self.rx.recv()).await {
            messages.push(message);
        }
        messages
    }

    /// Reason passed to the sink on close, once the actor has stopped.
    pub fn close_reason(&self) -> Option<String> {
        self.close_reason.lock().unwrap().clone()
    }

    /// Wait for the actor task to finish.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            tokio::time::timeout(RECV_TIMEOUT, task)
                .await
                .expect("connection actor did not stop")
                .expect("connection actor panicked");
        }
    }
}
