//! Session Status Bridge.
//!
//! Background task that turns room transitions into session status updates:
//!
//! | Trigger                          | Requested status |
//! |----------------------------------|------------------|
//! | `RoomEvent::BecameActive`        | `in-progress`    |
//! | `leave` with `endCall: true`     | `completed`      |
//! | `RoomEvent::BecameEmpty`         | none             |
//!
//! Updates are best-effort. Failures are logged and counted, never returned
//! to the caller. The bridge remembers the last status it successfully
//! requested per session and skips any target that would not advance it, so
//! repeated activations of the same session issue one `in-progress` request.
//!
//! All updates run on one task, so requests for a session are issued in the
//! order their triggers arrived.

use crate::actors::RoomEvent;
use crate::observability::metrics as prom;
use crate::sessions::SessionStatusWriter;

use common::types::{SessionId, SessionStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Buffer for explicit completion requests.
const BRIDGE_CHANNEL_BUFFER: usize = 256;

/// Upper bound on how long an end-call leave waits for the completion request.
/// Slightly above the session API client's own request timeout.
const COMPLETE_WAIT_TIMEOUT: Duration = Duration::from_secs(12);

/// Request to the bridge task.
#[derive(Debug)]
enum BridgeRequest {
    Complete {
        session_id: SessionId,
        respond_to: oneshot::Sender<UpdateResult>,
    },
}

/// Outcome of one status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// The persistence service accepted the update.
    Applied,
    /// The target would not advance the last requested status.
    Skipped,
    /// The update failed and was swallowed.
    Failed,
}

impl UpdateResult {
    fn as_str(self) -> &'static str {
        match self {
            UpdateResult::Applied => "success",
            UpdateResult::Skipped => "skipped",
            UpdateResult::Failed => "error",
        }
    }
}

/// Handle to the status bridge task.
#[derive(Clone, Debug)]
pub struct StatusBridgeHandle {
    sender: mpsc::Sender<BridgeRequest>,
    cancel_token: CancellationToken,
}

impl StatusBridgeHandle {
    /// Request `completed` for `session_id` and wait for the attempt to finish.
    ///
    /// Never fails: a bridge that is gone or slow yields `Failed`.
    pub async fn complete_session(&self, session_id: SessionId) -> UpdateResult {
        let (tx, rx) = oneshot::channel();
        let sent = self
            .sender
            .send(BridgeRequest::Complete {
                session_id: session_id.clone(),
                respond_to: tx,
            })
            .await;
        if sent.is_err() {
            warn!(
                target: "sc.status_bridge",
                session_id = %session_id,
                "Status bridge unavailable, completion not requested"
            );
            return UpdateResult::Failed;
        }

        match tokio::time::timeout(COMPLETE_WAIT_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => {
                warn!(
                    target: "sc.status_bridge",
                    session_id = %session_id,
                    "Completion request did not finish in time"
                );
                UpdateResult::Failed
            }
        }
    }

    /// Stop the bridge task.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

/// The bridge task state.
pub struct StatusBridge {
    events: mpsc::UnboundedReceiver<RoomEvent>,
    requests: mpsc::Receiver<BridgeRequest>,
    writer: Arc<dyn SessionStatusWriter>,
    cancel_token: CancellationToken,
    /// Last status successfully requested per session. Entries are never
    /// pruned; a session is requested at most twice over its lifetime.
    last_requested: HashMap<SessionId, SessionStatus>,
}

impl StatusBridge {
    /// Spawn the bridge.
    ///
    /// # Arguments
    ///
    /// * `events` - Room transitions from the registry
    /// * `writer` - Session persistence client
    /// * `cancel_token` - Stops the task
    pub fn spawn(
        events: mpsc::UnboundedReceiver<RoomEvent>,
        writer: Arc<dyn SessionStatusWriter>,
        cancel_token: CancellationToken,
    ) -> (StatusBridgeHandle, JoinHandle<()>) {
        let (sender, requests) = mpsc::channel(BRIDGE_CHANNEL_BUFFER);

        let bridge = Self {
            events,
            requests,
            writer,
            cancel_token: cancel_token.clone(),
            last_requested: HashMap::new(),
        };

        let task_handle = tokio::spawn(bridge.run());

        (
            StatusBridgeHandle {
                sender,
                cancel_token,
            },
            task_handle,
        )
    }

    #[instrument(skip_all, name = "sc.status_bridge")]
    async fn run(mut self) {
        info!(target: "sc.status_bridge", "Status bridge started");

        loop {
            tokio::select! {
                // Room events drain ahead of completion requests
                biased;

                () = self.cancel_token.cancelled() => break,

                event = self.events.recv() => {
                    match event {
                        Some(RoomEvent::BecameActive { session_id }) => {
                            self.request(session_id, SessionStatus::InProgress).await;
                        }
                        Some(RoomEvent::BecameEmpty { session_id }) => {
                            debug!(
                                target: "sc.status_bridge",
                                session_id = %session_id,
                                "Room emptied, status left unchanged"
                            );
                        }
                        None => break,
                    }
                }

                request = self.requests.recv() => {
                    match request {
                        Some(BridgeRequest::Complete { session_id, respond_to }) => {
                            let result = self.request(session_id, SessionStatus::Completed).await;
                            let _ = respond_to.send(result);
                        }
                        None => break,
                    }
                }
            }
        }

        info!(
            target: "sc.status_bridge",
            sessions_tracked = self.last_requested.len(),
            "Status bridge stopped"
        );
    }

    async fn request(&mut self, session_id: SessionId, target: SessionStatus) -> UpdateResult {
        let current = self
            .last_requested
            .get(&session_id)
            .copied()
            .unwrap_or(SessionStatus::Scheduled);

        if !current.advances_to(target) {
            debug!(
                target: "sc.status_bridge",
                session_id = %session_id,
                current = %current,
                requested = %target,
                "Status already at or past target, skipping"
            );
            prom::record_status_update(target.as_str(), UpdateResult::Skipped.as_str(), Duration::ZERO);
            return UpdateResult::Skipped;
        }

        let start = Instant::now();
        let result = match self.writer.update_status(&session_id, target).await {
            Ok(()) => {
                self.last_requested.insert(session_id.clone(), target);
                info!(
                    target: "sc.status_bridge",
                    session_id = %session_id,
                    status = %target,
                    "Session status updated"
                );
                UpdateResult::Applied
            }
            Err(e) => {
                warn!(
                    target: "sc.status_bridge",
                    session_id = %session_id,
                    status = %target,
                    error = %e,
                    "Session status update failed"
                );
                UpdateResult::Failed
            }
        };

        prom::record_status_update(target.as_str(), result.as_str(), start.elapsed());
        result
    }
}
