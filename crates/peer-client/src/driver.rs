//! Cooperative driver loop for a [`PeerConnection`].
//!
//! The loop owns the connection and serializes every input through it:
//! user commands (via [`PeerHandle`]), coordinator messages and media engine
//! events. A dropped signaling link schedules reconnects with linear backoff
//! until the link is back or the health indicator reaches `Offline`.

use crate::errors::PeerError;
use crate::media::MediaEvent;
use crate::peer::{PeerConnection, PeerSnapshot};
use crate::signaling::SignalingEvent;
use crate::state::{PeerState, SignalingHealth};

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Command channel buffer size.
const PEER_COMMAND_BUFFER: usize = 32;

/// Delay before the first automatic reconnect; grows linearly per failure.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Longest wait between automatic reconnects.
const MAX_RECONNECT_BACKOFF: Duration = Duration::from_secs(10);

/// User commands for the driver loop.
#[derive(Debug)]
pub enum PeerCommand {
    ToggleAudio {
        muted: bool,
        respond_to: oneshot::Sender<Result<(), PeerError>>,
    },
    ToggleVideo {
        off: bool,
        respond_to: oneshot::Sender<Result<(), PeerError>>,
    },
    StartScreenShare {
        respond_to: oneshot::Sender<Result<(), PeerError>>,
    },
    StopScreenShare {
        respond_to: oneshot::Sender<Result<(), PeerError>>,
    },
    SendChat {
        message: String,
        respond_to: oneshot::Sender<Result<(), PeerError>>,
    },
    Reconnect {
        respond_to: oneshot::Sender<Result<(), PeerError>>,
    },
    Leave {
        end_call: bool,
        respond_to: oneshot::Sender<()>,
    },
    GetSnapshot {
        respond_to: oneshot::Sender<PeerSnapshot>,
    },
}

/// Handle to a running peer driver.
#[derive(Clone, Debug)]
pub struct PeerHandle {
    sender: mpsc::Sender<PeerCommand>,
    cancel_token: CancellationToken,
}

impl PeerHandle {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> PeerCommand,
    ) -> Result<T, PeerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(command(tx))
            .await
            .map_err(|_| PeerError::Closed)?;
        rx.await.map_err(|_| PeerError::Closed)
    }

    /// # Errors
    ///
    /// `Closed` once the driver has stopped.
    pub async fn toggle_audio(&self, muted: bool) -> Result<(), PeerError> {
        self.request(|respond_to| PeerCommand::ToggleAudio { muted, respond_to })
            .await?
    }

    /// # Errors
    ///
    /// `Closed` once the driver has stopped.
    pub async fn toggle_video(&self, off: bool) -> Result<(), PeerError> {
        self.request(|respond_to| PeerCommand::ToggleVideo { off, respond_to })
            .await?
    }

    /// # Errors
    ///
    /// `DeviceUnavailable` when display capture is refused.
    pub async fn start_screen_share(&self) -> Result<(), PeerError> {
        self.request(|respond_to| PeerCommand::StartScreenShare { respond_to })
            .await?
    }

    /// # Errors
    ///
    /// `Engine` when the camera cannot be restored.
    pub async fn stop_screen_share(&self) -> Result<(), PeerError> {
        self.request(|respond_to| PeerCommand::StopScreenShare { respond_to })
            .await?
    }

    /// # Errors
    ///
    /// `Signaling` when the message cannot be sent.
    pub async fn send_chat(&self, message: impl Into<String>) -> Result<(), PeerError> {
        let message = message.into();
        self.request(|respond_to| PeerCommand::SendChat {
            message,
            respond_to,
        })
        .await?
    }

    /// # Errors
    ///
    /// `Signaling` when the link or the join fails.
    pub async fn reconnect(&self) -> Result<(), PeerError> {
        self.request(|respond_to| PeerCommand::Reconnect { respond_to })
            .await?
    }

    /// Leave the session. Succeeds if the driver already stopped.
    pub async fn leave(&self) {
        let _ = self
            .request(|respond_to| PeerCommand::Leave {
                end_call: false,
                respond_to,
            })
            .await;
    }

    /// Leave and mark the session completed. Succeeds if the driver already
    /// stopped.
    pub async fn end_call(&self) {
        let _ = self
            .request(|respond_to| PeerCommand::Leave {
                end_call: true,
                respond_to,
            })
            .await;
    }

    /// # Errors
    ///
    /// `Closed` once the driver has stopped.
    pub async fn snapshot(&self) -> Result<PeerSnapshot, PeerError> {
        self.request(|respond_to| PeerCommand::GetSnapshot { respond_to })
            .await
    }

    /// Stop the driver. The connection leaves the session on the way out.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }
}

impl PeerConnection {
    /// Move the connection onto its driver task.
    ///
    /// The task returns the connection when it stops, which happens after
    /// leave or cancellation.
    ///
    /// # Arguments
    ///
    /// * `inbound` - Coordinator traffic from the signaling link
    /// * `media_events` - Notifications from the media engine binding
    /// * `cancel_token` - Stops the driver
    pub fn spawn(
        self,
        inbound: mpsc::Receiver<SignalingEvent>,
        media_events: mpsc::Receiver<MediaEvent>,
        cancel_token: CancellationToken,
    ) -> (PeerHandle, JoinHandle<PeerConnection>) {
        let (sender, commands) = mpsc::channel(PEER_COMMAND_BUFFER);
        let task_handle = tokio::spawn(run(
            self,
            inbound,
            media_events,
            commands,
            cancel_token.clone(),
        ));
        (
            PeerHandle {
                sender,
                cancel_token,
            },
            task_handle,
        )
    }
}

#[instrument(skip_all, name = "peer.driver", fields(session_id = %peer.session_id()))]
async fn run(
    mut peer: PeerConnection,
    mut inbound: mpsc::Receiver<SignalingEvent>,
    mut media_events: mpsc::Receiver<MediaEvent>,
    mut commands: mpsc::Receiver<PeerCommand>,
    cancel_token: CancellationToken,
) -> PeerConnection {
    info!(target: "peer.connection", "Peer driver started");

    let mut inbound_open = true;
    let mut media_open = true;
    let mut commands_open = true;
    let mut reconnect_at: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;

            () = cancel_token.cancelled() => {
                peer.leave().await;
                break;
            }

            command = commands.recv(), if commands_open => {
                match command {
                    Some(PeerCommand::Reconnect { respond_to }) => {
                        let result = peer.reconnect().await;
                        reconnect_at = next_reconnect(&result, peer.signaling_health());
                        let _ = respond_to.send(result);
                    }
                    Some(command) => handle_command(&mut peer, command).await,
                    None => commands_open = false,
                }
            }

            event = inbound.recv(), if inbound_open => {
                match event {
                    Some(SignalingEvent::Message(message)) => {
                        peer.handle_server_message(message).await;
                    }
                    Some(SignalingEvent::Disconnected) => {
                        peer.signaling_lost();
                        reconnect_at.get_or_insert_with(|| Instant::now() + reconnect_delay(0));
                    }
                    None => inbound_open = false,
                }
            }

            event = media_events.recv(), if media_open => {
                match event {
                    Some(event) => peer.handle_media_event(event).await,
                    None => media_open = false,
                }
            }

            () = sleep_until_due(reconnect_at) => {
                let result = peer.reconnect().await;
                reconnect_at = next_reconnect(&result, peer.signaling_health());
            }
        }

        if peer.state() == PeerState::Closed {
            break;
        }
    }

    info!(
        target: "peer.connection",
        state = %peer.state(),
        "Peer driver stopped"
    );
    peer
}

async fn handle_command(peer: &mut PeerConnection, command: PeerCommand) {
    match command {
        PeerCommand::ToggleAudio { muted, respond_to } => {
            let _ = respond_to.send(peer.toggle_audio(muted));
        }
        PeerCommand::ToggleVideo { off, respond_to } => {
            let _ = respond_to.send(peer.toggle_video(off));
        }
        PeerCommand::StartScreenShare { respond_to } => {
            let _ = respond_to.send(peer.start_screen_share().await);
        }
        PeerCommand::StopScreenShare { respond_to } => {
            let _ = respond_to.send(peer.stop_screen_share().await);
        }
        PeerCommand::SendChat {
            message,
            respond_to,
        } => {
            let _ = respond_to.send(peer.send_chat(message).await);
        }
        PeerCommand::Reconnect { respond_to } => {
            let _ = respond_to.send(peer.reconnect().await);
        }
        PeerCommand::Leave {
            end_call,
            respond_to,
        } => {
            if end_call {
                peer.end_call().await;
            } else {
                peer.leave().await;
            }
            let _ = respond_to.send(());
        }
        PeerCommand::GetSnapshot { respond_to } => {
            let _ = respond_to.send(peer.snapshot());
        }
    }
}

/// When to try again after a reconnect attempt, if at all.
fn next_reconnect(result: &Result<(), PeerError>, health: SignalingHealth) -> Option<Instant> {
    match (result, health) {
        (Err(_), SignalingHealth::Reconnecting { attempts }) => {
            debug!(target: "peer.signaling", attempts, "Scheduling reconnect");
            Some(Instant::now() + reconnect_delay(attempts))
        }
        _ => None,
    }
}

fn reconnect_delay(failures: u32) -> Duration {
    RECONNECT_BACKOFF
        .saturating_mul(failures.saturating_add(1))
        .min(MAX_RECONNECT_BACKOFF)
}

async fn sleep_until_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
