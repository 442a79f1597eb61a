//! Peer client error types.

use crate::media::MediaError;
use crate::state::PeerState;
use thiserror::Error;

/// Errors surfaced by [`PeerConnection`](crate::PeerConnection) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    /// Camera, microphone or display capture was refused or is missing.
    ///
    /// Not fatal: the caller should offer the session's fallback meeting link.
    #[error("Media device unavailable: {remediation}")]
    DeviceUnavailable {
        cause: MediaError,
        remediation: String,
    },

    /// A negotiation round is already in flight, or a remote description
    /// arrived that does not fit the current round.
    #[error("Negotiation already in progress")]
    NegotiationConflict,

    /// The operation does not apply to the current state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: PeerState,
    },

    /// Signaling link failure.
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// Media engine failure outside of device acquisition.
    #[error("Media engine error: {0}")]
    Engine(String),

    /// The connection has been closed.
    #[error("Peer connection closed")]
    Closed,
}

impl PeerError {
    /// Map a capture failure to `DeviceUnavailable` with user guidance.
    #[must_use]
    pub fn device_unavailable(cause: MediaError) -> Self {
        let remediation = match &cause {
            MediaError::PermissionDenied => {
                "Allow camera and microphone access in your browser settings"
            }
            MediaError::NotFound => "Connect a camera and microphone",
            MediaError::InUse => "Close other applications that are using the camera",
            MediaError::Engine(_) => "Check your camera and microphone",
        };
        PeerError::DeviceUnavailable {
            cause,
            remediation: format!("{remediation}, or join through the session's meeting link"),
        }
    }
}

impl From<MediaError> for PeerError {
    fn from(e: MediaError) -> Self {
        PeerError::Engine(e.to_string())
    }
}
