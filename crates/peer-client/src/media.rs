//! Media capability interface.
//!
//! [`MediaEngine`] abstracts capture and negotiation primitives so the
//! lifecycle logic can run against a browser, a native WebRTC stack, or a
//! test double. The engine owns exactly one underlying peer connection.
//!
//! Asynchronous engine notifications (local ICE candidates, transport state,
//! remote tracks, display capture ending) are delivered as [`MediaEvent`]s on
//! a channel supplied by whoever binds the engine.

use common::protocol::{IceCandidate, SessionDescription};
use std::fmt;
use thiserror::Error;

/// Capture constraints for camera and microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: Option<VideoConstraints>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoConstraints {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 24,
        }
    }
}

impl Default for MediaConstraints {
    /// 1280x720 at 24fps with audio.
    fn default() -> Self {
        Self {
            audio: true,
            video: Some(VideoConstraints::default()),
        }
    }
}

impl MediaConstraints {
    #[must_use]
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Engine-assigned track identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackId(pub String);

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to one local or remote media track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaTrack {
    pub id: TrackId,
    pub kind: TrackKind,
}

/// Transport-level connectivity of the underlying peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Notification raised by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEvent {
    LocalIceCandidate(IceCandidate),
    TransportStateChanged(TransportState),
    RemoteTrack(MediaTrack),
    /// The user stopped display capture from outside the application.
    ScreenShareEnded,
}

/// Failures reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("permission to capture was denied")]
    PermissionDenied,
    #[error("no capture device found")]
    NotFound,
    #[error("capture device is in use")]
    InUse,
    #[error("{0}")]
    Engine(String),
}

/// Capture and negotiation primitives of one peer connection.
#[async_trait::async_trait]
pub trait MediaEngine: Send {
    /// Capture camera and/or microphone and attach the tracks to the
    /// connection.
    async fn acquire_media(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<Vec<MediaTrack>, MediaError>;

    /// Capture a display surface as a video track. Not attached until passed
    /// to [`replace_video_track`](MediaEngine::replace_video_track).
    async fn acquire_display(&mut self) -> Result<MediaTrack, MediaError>;

    async fn create_offer(&mut self) -> Result<SessionDescription, MediaError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, MediaError>;

    async fn set_local_description(
        &mut self,
        description: &SessionDescription,
    ) -> Result<(), MediaError>;

    async fn set_remote_description(
        &mut self,
        description: &SessionDescription,
    ) -> Result<(), MediaError>;

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), MediaError>;

    /// Swap the track on the outgoing video sender without renegotiating.
    async fn replace_video_track(&mut self, track: &MediaTrack) -> Result<(), MediaError>;

    fn set_track_enabled(&mut self, track: &TrackId, enabled: bool);

    fn stop_track(&mut self, track: &TrackId);

    /// Close the underlying connection. Further calls are no-ops.
    async fn close(&mut self);
}
