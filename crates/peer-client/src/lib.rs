//! Peer Client
//!
//! Client-side lifecycle of a two-party tutoring session's media channel:
//! media acquisition, offer/answer negotiation with deterministic offerer
//! election, ICE candidate buffering, mute/camera/screen-share toggles and
//! signaling reconnection.
//!
//! # Architecture
//!
//! ```text
//!  PeerHandle ──commands──┐
//!                         ▼
//!  SignalingSink ◄── PeerConnection (driver task) ◄── SignalingEvent (coordinator)
//!                         │   ▲
//!                         ▼   └── MediaEvent
//!                    MediaEngine
//! ```
//!
//! [`MediaEngine`] is a capability trait; binding it to a browser or native
//! WebRTC stack is left to the embedding application.

#![warn(clippy::pedantic)]

pub mod driver;
pub mod errors;
pub mod media;
pub mod peer;
pub mod signaling;
pub mod state;

pub use driver::{PeerCommand, PeerHandle};
pub use errors::PeerError;
pub use media::{
    MediaConstraints, MediaEngine, MediaError, MediaEvent, MediaTrack, TrackId, TrackKind,
    TransportState, VideoConstraints,
};
pub use peer::{PeerConnection, PeerSnapshot, PeerUpdate};
pub use signaling::{ChannelSignaling, SignalingEvent, SignalingSink, WebSocketSignaling};
pub use state::{PeerState, SignalingHealth, MAX_RECONNECT_ATTEMPTS};
