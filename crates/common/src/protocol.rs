//! Signaling wire protocol.
//!
//! Messages are JSON text frames tagged by `type` (kebab-case) with camelCase
//! fields, e.g. `{"type":"ice-candidate","sessionId":"s1","candidate":{...}}`.
//!
//! Room-scoped server messages carry the `sessionId` they belong to so a client
//! joined to several sessions over one link can route them.

use crate::types::{SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque signed credential presented on join.
///
/// Redacted in Debug output so join frames can be logged safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(pub String);

impl Credential {
    /// Borrow the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Kind of a session description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description produced by the media engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    #[must_use]
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    #[must_use]
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A proposed network path for peer connectivity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        default,
        rename = "sdpMLineIndex",
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Messages sent by a client to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Join {
        session_id: SessionId,
        credential: Credential,
    },
    Leave {
        session_id: SessionId,
        /// Set when the participant ends the call for good.
        #[serde(default)]
        end_call: bool,
    },
    Chat {
        session_id: SessionId,
        message: String,
    },
    Offer {
        session_id: SessionId,
        sdp: SessionDescription,
    },
    Answer {
        session_id: SessionId,
        sdp: SessionDescription,
    },
    IceCandidate {
        session_id: SessionId,
        candidate: IceCandidate,
    },
}

impl ClientMessage {
    /// Message kind as it appears in the `type` tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Join { .. } => "join",
            ClientMessage::Leave { .. } => "leave",
            ClientMessage::Chat { .. } => "chat",
            ClientMessage::Offer { .. } => "offer",
            ClientMessage::Answer { .. } => "answer",
            ClientMessage::IceCandidate { .. } => "ice-candidate",
        }
    }

    /// Session the message targets.
    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        match self {
            ClientMessage::Join { session_id, .. }
            | ClientMessage::Leave { session_id, .. }
            | ClientMessage::Chat { session_id, .. }
            | ClientMessage::Offer { session_id, .. }
            | ClientMessage::Answer { session_id, .. }
            | ClientMessage::IceCandidate { session_id, .. } => session_id,
        }
    }
}

/// Messages sent by the coordinator to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Acknowledgement, sent to the joiner only.
    Joined {
        session_id: SessionId,
        identity: UserId,
    },
    ParticipantJoined {
        session_id: SessionId,
        identity: UserId,
    },
    ParticipantLeft {
        session_id: SessionId,
        identity: UserId,
    },
    /// Full member list, sent to every member on each membership change.
    Participants {
        session_id: SessionId,
        identities: Vec<UserId>,
    },
    Chat {
        session_id: SessionId,
        from: UserId,
        message: String,
        /// Server time in Unix epoch milliseconds.
        at: i64,
    },
    Offer {
        session_id: SessionId,
        from: UserId,
        sdp: SessionDescription,
    },
    Answer {
        session_id: SessionId,
        from: UserId,
        sdp: SessionDescription,
    },
    IceCandidate {
        session_id: SessionId,
        from: UserId,
        candidate: IceCandidate,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// Message kind as it appears in the `type` tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Joined { .. } => "joined",
            ServerMessage::ParticipantJoined { .. } => "participant-joined",
            ServerMessage::ParticipantLeft { .. } => "participant-left",
            ServerMessage::Participants { .. } => "participants",
            ServerMessage::Chat { .. } => "chat",
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::IceCandidate { .. } => "ice-candidate",
            ServerMessage::Error { .. } => "error",
        }
    }

    /// Session a room-scoped message belongs to. `None` for `error`.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            ServerMessage::Joined { session_id, .. }
            | ServerMessage::ParticipantJoined { session_id, .. }
            | ServerMessage::ParticipantLeft { session_id, .. }
            | ServerMessage::Participants { session_id, .. }
            | ServerMessage::Chat { session_id, .. }
            | ServerMessage::Offer { session_id, .. }
            | ServerMessage::Answer { session_id, .. }
            | ServerMessage::IceCandidate { session_id, .. } => Some(session_id),
            ServerMessage::Error { .. } => None,
        }
    }
}
