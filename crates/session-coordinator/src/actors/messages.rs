//! Message types for actor communication.
//!
//! All inter-actor communication uses strongly-typed message passing via `tokio::sync::mpsc`.
//! Response patterns use `tokio::sync::oneshot` for request-reply semantics.

use crate::errors::CoordinatorError;

use super::connection::ConnectionActorHandle;
use super::room::RoomActorHandle;

use common::protocol::{IceCandidate, ServerMessage, SessionDescription};
use common::types::{ConnectionId, SessionId, UserId};
use std::collections::BTreeSet;
use tokio::sync::oneshot;

/// Messages sent to `RoomRegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Return the live room for a session, spawning one if needed.
    GetOrCreateRoom {
        session_id: SessionId,
        respond_to: oneshot::Sender<Result<RoomActorHandle, CoordinatorError>>,
    },

    /// Return the live room for a session without creating one.
    GetRoom {
        session_id: SessionId,
        respond_to: oneshot::Sender<Option<RoomActorHandle>>,
    },

    /// A room emptied and is exiting.
    RoomEmptied {
        session_id: SessionId,
        room_id: u64,
    },

    /// Get current registry status (for health checks and tests).
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    /// Stop creating rooms (graceful shutdown). Live rooms keep running
    /// until they empty or are cancelled.
    Shutdown { respond_to: oneshot::Sender<()> },
}

/// Messages sent to `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// An authorized identity joins through `connection`.
    Join {
        identity: UserId,
        connection: ConnectionActorHandle,
        respond_to: oneshot::Sender<Result<RoomJoin, CoordinatorError>>,
    },

    /// Explicit leave: the identity is removed with all its connections.
    Leave {
        identity: UserId,
        respond_to: oneshot::Sender<LeaveOutcome>,
    },

    /// A transport link went away. The identity stays a member while it
    /// has other live connections.
    ConnectionClosed {
        identity: UserId,
        connection_id: ConnectionId,
        respond_to: oneshot::Sender<LeaveOutcome>,
    },

    /// Forward a signaling message to every other member.
    Relay { from: UserId, payload: RelayPayload },

    /// Snapshot the member set.
    GetMembers {
        respond_to: oneshot::Sender<BTreeSet<UserId>>,
    },
}

/// Messages sent to `ConnectionActor`.
#[derive(Debug)]
pub enum ConnectionMessage {
    /// Write a message to the client.
    Deliver { message: ServerMessage },

    /// Close the link gracefully.
    Close { reason: String },
}

/// Events emitted by rooms on member-count transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// Member count went from 0 to 1.
    BecameActive { session_id: SessionId },
    /// Member count went to 0; the room is gone.
    BecameEmpty { session_id: SessionId },
}

/// Relayable signaling payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    Chat(String),
}

impl RelayPayload {
    /// Message kind, used for metric labels.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            RelayPayload::Offer(_) => "offer",
            RelayPayload::Answer(_) => "answer",
            RelayPayload::IceCandidate(_) => "ice-candidate",
            RelayPayload::Chat(_) => "chat",
        }
    }
}

// ----------------------------------------------------------------------------
// Supporting Types
// ----------------------------------------------------------------------------

/// Room-side result of a join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomJoin {
    /// Members after the join.
    pub members: BTreeSet<UserId>,
    /// This join moved the room from empty to occupied.
    pub became_active: bool,
    /// The identity was not a member before.
    pub newly_joined: bool,
}

/// Registry-side result of a join.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub members: BTreeSet<UserId>,
    pub became_active: bool,
    pub newly_joined: bool,
    /// Handle to the room the identity joined.
    pub room: RoomActorHandle,
}

/// Result of a leave or connection cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// The identity was removed from the member set.
    pub removed: bool,
    /// Members after the operation.
    pub remaining: BTreeSet<UserId>,
}

impl LeaveOutcome {
    pub(crate) fn unchanged(remaining: BTreeSet<UserId>) -> Self {
        Self {
            removed: false,
            remaining,
        }
    }
}

/// Registry status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryStatus {
    pub room_count: usize,
    pub is_draining: bool,
    pub mailbox_depth: usize,
}
