//! Per-connection message dispatch.
//!
//! One `ConnectionHandler` exists per transport link. It owns the link's
//! resolved identity and the set of sessions the link has been authorized
//! for, and routes each inbound message by kind:
//!
//! | Kind                                      | Action                          |
//! |-------------------------------------------|---------------------------------|
//! | `join`                                    | authorize, then join the room   |
//! | `leave`                                   | leave, optionally end the call  |
//! | `offer` `answer` `ice-candidate` `chat`   | relay to the other members      |
//!
//! Everything except `join` requires the session to be in the authorized set;
//! otherwise the message is dropped without a reply.

use crate::actors::{ConnectionActorHandle, RelayPayload, RoomActorHandle, RoomRegistryHandle};
use crate::auth::AuthorizationGate;
use crate::errors::CoordinatorError;
use crate::observability::metrics as prom;
use crate::status_bridge::StatusBridgeHandle;

use common::protocol::{ClientMessage, Credential, ServerMessage};
use common::types::{ConnectionId, SessionId, UserId};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Reply for frames that are not valid client messages.
pub const MALFORMED_MESSAGE: &str = "Malformed message";

/// Services shared by every connection.
#[derive(Clone)]
pub struct SignalingContext {
    pub gate: AuthorizationGate,
    pub registry: RoomRegistryHandle,
    pub bridge: StatusBridgeHandle,
}

/// Dispatch table and authorization state for one link.
pub struct ConnectionHandler {
    connection_id: ConnectionId,
    connection: ConnectionActorHandle,
    context: SignalingContext,
    /// Bound by the first successful join.
    identity: Option<UserId>,
    /// Sessions this link may act in. Never shrinks.
    authorized: HashSet<SessionId>,
    /// Rooms this link is currently present in.
    rooms: HashMap<SessionId, RoomActorHandle>,
    disconnected: bool,
}

impl ConnectionHandler {
    #[must_use]
    pub fn new(connection: ConnectionActorHandle, context: SignalingContext) -> Self {
        Self {
            connection_id: connection.connection_id(),
            connection,
            context,
            identity: None,
            authorized: HashSet::new(),
            rooms: HashMap::new(),
            disconnected: false,
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Identity bound to this link, if any join succeeded.
    #[must_use]
    pub fn identity(&self) -> Option<&UserId> {
        self.identity.as_ref()
    }

    /// Whether `session_id` is in the authorized set.
    #[must_use]
    pub fn is_authorized(&self, session_id: &SessionId) -> bool {
        self.authorized.contains(session_id)
    }

    /// Parse and dispatch one text frame.
    pub async fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                debug!(
                    target: "sc.signaling",
                    connection_id = %self.connection_id,
                    error = %e,
                    "Unparseable frame"
                );
                self.reject_frame(MALFORMED_MESSAGE).await;
            }
        }
    }

    /// Reply with an error to a frame that could not be handled.
    pub async fn reject_frame(&self, message: &str) {
        self.reply_error(message.to_string()).await;
    }

    /// Dispatch one message by kind.
    pub async fn handle_message(&mut self, message: ClientMessage) {
        if self.disconnected {
            return;
        }

        match message {
            ClientMessage::Join {
                session_id,
                credential,
            } => self.handle_join(session_id, &credential).await,
            ClientMessage::Leave {
                session_id,
                end_call,
            } => self.handle_leave(session_id, end_call).await,
            ClientMessage::Chat {
                session_id,
                message,
            } => self.relay(session_id, RelayPayload::Chat(message)).await,
            ClientMessage::Offer { session_id, sdp } => {
                self.relay(session_id, RelayPayload::Offer(sdp)).await;
            }
            ClientMessage::Answer { session_id, sdp } => {
                self.relay(session_id, RelayPayload::Answer(sdp)).await;
            }
            ClientMessage::IceCandidate {
                session_id,
                candidate,
            } => {
                self.relay(session_id, RelayPayload::IceCandidate(candidate))
                    .await;
            }
        }
    }

    async fn handle_join(&mut self, session_id: SessionId, credential: &Credential) {
        let start = Instant::now();

        match self.try_join(&session_id, credential).await {
            Ok(identity) => {
                prom::record_join("admitted", start.elapsed());
                info!(
                    target: "sc.signaling",
                    connection_id = %self.connection_id,
                    session_id = %session_id,
                    identity = %identity,
                    "Participant joined"
                );
            }
            Err(e) => {
                prom::record_join(join_result_label(&e), start.elapsed());
                warn!(
                    target: "sc.signaling",
                    connection_id = %self.connection_id,
                    session_id = %session_id,
                    error = %e,
                    "Join rejected"
                );
                self.reply_error(e.client_message()).await;
            }
        }
    }

    /// Authorize and join. Nothing on `self` changes unless the room join succeeds.
    async fn try_join(
        &mut self,
        session_id: &SessionId,
        credential: &Credential,
    ) -> Result<UserId, CoordinatorError> {
        let admission = self
            .context
            .gate
            .authorize(session_id, credential.as_str())
            .await?;

        if let Some(bound) = &self.identity {
            if bound != &admission.identity {
                return Err(CoordinatorError::Forbidden(format!(
                    "connection bound to {bound}, credential resolves to {}",
                    admission.identity
                )));
            }
        }

        let outcome = self
            .context
            .registry
            .join(
                session_id.clone(),
                admission.identity.clone(),
                self.connection.clone(),
            )
            .await?;

        self.identity = Some(admission.identity.clone());
        self.authorized.insert(session_id.clone());
        self.rooms.insert(session_id.clone(), outcome.room);

        Ok(admission.identity)
    }

    async fn handle_leave(&mut self, session_id: SessionId, end_call: bool) {
        let Some(identity) = self.authorized_identity(&session_id) else {
            debug!(
                target: "sc.signaling",
                connection_id = %self.connection_id,
                session_id = %session_id,
                "Dropping leave for unauthorized session"
            );
            return;
        };

        self.rooms.remove(&session_id);
        match self
            .context
            .registry
            .leave(session_id.clone(), identity.clone())
            .await
        {
            Ok(outcome) => {
                debug!(
                    target: "sc.signaling",
                    connection_id = %self.connection_id,
                    session_id = %session_id,
                    identity = %identity,
                    removed = outcome.removed,
                    remaining = outcome.remaining.len(),
                    end_call,
                    "Participant left"
                );
            }
            Err(e) => {
                warn!(
                    target: "sc.signaling",
                    session_id = %session_id,
                    error = %e,
                    "Leave failed"
                );
            }
        }

        if end_call {
            self.context.bridge.complete_session(session_id).await;
        }
    }

    async fn relay(&mut self, session_id: SessionId, payload: RelayPayload) {
        let Some(identity) = self.authorized_identity(&session_id) else {
            debug!(
                target: "sc.signaling",
                connection_id = %self.connection_id,
                session_id = %session_id,
                kind = payload.kind(),
                "Dropping message for unauthorized session"
            );
            prom::record_relay_dropped("unauthorized");
            return;
        };

        let Some(room) = self.rooms.get(&session_id) else {
            debug!(
                target: "sc.signaling",
                connection_id = %self.connection_id,
                session_id = %session_id,
                kind = payload.kind(),
                "Dropping message: not present in room"
            );
            prom::record_relay_dropped("no_room");
            return;
        };

        if room.relay(identity, payload).await.is_err() {
            prom::record_relay_dropped("no_room");
            self.rooms.remove(&session_id);
        }
    }

    /// Disconnect cleanup. Runs once; later calls are no-ops.
    pub async fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }
        self.disconnected = true;

        if let Some(identity) = self.identity.clone() {
            for (session_id, _room) in self.rooms.drain() {
                let result = self
                    .context
                    .registry
                    .connection_closed(session_id.clone(), identity.clone(), self.connection_id)
                    .await;
                if let Err(e) = result {
                    warn!(
                        target: "sc.signaling",
                        connection_id = %self.connection_id,
                        session_id = %session_id,
                        error = %e,
                        "Disconnect cleanup failed"
                    );
                }
            }
        }

        self.connection.close("disconnected").await;

        debug!(
            target: "sc.signaling",
            connection_id = %self.connection_id,
            sessions = self.authorized.len(),
            "Connection cleaned up"
        );
    }

    fn authorized_identity(&self, session_id: &SessionId) -> Option<UserId> {
        if !self.authorized.contains(session_id) {
            return None;
        }
        self.identity.clone()
    }

    async fn reply_error(&self, message: String) {
        if let Err(e) = self
            .connection
            .deliver(ServerMessage::Error { message })
            .await
        {
            debug!(
                target: "sc.signaling",
                connection_id = %self.connection_id,
                error = %e,
                "Could not deliver error reply"
            );
        }
    }
}

fn join_result_label(error: &CoordinatorError) -> &'static str {
    match error {
        CoordinatorError::Unauthenticated(_) => "unauthenticated",
        CoordinatorError::Forbidden(_) => "forbidden",
        CoordinatorError::SessionNotFound(_) => "not_found",
        CoordinatorError::CapacityExceeded | CoordinatorError::Draining => "capacity",
        CoordinatorError::RoomClosed(_)
        | CoordinatorError::SessionApi(_)
        | CoordinatorError::Config(_)
        | CoordinatorError::Internal(_) => "error",
    }
}
