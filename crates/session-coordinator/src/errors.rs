//! Session Coordinator error types.
//!
//! Error types map to signaling error codes for client responses.
//! Internal details are logged server-side but not exposed to clients.

use common::jwt::JwtValidationError;
use thiserror::Error;

/// Session Coordinator error type.
///
/// Maps to signaling error codes:
/// - `Unauthenticated`: `UNAUTHORIZED` (2)
/// - `Forbidden`: `FORBIDDEN` (3)
/// - `SessionNotFound`: `NOT_FOUND` (4)
/// - Internal, `SessionApi`, Config, `RoomClosed`: `INTERNAL_ERROR` (6)
/// - `CapacityExceeded`, `Draining`: `CAPACITY_EXCEEDED` (7)
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Credential missing, malformed, expired or badly signed.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(#[from] JwtValidationError),

    /// No session with the requested id.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Identity holds no role in the session, or does not match the identity
    /// already bound to the connection.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Room limit reached.
    #[error("Coordinator at capacity")]
    CapacityExceeded,

    /// Coordinator is shutting down.
    #[error("Coordinator is draining")]
    Draining,

    /// The room emptied and stopped while a join was queued behind the last
    /// leave. Retried internally against a fresh room.
    #[error("Room closed: {0}")]
    RoomClosed(String),

    /// Session persistence API call failed.
    #[error("Session API error: {0}")]
    SessionApi(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (channel failures, actor crashes).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Returns the signaling error code value for this error.
    pub fn error_code(&self) -> i32 {
        match self {
            CoordinatorError::Unauthenticated(_) => 2, // UNAUTHORIZED
            CoordinatorError::Forbidden(_) => 3,       // FORBIDDEN
            CoordinatorError::SessionNotFound(_) => 4, // NOT_FOUND
            CoordinatorError::RoomClosed(_)
            | CoordinatorError::SessionApi(_)
            | CoordinatorError::Config(_)
            | CoordinatorError::Internal(_) => 6, // INTERNAL_ERROR
            CoordinatorError::CapacityExceeded | CoordinatorError::Draining => 7, // CAPACITY_EXCEEDED
        }
    }

    /// Returns a client-safe error message (no internal details).
    pub fn client_message(&self) -> String {
        match self {
            CoordinatorError::Unauthenticated(e) => e.to_string(),
            CoordinatorError::SessionNotFound(_) => "Session not found".to_string(),
            CoordinatorError::Forbidden(_) => "Not authorized for this session".to_string(),
            CoordinatorError::CapacityExceeded => {
                "Server is at capacity, please try again".to_string()
            }
            CoordinatorError::Draining => "Server is shutting down, please reconnect".to_string(),
            CoordinatorError::RoomClosed(_)
            | CoordinatorError::SessionApi(_)
            | CoordinatorError::Config(_)
            | CoordinatorError::Internal(_) => "An internal error occurred".to_string(),
        }
    }
}
