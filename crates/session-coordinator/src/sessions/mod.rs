//! External session persistence.
//!
//! The coordinator never owns session records. It reads the teacher/learner
//! pair to authorize joins and asks the persistence service to advance the
//! session status.

pub mod client;

use crate::errors::CoordinatorError;
use common::types::{SessionId, SessionRecord, SessionStatus};

pub use client::SessionApiClient;

/// Read access to session records (enables mocking).
#[async_trait::async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Fetch a session record. `Ok(None)` when no such session exists.
    async fn fetch_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>, CoordinatorError>;
}

/// Write access to session status (enables mocking).
#[async_trait::async_trait]
pub trait SessionStatusWriter: Send + Sync {
    /// Request that the persisted status of `session_id` become `status`.
    async fn update_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> Result<(), CoordinatorError>;
}
