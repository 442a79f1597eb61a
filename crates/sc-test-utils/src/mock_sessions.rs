//! In-memory session persistence mock.
//!
//! Implements both `SessionDirectory` and `SessionStatusWriter`. Clones share
//! state, so a test can keep one clone for assertions and hand another to the
//! coordinator.

use common::types::{SessionId, SessionRecord, SessionStatus};
use session_coordinator::errors::CoordinatorError;
use session_coordinator::sessions::{SessionDirectory, SessionStatusWriter};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionId, SessionRecord>,
    status_updates: Vec<(SessionId, SessionStatus)>,
    fetch_count: usize,
    fail_fetches: bool,
    fail_updates: bool,
}

/// Mock session persistence service.
#[derive(Debug, Clone, Default)]
pub struct MockSessionDirectory {
    inner: Arc<Mutex<Inner>>,
}

impl MockSessionDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a session record.
    #[must_use]
    pub fn with_session(self, record: SessionRecord) -> Self {
        self.insert(record);
        self
    }

    pub fn insert(&self, record: SessionRecord) {
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.insert(record.id.clone(), record);
    }

    /// Make every fetch fail as if the service were unreachable.
    pub fn fail_fetches(&self, fail: bool) {
        self.inner.lock().unwrap().fail_fetches = fail;
    }

    /// Make every status update fail. Failed updates are still recorded.
    pub fn fail_updates(&self, fail: bool) {
        self.inner.lock().unwrap().fail_updates = fail;
    }

    /// Every status update received, in order, including failed ones.
    #[must_use]
    pub fn status_updates(&self) -> Vec<(SessionId, SessionStatus)> {
        self.inner.lock().unwrap().status_updates.clone()
    }

    /// Statuses requested for one session, in order.
    #[must_use]
    pub fn updates_for(&self, session_id: &SessionId) -> Vec<SessionStatus> {
        self.inner
            .lock()
            .unwrap()
            .status_updates
            .iter()
            .filter(|(id, _)| id == session_id)
            .map(|(_, status)| *status)
            .collect()
    }

    /// Current persisted status of a session.
    #[must_use]
    pub fn status_of(&self, session_id: &SessionId) -> Option<SessionStatus> {
        self.inner
            .lock()
            .unwrap()
            .sessions
            .get(session_id)
            .map(|record| record.status)
    }

    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.inner.lock().unwrap().fetch_count
    }
}

#[async_trait::async_trait]
impl SessionDirectory for MockSessionDirectory {
    async fn fetch_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionRecord>, CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.fetch_count += 1;
        if inner.fail_fetches {
            return Err(CoordinatorError::SessionApi(
                "mock directory unavailable".to_string(),
            ));
        }
        Ok(inner.sessions.get(session_id).cloned())
    }
}

#[async_trait::async_trait]
impl SessionStatusWriter for MockSessionDirectory {
    async fn update_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
    ) -> Result<(), CoordinatorError> {
        let mut inner = self.inner.lock().unwrap();
        inner.status_updates.push((session_id.clone(), status));
        if inner.fail_updates {
            return Err(CoordinatorError::SessionApi(
                "mock status update failed".to_string(),
            ));
        }
        if let Some(record) = inner.sessions.get_mut(session_id) {
            record.status = status;
        }
        Ok(())
    }
}
