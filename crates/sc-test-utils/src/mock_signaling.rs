//! Recording signaling sink with switchable failures.

use common::protocol::ClientMessage;
use peer_client::{PeerError, SignalingSink};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    sent: Vec<ClientMessage>,
    offline: bool,
    reconnect_attempts: usize,
    closed: bool,
}

/// Mock signaling link. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockSignaling {
    inner: Arc<Mutex<Inner>>,
}

impl MockSignaling {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// While offline, sends and reconnects fail.
    pub fn set_offline(&self, offline: bool) {
        self.inner.lock().unwrap().offline = offline;
    }

    /// Every message sent while online, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Sent messages of one kind (`"offer"`, `"join"`, ...).
    #[must_use]
    pub fn sent_of_kind(&self, kind: &str) -> Vec<ClientMessage> {
        self.sent()
            .into_iter()
            .filter(|message| message.kind() == kind)
            .collect()
    }

    /// Forget everything sent so far.
    pub fn clear(&self) {
        self.inner.lock().unwrap().sent.clear();
    }

    #[must_use]
    pub fn reconnect_attempts(&self) -> usize {
        self.inner.lock().unwrap().reconnect_attempts
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

#[async_trait::async_trait]
impl SignalingSink for MockSignaling {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), PeerError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.offline {
            return Err(PeerError::Signaling("mock link offline".to_string()));
        }
        inner.sent.push(message.clone());
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), PeerError> {
        let mut inner = self.inner.lock().unwrap();
        inner.reconnect_attempts += 1;
        if inner.offline {
            return Err(PeerError::Signaling("mock link offline".to_string()));
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.inner.lock().unwrap().closed = true;
    }
}
