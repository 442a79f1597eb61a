//! Peer connection and signaling link state.

use std::fmt;

/// Consecutive failed reconnects after which the link is reported offline.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Lifecycle of one negotiated media channel.
///
/// ```text
/// new -> acquiring-media -> new (media attached)
/// new -> negotiating -> connected -> disconnected
///            |              |
///            +--> failed <--+
/// any -> closed
/// ```
///
/// `new`, `disconnected` and `failed` are idle: the elected offerer may start
/// a round from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    New,
    AcquiringMedia,
    Negotiating,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerState {
    /// True when no round is in flight and no channel is established.
    #[must_use]
    pub fn is_idle(self) -> bool {
        matches!(
            self,
            PeerState::New | PeerState::Disconnected | PeerState::Failed
        )
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            PeerState::New => "new",
            PeerState::AcquiringMedia => "acquiring-media",
            PeerState::Negotiating => "negotiating",
            PeerState::Connected => "connected",
            PeerState::Disconnected => "disconnected",
            PeerState::Failed => "failed",
            PeerState::Closed => "closed",
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health of the signaling link, shown to the user as a persistent indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingHealth {
    Online,
    /// Reconnecting after `attempts` consecutive failures.
    Reconnecting { attempts: u32 },
    /// Gave up after [`MAX_RECONNECT_ATTEMPTS`]; only an explicit reconnect
    /// brings the link back.
    Offline,
}

impl SignalingHealth {
    /// Health after `attempts` consecutive failed reconnects.
    #[must_use]
    pub fn after_failures(attempts: u32) -> Self {
        if attempts >= MAX_RECONNECT_ATTEMPTS {
            SignalingHealth::Offline
        } else {
            SignalingHealth::Reconnecting { attempts }
        }
    }
}
