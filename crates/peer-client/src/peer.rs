//! Peer connection lifecycle.
//!
//! `PeerConnection` drives one negotiated media channel for one session. It
//! is single-threaded cooperative: every method takes `&mut self`, and the
//! driver loop feeds it one event at a time.
//!
//! # Negotiation
//!
//! Both sides re-run offerer election on every `participants` update. Only
//! the elected side, and only while idle, starts a round by sending an offer.
//! One round may be in flight at a time:
//! - `create_offer` during a round fails with `NegotiationConflict`
//! - an offer received while connected, or while our own offer awaits its
//!   answer, is stale and ignored
//! - an answer received with no offer outstanding is stale and ignored
//!
//! Remote ICE candidates that arrive before the remote description are
//! queued and applied in arrival order right after it is set.

use crate::errors::PeerError;
use crate::media::{
    MediaConstraints, MediaEngine, MediaEvent, MediaTrack, TrackKind, TransportState,
};
use crate::signaling::SignalingSink;
use crate::state::{PeerState, SignalingHealth};

use common::election::is_offerer;
use common::protocol::{
    ClientMessage, Credential, IceCandidate, SdpKind, ServerMessage, SessionDescription,
};
use common::types::{SessionId, UserId};
use std::collections::{BTreeSet, VecDeque};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerUpdate {
    StateChanged(PeerState),
    Participants(Vec<UserId>),
    RemoteTrack(MediaTrack),
    Chat {
        from: UserId,
        message: String,
        at: i64,
    },
    SignalingHealth(SignalingHealth),
    /// An `error` reply from the coordinator.
    ServerError(String),
}

/// Point-in-time view of a peer connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSnapshot {
    pub state: PeerState,
    pub health: SignalingHealth,
    pub participants: Vec<UserId>,
    pub audio_muted: bool,
    pub video_off: bool,
    pub screen_sharing: bool,
    pub queued_candidates: usize,
}

/// Client side of one tutoring session's media channel.
pub struct PeerConnection {
    session_id: SessionId,
    local: UserId,
    credential: Credential,
    engine: Box<dyn MediaEngine>,
    signaling: Box<dyn SignalingSink>,
    updates: mpsc::UnboundedSender<PeerUpdate>,

    state: PeerState,
    health: SignalingHealth,
    failed_reconnects: u32,
    participants: BTreeSet<UserId>,

    /// Camera and microphone tracks.
    local_tracks: Vec<MediaTrack>,
    screen_track: Option<MediaTrack>,
    remote_tracks: Vec<MediaTrack>,
    audio_muted: bool,
    video_off: bool,

    /// Our offer is out and its answer has not arrived.
    awaiting_answer: bool,
    /// Member the current round or channel is with.
    round_peer: Option<UserId>,
    remote_description_set: bool,
    pending_candidates: VecDeque<IceCandidate>,
}

impl PeerConnection {
    /// Create a connection in state `new`.
    ///
    /// # Arguments
    ///
    /// * `session_id` - Session to join
    /// * `local` - Identity the credential was issued to
    /// * `credential` - Presented on every join
    /// * `engine` - Media capability binding
    /// * `signaling` - Outbound signaling link
    /// * `updates` - Presentation notifications; send failures are ignored
    #[must_use]
    pub fn new(
        session_id: SessionId,
        local: UserId,
        credential: Credential,
        engine: Box<dyn MediaEngine>,
        signaling: Box<dyn SignalingSink>,
        updates: mpsc::UnboundedSender<PeerUpdate>,
    ) -> Self {
        Self {
            session_id,
            local,
            credential,
            engine,
            signaling,
            updates,
            state: PeerState::New,
            health: SignalingHealth::Online,
            failed_reconnects: 0,
            participants: BTreeSet::new(),
            local_tracks: Vec::new(),
            screen_track: None,
            remote_tracks: Vec::new(),
            audio_muted: false,
            video_off: false,
            awaiting_answer: false,
            round_peer: None,
            remote_description_set: false,
            pending_candidates: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    #[must_use]
    pub fn local_identity(&self) -> &UserId {
        &self.local
    }

    #[must_use]
    pub fn state(&self) -> PeerState {
        self.state
    }

    #[must_use]
    pub fn signaling_health(&self) -> SignalingHealth {
        self.health
    }

    /// Members from the latest `participants` broadcast, adjusted by
    /// joined/left notices since.
    #[must_use]
    pub fn participants(&self) -> &BTreeSet<UserId> {
        &self.participants
    }

    /// The other member, if present.
    #[must_use]
    pub fn remote_identity(&self) -> Option<&UserId> {
        self.participants.iter().find(|id| *id != &self.local)
    }

    #[must_use]
    pub fn local_tracks(&self) -> &[MediaTrack] {
        &self.local_tracks
    }

    #[must_use]
    pub fn remote_tracks(&self) -> &[MediaTrack] {
        &self.remote_tracks
    }

    #[must_use]
    pub fn is_screen_sharing(&self) -> bool {
        self.screen_track.is_some()
    }

    /// Remote candidates waiting for a remote description.
    #[must_use]
    pub fn queued_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    #[must_use]
    pub fn snapshot(&self) -> PeerSnapshot {
        PeerSnapshot {
            state: self.state,
            health: self.health,
            participants: self.participants.iter().cloned().collect(),
            audio_muted: self.audio_muted,
            video_off: self.video_off,
            screen_sharing: self.screen_track.is_some(),
            queued_candidates: self.pending_candidates.len(),
        }
    }

    // ------------------------------------------------------------------
    // Media
    // ------------------------------------------------------------------

    /// Capture camera and microphone.
    ///
    /// # Errors
    ///
    /// - `DeviceUnavailable` when capture is refused; the state returns to
    ///   `new` and the caller should offer the fallback meeting link
    /// - `InvalidState` outside of `new`
    pub async fn acquire_local_media(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<Vec<MediaTrack>, PeerError> {
        self.ensure_open()?;
        if self.state != PeerState::New {
            return Err(PeerError::InvalidState {
                operation: "acquire media",
                state: self.state,
            });
        }
        if !self.local_tracks.is_empty() {
            return Ok(self.local_tracks.clone());
        }

        self.set_state(PeerState::AcquiringMedia);
        let result = self.engine.acquire_media(constraints).await;
        self.set_state(PeerState::New);

        match result {
            Ok(tracks) => {
                info!(
                    target: "peer.connection",
                    session_id = %self.session_id,
                    tracks = tracks.len(),
                    "Local media acquired"
                );
                self.local_tracks.clone_from(&tracks);
                Ok(tracks)
            }
            Err(cause) => {
                warn!(
                    target: "peer.connection",
                    session_id = %self.session_id,
                    error = %cause,
                    "Local media unavailable"
                );
                Err(PeerError::device_unavailable(cause))
            }
        }
    }

    /// Check that capture works without keeping any tracks.
    ///
    /// Returns the kinds of track that could be captured.
    ///
    /// # Errors
    ///
    /// `DeviceUnavailable` when capture is refused.
    pub async fn probe_devices(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<Vec<TrackKind>, PeerError> {
        self.ensure_open()?;
        let tracks = self
            .engine
            .acquire_media(constraints)
            .await
            .map_err(PeerError::device_unavailable)?;
        for track in &tracks {
            self.engine.stop_track(&track.id);
        }
        Ok(tracks.iter().map(|track| track.kind).collect())
    }

    /// Enable or disable outgoing audio. Never renegotiates.
    ///
    /// # Errors
    ///
    /// `Closed` after leave.
    pub fn toggle_audio(&mut self, muted: bool) -> Result<(), PeerError> {
        self.ensure_open()?;
        for track in self.local_tracks.iter().filter(|t| t.kind == TrackKind::Audio) {
            self.engine.set_track_enabled(&track.id, !muted);
        }
        self.audio_muted = muted;
        Ok(())
    }

    /// Enable or disable the camera track. Never renegotiates.
    ///
    /// # Errors
    ///
    /// `Closed` after leave.
    pub fn toggle_video(&mut self, off: bool) -> Result<(), PeerError> {
        self.ensure_open()?;
        for track in self.local_tracks.iter().filter(|t| t.kind == TrackKind::Video) {
            self.engine.set_track_enabled(&track.id, !off);
        }
        self.video_off = off;
        Ok(())
    }

    /// Send the screen instead of the camera on the existing video sender.
    ///
    /// # Errors
    ///
    /// - `DeviceUnavailable` when display capture is refused
    /// - `Engine` when the track cannot be swapped
    pub async fn start_screen_share(&mut self) -> Result<(), PeerError> {
        self.ensure_open()?;
        if self.screen_track.is_some() {
            return Ok(());
        }

        let screen = self
            .engine
            .acquire_display()
            .await
            .map_err(PeerError::device_unavailable)?;
        if let Err(e) = self.engine.replace_video_track(&screen).await {
            self.engine.stop_track(&screen.id);
            return Err(e.into());
        }

        debug!(
            target: "peer.connection",
            session_id = %self.session_id,
            track = %screen.id,
            "Screen share started"
        );
        self.screen_track = Some(screen);
        Ok(())
    }

    /// Stop sharing and put the camera back on the video sender.
    ///
    /// # Errors
    ///
    /// `Engine` when the camera track cannot be restored.
    pub async fn stop_screen_share(&mut self) -> Result<(), PeerError> {
        let Some(screen) = self.screen_track.take() else {
            return Ok(());
        };
        self.engine.stop_track(&screen.id);

        if self.state == PeerState::Closed {
            return Ok(());
        }
        if let Some(camera) = self.camera_track().cloned() {
            self.engine.replace_video_track(&camera).await?;
        }

        debug!(
            target: "peer.connection",
            session_id = %self.session_id,
            "Screen share stopped, camera restored"
        );
        Ok(())
    }

    fn camera_track(&self) -> Option<&MediaTrack> {
        self.local_tracks
            .iter()
            .find(|track| track.kind == TrackKind::Video)
    }

    // ------------------------------------------------------------------
    // Signaling
    // ------------------------------------------------------------------

    /// Ask the coordinator to admit us to the session room.
    ///
    /// # Errors
    ///
    /// `Signaling` when the join cannot be sent.
    pub async fn join(&mut self) -> Result<(), PeerError> {
        self.ensure_open()?;
        let message = ClientMessage::Join {
            session_id: self.session_id.clone(),
            credential: self.credential.clone(),
        };
        self.signaling.send(&message).await
    }

    /// # Errors
    ///
    /// `Signaling` when the message cannot be sent.
    pub async fn send_chat(&mut self, message: impl Into<String>) -> Result<(), PeerError> {
        self.ensure_open()?;
        let message = ClientMessage::Chat {
            session_id: self.session_id.clone(),
            message: message.into(),
        };
        self.signaling.send(&message).await
    }

    /// Re-establish signaling and re-join.
    ///
    /// A connected channel is left alone. Otherwise the current round is
    /// abandoned, election is re-run and negotiation retried. Failures are
    /// counted into [`signaling_health`](Self::signaling_health).
    ///
    /// # Errors
    ///
    /// `Signaling` when the link or the join fails.
    pub async fn reconnect(&mut self) -> Result<(), PeerError> {
        self.ensure_open()?;

        let result = match self.signaling.reconnect().await {
            Ok(()) => self.join().await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            self.failed_reconnects = self.failed_reconnects.saturating_add(1);
            self.set_health(SignalingHealth::after_failures(self.failed_reconnects));
            warn!(
                target: "peer.signaling",
                session_id = %self.session_id,
                attempts = self.failed_reconnects,
                error = %e,
                "Reconnect failed"
            );
            return Err(e);
        }

        self.failed_reconnects = 0;
        self.set_health(SignalingHealth::Online);
        info!(
            target: "peer.signaling",
            session_id = %self.session_id,
            state = %self.state,
            "Reconnected"
        );

        if self.state == PeerState::Connected {
            return Ok(());
        }

        self.reset_round();
        if self.state == PeerState::Negotiating {
            self.set_state(PeerState::Disconnected);
        }
        self.maybe_offer().await;
        Ok(())
    }

    /// Record that the signaling link dropped.
    pub fn signaling_lost(&mut self) {
        if self.state == PeerState::Closed {
            return;
        }
        if self.health == SignalingHealth::Online {
            warn!(
                target: "peer.signaling",
                session_id = %self.session_id,
                "Signaling link lost"
            );
            self.set_health(SignalingHealth::Reconnecting { attempts: 0 });
        }
    }

    // ------------------------------------------------------------------
    // Negotiation
    // ------------------------------------------------------------------

    /// Start a negotiation round by sending an offer.
    ///
    /// A no-op while connected.
    ///
    /// # Errors
    ///
    /// - `NegotiationConflict` while a round is in flight
    /// - `Engine` / `Signaling` when the round cannot start; the state moves
    ///   to `failed`
    pub async fn create_offer(&mut self) -> Result<(), PeerError> {
        self.ensure_open()?;
        match self.state {
            PeerState::Connected => {
                debug!(
                    target: "peer.connection",
                    session_id = %self.session_id,
                    "Already connected, offer skipped"
                );
                return Ok(());
            }
            PeerState::Negotiating => return Err(PeerError::NegotiationConflict),
            PeerState::AcquiringMedia => {
                return Err(PeerError::InvalidState {
                    operation: "create an offer",
                    state: self.state,
                });
            }
            _ => {}
        }

        self.remote_description_set = false;
        self.set_state(PeerState::Negotiating);

        let result = self.send_offer().await;
        if let Err(e) = &result {
            self.fail_round(e);
        }
        result
    }

    async fn send_offer(&mut self) -> Result<(), PeerError> {
        let offer = self.engine.create_offer().await?;
        self.engine.set_local_description(&offer).await?;
        self.awaiting_answer = true;
        self.round_peer = self.remote_identity().cloned();

        info!(
            target: "peer.connection",
            session_id = %self.session_id,
            remote = ?self.remote_identity(),
            "Sending offer"
        );
        let message = ClientMessage::Offer {
            session_id: self.session_id.clone(),
            sdp: offer,
        };
        self.signaling.send(&message).await
    }

    /// Apply a remote offer (and answer it) or a remote answer.
    ///
    /// # Errors
    ///
    /// - `NegotiationConflict` for a stale description: an offer while
    ///   connected or while our offer is outstanding, or an answer with no
    ///   offer outstanding
    /// - `Engine` / `Signaling` when applying fails; the state moves to
    ///   `failed`
    pub async fn apply_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), PeerError> {
        self.ensure_open()?;
        match description.kind {
            SdpKind::Offer => self.accept_offer(&description).await,
            SdpKind::Answer => self.accept_answer(&description).await,
        }
    }

    async fn accept_offer(&mut self, offer: &SessionDescription) -> Result<(), PeerError> {
        if self.awaiting_answer
            || matches!(
                self.state,
                PeerState::Connected | PeerState::AcquiringMedia
            )
        {
            return Err(PeerError::NegotiationConflict);
        }

        self.set_state(PeerState::Negotiating);
        let result = self.answer_offer(offer).await;
        if let Err(e) = &result {
            self.fail_round(e);
        }
        result
    }

    async fn answer_offer(&mut self, offer: &SessionDescription) -> Result<(), PeerError> {
        self.set_remote(offer).await?;
        let answer = self.engine.create_answer().await?;
        self.engine.set_local_description(&answer).await?;

        info!(
            target: "peer.connection",
            session_id = %self.session_id,
            "Sending answer"
        );
        let message = ClientMessage::Answer {
            session_id: self.session_id.clone(),
            sdp: answer,
        };
        self.signaling.send(&message).await
    }

    async fn accept_answer(&mut self, answer: &SessionDescription) -> Result<(), PeerError> {
        if !self.awaiting_answer {
            return Err(PeerError::NegotiationConflict);
        }
        self.awaiting_answer = false;

        let result = self.set_remote(answer).await;
        if let Err(e) = &result {
            self.fail_round(e);
        }
        result
    }

    async fn set_remote(&mut self, description: &SessionDescription) -> Result<(), PeerError> {
        self.engine.set_remote_description(description).await?;
        self.remote_description_set = true;
        self.flush_candidates().await;
        Ok(())
    }

    /// Apply a remote ICE candidate, or queue it until the remote
    /// description is set.
    ///
    /// # Errors
    ///
    /// `Engine` when the engine rejects the candidate.
    pub async fn add_ice_candidate(&mut self, candidate: IceCandidate) -> Result<(), PeerError> {
        self.ensure_open()?;
        if !self.remote_description_set {
            self.pending_candidates.push_back(candidate);
            debug!(
                target: "peer.connection",
                session_id = %self.session_id,
                queued = self.pending_candidates.len(),
                "Candidate queued until remote description"
            );
            return Ok(());
        }
        self.engine
            .add_ice_candidate(&candidate)
            .await
            .map_err(PeerError::from)
    }

    async fn flush_candidates(&mut self) {
        let queued = self.pending_candidates.len();
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = self.engine.add_ice_candidate(&candidate).await {
                warn!(
                    target: "peer.connection",
                    session_id = %self.session_id,
                    error = %e,
                    "Queued candidate rejected"
                );
            }
        }
        if queued > 0 {
            debug!(
                target: "peer.connection",
                session_id = %self.session_id,
                flushed = queued,
                "Queued candidates applied"
            );
        }
    }

    /// Start a round if we are the elected offerer and idle.
    async fn maybe_offer(&mut self) {
        if !self.state.is_idle() || !is_offerer(&self.local, &self.participants) {
            return;
        }
        if let Err(e) = self.create_offer().await {
            warn!(
                target: "peer.connection",
                session_id = %self.session_id,
                error = %e,
                "Could not start negotiation"
            );
        }
    }

    fn reset_round(&mut self) {
        self.awaiting_answer = false;
        self.round_peer = None;
        self.remote_description_set = false;
        self.pending_candidates.clear();
    }

    fn fail_round(&mut self, error: &PeerError) {
        warn!(
            target: "peer.connection",
            session_id = %self.session_id,
            error = %error,
            "Negotiation round failed"
        );
        self.reset_round();
        self.set_state(PeerState::Failed);
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Handle one message from the coordinator.
    pub async fn handle_server_message(&mut self, message: ServerMessage) {
        if self.state == PeerState::Closed {
            return;
        }
        if let Some(session_id) = message.session_id() {
            if session_id != &self.session_id {
                debug!(
                    target: "peer.signaling",
                    session_id = %session_id,
                    kind = message.kind(),
                    "Ignoring message for another session"
                );
                return;
            }
        }

        match message {
            ServerMessage::Joined { identity, .. } => {
                if identity != self.local {
                    warn!(
                        target: "peer.signaling",
                        session_id = %self.session_id,
                        expected = %self.local,
                        resolved = %identity,
                        "Coordinator resolved a different identity"
                    );
                }
            }
            ServerMessage::Participants { identities, .. } => {
                self.participants = identities.iter().cloned().collect();
                self.notify(PeerUpdate::Participants(identities));
                self.maybe_offer().await;
            }
            ServerMessage::ParticipantJoined { identity, .. } => {
                self.participants.insert(identity);
            }
            ServerMessage::ParticipantLeft { identity, .. } => {
                self.participants.remove(&identity);
                let ours = match &self.round_peer {
                    Some(peer) => *peer == identity,
                    None => true,
                };
                if identity != self.local
                    && ours
                    && matches!(self.state, PeerState::Negotiating | PeerState::Connected)
                {
                    info!(
                        target: "peer.connection",
                        session_id = %self.session_id,
                        remote = %identity,
                        state = %self.state,
                        "Remote left, channel abandoned"
                    );
                    self.reset_round();
                    self.set_state(PeerState::Disconnected);
                }
            }
            ServerMessage::Offer { from, sdp, .. } | ServerMessage::Answer { from, sdp, .. } => {
                self.on_remote_description(&from, sdp).await;
            }
            ServerMessage::IceCandidate { candidate, .. } => {
                if let Err(e) = self.add_ice_candidate(candidate).await {
                    warn!(
                        target: "peer.connection",
                        session_id = %self.session_id,
                        error = %e,
                        "Remote candidate rejected"
                    );
                }
            }
            ServerMessage::Chat {
                from, message, at, ..
            } => {
                self.notify(PeerUpdate::Chat { from, message, at });
            }
            ServerMessage::Error { message } => {
                warn!(
                    target: "peer.signaling",
                    session_id = %self.session_id,
                    error = %message,
                    "Coordinator reported an error"
                );
                self.notify(PeerUpdate::ServerError(message));
            }
        }
    }

    async fn on_remote_description(&mut self, from: &UserId, description: SessionDescription) {
        let kind = description.kind;
        match self.apply_remote_description(description).await {
            Ok(()) => self.round_peer = Some(from.clone()),
            Err(PeerError::NegotiationConflict) => {
                debug!(
                    target: "peer.connection",
                    session_id = %self.session_id,
                    from = %from,
                    kind = ?kind,
                    state = %self.state,
                    "Ignoring stale remote description"
                );
            }
            Err(e) => {
                warn!(
                    target: "peer.connection",
                    session_id = %self.session_id,
                    from = %from,
                    kind = ?kind,
                    error = %e,
                    "Remote description failed"
                );
            }
        }
    }

    /// Handle one notification from the media engine.
    pub async fn handle_media_event(&mut self, event: MediaEvent) {
        if self.state == PeerState::Closed {
            return;
        }

        match event {
            MediaEvent::LocalIceCandidate(candidate) => {
                let message = ClientMessage::IceCandidate {
                    session_id: self.session_id.clone(),
                    candidate,
                };
                if let Err(e) = self.signaling.send(&message).await {
                    debug!(
                        target: "peer.signaling",
                        session_id = %self.session_id,
                        error = %e,
                        "Local candidate not sent"
                    );
                }
            }
            MediaEvent::TransportStateChanged(transport) => {
                self.on_transport_state(transport).await;
            }
            MediaEvent::RemoteTrack(track) => {
                self.remote_tracks.push(track.clone());
                self.notify(PeerUpdate::RemoteTrack(track));
            }
            MediaEvent::ScreenShareEnded => {
                if let Err(e) = self.stop_screen_share().await {
                    warn!(
                        target: "peer.connection",
                        session_id = %self.session_id,
                        error = %e,
                        "Could not restore camera after screen share"
                    );
                }
            }
        }
    }

    /// Follow the engine's transport. A drop leaves us idle, so the elected
    /// side starts a fresh round with whoever is present now.
    async fn on_transport_state(&mut self, transport: TransportState) {
        match transport {
            TransportState::Connected => {
                self.awaiting_answer = false;
                self.set_state(PeerState::Connected);
            }
            TransportState::Disconnected => {
                if self.state == PeerState::Connected {
                    self.reset_round();
                    self.set_state(PeerState::Disconnected);
                    self.maybe_offer().await;
                }
            }
            TransportState::Failed => {
                if matches!(
                    self.state,
                    PeerState::Negotiating | PeerState::Connected | PeerState::Disconnected
                ) {
                    self.reset_round();
                    self.set_state(PeerState::Failed);
                    self.maybe_offer().await;
                }
            }
            TransportState::New | TransportState::Connecting | TransportState::Closed => {}
        }
    }

    // ------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------

    /// Leave the session: notify the coordinator, stop every local track,
    /// close the connection. Idempotent from any state.
    pub async fn leave(&mut self) {
        self.close_session(false).await;
    }

    /// [`leave`](Self::leave), asking the coordinator to mark the session
    /// completed.
    pub async fn end_call(&mut self) {
        self.close_session(true).await;
    }

    async fn close_session(&mut self, end_call: bool) {
        if self.state == PeerState::Closed {
            return;
        }

        let notice = ClientMessage::Leave {
            session_id: self.session_id.clone(),
            end_call,
        };
        if let Err(e) = self.signaling.send(&notice).await {
            warn!(
                target: "peer.signaling",
                session_id = %self.session_id,
                error = %e,
                "Leave notice not delivered"
            );
        }

        for track in self.local_tracks.drain(..) {
            self.engine.stop_track(&track.id);
        }
        if let Some(screen) = self.screen_track.take() {
            self.engine.stop_track(&screen.id);
        }
        self.remote_tracks.clear();
        self.reset_round();

        self.engine.close().await;
        self.signaling.close().await;
        self.set_state(PeerState::Closed);

        info!(
            target: "peer.connection",
            session_id = %self.session_id,
            end_call,
            "Left session"
        );
    }

    // ------------------------------------------------------------------

    fn ensure_open(&self) -> Result<(), PeerError> {
        if self.state == PeerState::Closed {
            return Err(PeerError::Closed);
        }
        Ok(())
    }

    fn set_state(&mut self, next: PeerState) {
        if self.state == next {
            return;
        }
        debug!(
            target: "peer.connection",
            session_id = %self.session_id,
            from = %self.state,
            to = %next,
            "State change"
        );
        self.state = next;
        self.notify(PeerUpdate::StateChanged(next));
    }

    fn set_health(&mut self, next: SignalingHealth) {
        if self.health == next {
            return;
        }
        self.health = next;
        self.notify(PeerUpdate::SignalingHealth(next));
    }

    fn notify(&self, update: PeerUpdate) {
        let _ = self.updates.send(update);
    }
}
