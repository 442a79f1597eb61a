//! Scriptable media engine mock.
//!
//! Records every call and keeps just enough state to check negotiation
//! ordering: a candidate added before any remote description is an error,
//! as it is in a real engine. Clones share state.

use common::protocol::{IceCandidate, SdpKind, SessionDescription};
use peer_client::{MediaConstraints, MediaEngine, MediaError, MediaTrack, TrackId, TrackKind};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    AcquireMedia,
    AcquireDisplay,
    CreateOffer,
    CreateAnswer,
    SetLocalDescription(SdpKind),
    SetRemoteDescription(SdpKind),
    AddIceCandidate(String),
    ReplaceVideoTrack(TrackId),
    SetTrackEnabled(TrackId, bool),
    StopTrack(TrackId),
    Close,
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<EngineCall>,
    deny_media: Option<MediaError>,
    deny_display: Option<MediaError>,
    fail_remote_descriptions: bool,
    next_track: u32,
    local_description: Option<SessionDescription>,
    remote_description: Option<SessionDescription>,
    applied_candidates: Vec<IceCandidate>,
    enabled: HashMap<TrackId, bool>,
    stopped: HashSet<TrackId>,
    outgoing_video: Option<TrackId>,
    closed: bool,
}

impl Inner {
    fn track(&mut self, prefix: &str, kind: TrackKind) -> MediaTrack {
        self.next_track += 1;
        let id = TrackId(format!("{prefix}-{}", self.next_track));
        self.enabled.insert(id.clone(), true);
        MediaTrack { id, kind }
    }
}

/// Mock media engine.
#[derive(Debug, Clone, Default)]
pub struct MockMediaEngine {
    inner: Arc<Mutex<Inner>>,
}

impl MockMediaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse camera/microphone capture with `error`.
    #[must_use]
    pub fn denying_media(self, error: MediaError) -> Self {
        self.inner.lock().unwrap().deny_media = Some(error);
        self
    }

    /// Refuse display capture with `error`.
    #[must_use]
    pub fn denying_display(self, error: MediaError) -> Self {
        self.inner.lock().unwrap().deny_display = Some(error);
        self
    }

    /// Reject every remote description.
    pub fn fail_remote_descriptions(&self, fail: bool) {
        self.inner.lock().unwrap().fail_remote_descriptions = fail;
    }

    #[must_use]
    pub fn calls(&self) -> Vec<EngineCall> {
        self.inner.lock().unwrap().calls.clone()
    }

    #[must_use]
    pub fn count(&self, call: &EngineCall) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| *c == call)
            .count()
    }

    #[must_use]
    pub fn offers_created(&self) -> usize {
        self.count(&EngineCall::CreateOffer)
    }

    #[must_use]
    pub fn answers_created(&self) -> usize {
        self.count(&EngineCall::CreateAnswer)
    }

    #[must_use]
    pub fn local_description(&self) -> Option<SessionDescription> {
        self.inner.lock().unwrap().local_description.clone()
    }

    #[must_use]
    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.lock().unwrap().remote_description.clone()
    }

    /// Candidates accepted by the engine, in order.
    #[must_use]
    pub fn applied_candidates(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .applied_candidates
            .iter()
            .map(|c| c.candidate.clone())
            .collect()
    }

    #[must_use]
    pub fn is_enabled(&self, track: &TrackId) -> bool {
        self.inner
            .lock()
            .unwrap()
            .enabled
            .get(track)
            .copied()
            .unwrap_or(false)
    }

    #[must_use]
    pub fn is_stopped(&self, track: &TrackId) -> bool {
        self.inner.lock().unwrap().stopped.contains(track)
    }

    /// Track currently on the outgoing video sender.
    #[must_use]
    pub fn outgoing_video(&self) -> Option<TrackId> {
        self.inner.lock().unwrap().outgoing_video.clone()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

#[async_trait::async_trait]
impl MediaEngine for MockMediaEngine {
    async fn acquire_media(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<Vec<MediaTrack>, MediaError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::AcquireMedia);
        if let Some(error) = inner.deny_media.clone() {
            return Err(error);
        }

        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(inner.track("mic", TrackKind::Audio));
        }
        if constraints.video.is_some() {
            let camera = inner.track("cam", TrackKind::Video);
            inner.outgoing_video = Some(camera.id.clone());
            tracks.push(camera);
        }
        Ok(tracks)
    }

    async fn acquire_display(&mut self) -> Result<MediaTrack, MediaError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::AcquireDisplay);
        if let Some(error) = inner.deny_display.clone() {
            return Err(error);
        }
        Ok(inner.track("screen", TrackKind::Video))
    }

    async fn create_offer(&mut self) -> Result<SessionDescription, MediaError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::CreateOffer);
        let n = inner
            .calls
            .iter()
            .filter(|c| **c == EngineCall::CreateOffer)
            .count();
        Ok(SessionDescription::offer(format!("v=0 mock-offer-{n}")))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, MediaError> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::CreateAnswer);
        if inner.remote_description.is_none() {
            return Err(MediaError::Engine("no remote offer".to_string()));
        }
        Ok(SessionDescription::answer("v=0 mock-answer"))
    }

    async fn set_local_description(
        &mut self,
        description: &SessionDescription,
    ) -> Result<(), MediaError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(EngineCall::SetLocalDescription(description.kind));
        inner.local_description = Some(description.clone());
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        description: &SessionDescription,
    ) -> Result<(), MediaError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(EngineCall::SetRemoteDescription(description.kind));
        if inner.fail_remote_descriptions {
            return Err(MediaError::Engine("remote description rejected".to_string()));
        }
        inner.remote_description = Some(description.clone());
        Ok(())
    }

    async fn add_ice_candidate(&mut self, candidate: &IceCandidate) -> Result<(), MediaError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(EngineCall::AddIceCandidate(candidate.candidate.clone()));
        if inner.remote_description.is_none() {
            return Err(MediaError::Engine(
                "candidate added before remote description".to_string(),
            ));
        }
        inner.applied_candidates.push(candidate.clone());
        Ok(())
    }

    async fn replace_video_track(&mut self, track: &MediaTrack) -> Result<(), MediaError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(EngineCall::ReplaceVideoTrack(track.id.clone()));
        inner.outgoing_video = Some(track.id.clone());
        Ok(())
    }

    fn set_track_enabled(&mut self, track: &TrackId, enabled: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .calls
            .push(EngineCall::SetTrackEnabled(track.clone(), enabled));
        inner.enabled.insert(track.clone(), enabled);
    }

    fn stop_track(&mut self, track: &TrackId) {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(EngineCall::StopTrack(track.clone()));
        inner.stopped.insert(track.clone());
        if inner.outgoing_video.as_ref() == Some(track) {
            inner.outgoing_video = None;
        }
    }

    async fn close(&mut self) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.closed {
            inner.calls.push(EngineCall::Close);
        }
        inner.closed = true;
    }
}
