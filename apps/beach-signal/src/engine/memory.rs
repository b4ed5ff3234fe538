//! In-process engine that records what the signaling layer asked of it.
//! Used by the test suites; it never touches the network.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

use super::{CandidateEvent, EngineFactory, EngineHandle, NegotiationEngine, SdpKind};
use crate::error::NegotiationError;
use crate::session::ChannelId;

#[derive(Debug, Clone, Default)]
pub struct MemoryEngineOptions {
    /// Every offer/answer request fails.
    pub reject_negotiation: bool,
    /// Candidate lines emitted each time a local description is applied.
    pub local_candidates: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemoryEngineState {
    pub local: Option<(SdpKind, String)>,
    pub remote: Option<(SdpKind, String)>,
    pub candidates: Vec<RTCIceCandidateInit>,
    pub offers_created: usize,
    pub answers_created: usize,
    pub closed: bool,
}

pub struct MemoryEngine {
    channel_id: ChannelId,
    options: MemoryEngineOptions,
    state: Arc<Mutex<MemoryEngineState>>,
    events: Mutex<Option<mpsc::UnboundedSender<CandidateEvent>>>,
}

impl MemoryEngine {
    pub fn new(channel_id: ChannelId, options: MemoryEngineOptions) -> (Self, EngineParts) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = Arc::new(Mutex::new(MemoryEngineState::default()));
        let engine = Self {
            channel_id,
            options,
            state: state.clone(),
            events: Mutex::new(Some(tx)),
        };
        (engine, EngineParts { state, events: rx })
    }

    fn ensure_open(&self) -> Result<(), NegotiationError> {
        if self.state.lock().closed {
            return Err(NegotiationError::Rejected("connection closed".into()));
        }
        Ok(())
    }

    fn gather(&self) {
        let events = self.events.lock();
        let Some(tx) = events.as_ref() else {
            return;
        };
        for (index, line) in self.options.local_candidates.iter().enumerate() {
            let _ = tx.send(CandidateEvent::Discovered(RTCIceCandidateInit {
                candidate: line.clone(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
                username_fragment: Some(format!("frag{index}")),
            }));
        }
        let _ = tx.send(CandidateEvent::GatheringComplete);
    }

    fn description(&self, kind: SdpKind, serial: usize) -> String {
        let label = match kind {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        };
        format!(
            "v=0\r\no=- {serial} 1 IN IP4 127.0.0.1\r\ns=memory-{label}-{}\r\nt=0 0\r\n",
            self.channel_id
        )
    }
}

/// The pieces of a [`MemoryEngine`] that stay with whoever built it.
pub struct EngineParts {
    pub state: Arc<Mutex<MemoryEngineState>>,
    pub events: mpsc::UnboundedReceiver<CandidateEvent>,
}

#[async_trait]
impl NegotiationEngine for MemoryEngine {
    async fn create_offer(&self) -> Result<String, NegotiationError> {
        self.ensure_open()?;
        if self.options.reject_negotiation {
            return Err(NegotiationError::Rejected("offer refused".into()));
        }
        let sdp = {
            let mut state = self.state.lock();
            state.offers_created += 1;
            let sdp = self.description(SdpKind::Offer, state.offers_created);
            state.local = Some((SdpKind::Offer, sdp.clone()));
            sdp
        };
        self.gather();
        Ok(sdp)
    }

    async fn set_remote_description(
        &self,
        kind: SdpKind,
        sdp: String,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        if !sdp.starts_with("v=0") {
            return Err(NegotiationError::Rejected("not a session description".into()));
        }
        let mut state = self.state.lock();
        match (kind, state.local.as_ref().map(|(local, _)| *local)) {
            (SdpKind::Offer, Some(SdpKind::Offer)) => {
                return Err(NegotiationError::Rejected(
                    "remote offer while local offer pending".into(),
                ));
            }
            (SdpKind::Answer, local) if local != Some(SdpKind::Offer) => {
                return Err(NegotiationError::Rejected(
                    "remote answer without local offer".into(),
                ));
            }
            _ => {}
        }
        state.remote = Some((kind, sdp));
        Ok(())
    }

    async fn create_answer(&self) -> Result<String, NegotiationError> {
        self.ensure_open()?;
        if self.options.reject_negotiation {
            return Err(NegotiationError::Rejected("answer refused".into()));
        }
        let sdp = {
            let mut state = self.state.lock();
            if !matches!(state.remote, Some((SdpKind::Offer, _))) {
                return Err(NegotiationError::Rejected("no remote offer".into()));
            }
            state.answers_created += 1;
            let sdp = self.description(SdpKind::Answer, state.answers_created);
            state.local = Some((SdpKind::Answer, sdp.clone()));
            sdp
        };
        self.gather();
        Ok(sdp)
    }

    async fn add_ice_candidate(
        &self,
        candidate: RTCIceCandidateInit,
    ) -> Result<(), NegotiationError> {
        self.ensure_open()?;
        self.state.lock().candidates.push(candidate);
        Ok(())
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.state.lock().closed = true;
        self.events.lock().take();
        Ok(())
    }
}

/// Hands out [`MemoryEngine`]s and keeps their state for inspection.
#[derive(Clone, Default)]
pub struct MemoryEngineFactory {
    options: MemoryEngineOptions,
    refuse_create: bool,
    created: Arc<Mutex<Vec<(ChannelId, Arc<Mutex<MemoryEngineState>>)>>>,
}

impl MemoryEngineFactory {
    pub fn new(options: MemoryEngineOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse_create: true,
            ..Default::default()
        }
    }

    pub fn created(&self) -> Vec<(ChannelId, Arc<Mutex<MemoryEngineState>>)> {
        self.created.lock().clone()
    }

    pub fn state_for(&self, channel_id: ChannelId) -> Option<Arc<Mutex<MemoryEngineState>>> {
        self.created
            .lock()
            .iter()
            .find(|(id, _)| *id == channel_id)
            .map(|(_, state)| state.clone())
    }
}

#[async_trait]
impl EngineFactory for MemoryEngineFactory {
    async fn create(&self, channel_id: ChannelId) -> Result<EngineHandle, NegotiationError> {
        if self.refuse_create {
            return Err(NegotiationError::Rejected("engine unavailable".into()));
        }
        let (engine, parts) = MemoryEngine::new(channel_id, self.options.clone());
        self.created.lock().push((channel_id, parts.state));
        Ok(EngineHandle {
            engine: Box::new(engine),
            candidates: parts.events,
        })
    }
}
