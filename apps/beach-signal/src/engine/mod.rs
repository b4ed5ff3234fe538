//! Seam between the signaling layer and the peer-connection engine.
//!
//! The signaling layer never looks inside an SDP or a candidate; it only moves
//! them between the browser and whatever implements [`NegotiationEngine`].

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

use crate::error::NegotiationError;
use crate::session::ChannelId;

pub mod memory;
pub mod rtc;

pub use memory::{MemoryEngine, MemoryEngineFactory, MemoryEngineOptions, MemoryEngineState};
pub use rtc::WebRtcEngineFactory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// Locally gathered candidate events, in the order the engine produced them.
#[derive(Debug, Clone)]
pub enum CandidateEvent {
    Discovered(RTCIceCandidateInit),
    /// End-of-candidates marker. Never forwarded to the browser.
    GatheringComplete,
}

/// One peer connection, exclusively owned by a session.
#[async_trait]
pub trait NegotiationEngine: Send + Sync {
    /// Create a local offer, apply it as the local description and return its SDP.
    async fn create_offer(&self) -> Result<String, NegotiationError>;

    async fn set_remote_description(
        &self,
        kind: SdpKind,
        sdp: String,
    ) -> Result<(), NegotiationError>;

    /// Create an answer to the current remote offer, apply it locally and return its SDP.
    async fn create_answer(&self) -> Result<String, NegotiationError>;

    async fn add_ice_candidate(
        &self,
        candidate: RTCIceCandidateInit,
    ) -> Result<(), NegotiationError>;

    /// Release the connection. Ends the candidate event stream.
    async fn close(&self) -> Result<(), NegotiationError>;
}

/// A freshly built engine plus the receiving end of its candidate events.
pub struct EngineHandle {
    pub engine: Box<dyn NegotiationEngine>,
    pub candidates: mpsc::UnboundedReceiver<CandidateEvent>,
}

#[async_trait]
pub trait EngineFactory: Send + Sync {
    async fn create(&self, channel_id: ChannelId) -> Result<EngineHandle, NegotiationError>;
}
