use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use super::{CandidateEvent, EngineFactory, EngineHandle, NegotiationEngine, SdpKind};
use crate::error::NegotiationError;
use crate::session::ChannelId;

/// Builds one `RTCPeerConnection` per session with the configured ICE servers.
#[derive(Debug, Clone)]
pub struct WebRtcEngineFactory {
    ice_servers: Vec<RTCIceServer>,
}

impl WebRtcEngineFactory {
    pub fn new(ice_servers: Vec<RTCIceServer>) -> Self {
        Self { ice_servers }
    }
}

/// ICE states that mean the browser has lost, or never reached, the media path.
fn ice_state_degraded(state: RTCIceConnectionState) -> bool {
    matches!(
        state,
        RTCIceConnectionState::Disconnected | RTCIceConnectionState::Failed
    )
}

fn build_api() -> Result<API, NegotiationError> {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs()?;

    let mut registry = Registry::new();
    registry = register_default_interceptors(registry, &mut media_engine)?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

#[async_trait]
impl EngineFactory for WebRtcEngineFactory {
    async fn create(&self, channel_id: ChannelId) -> Result<EngineHandle, NegotiationError> {
        let api = build_api()?;
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        let pc = Arc::new(api.new_peer_connection(config).await?);

        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            info!(channel_id = %channel_id, state = %state, "peer connection state changed");
            Box::pin(async {})
        }));

        pc.on_ice_connection_state_change(Box::new(move |state: RTCIceConnectionState| {
            if ice_state_degraded(state) {
                warn!(channel_id = %channel_id, state = %state, "ice connection state changed");
            } else {
                info!(channel_id = %channel_id, state = %state, "ice connection state changed");
            }
            Box::pin(async {})
        }));

        // Register before any local description exists so no candidate is missed.
        let (tx, rx) = mpsc::unbounded_channel();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let tx = tx.clone();
            Box::pin(async move {
                let event = match candidate {
                    Some(candidate) => match candidate.to_json() {
                        Ok(init) => CandidateEvent::Discovered(init),
                        Err(err) => {
                            warn!(channel_id = %channel_id, error = %err, "failed to serialize local candidate");
                            return;
                        }
                    },
                    None => CandidateEvent::GatheringComplete,
                };
                if tx.send(event).is_err() {
                    debug!(channel_id = %channel_id, "candidate event dropped after forwarder exit");
                }
            })
        }));

        Ok(EngineHandle {
            engine: Box::new(WebRtcEngine { pc }),
            candidates: rx,
        })
    }
}

pub struct WebRtcEngine {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl NegotiationEngine for WebRtcEngine {
    async fn create_offer(&self) -> Result<String, NegotiationError> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(offer.sdp)
    }

    async fn set_remote_description(
        &self,
        kind: SdpKind,
        sdp: String,
    ) -> Result<(), NegotiationError> {
        let description = match kind {
            SdpKind::Offer => RTCSessionDescription::offer(sdp)?,
            SdpKind::Answer => RTCSessionDescription::answer(sdp)?,
        };
        self.pc.set_remote_description(description).await?;
        Ok(())
    }

    async fn create_answer(&self) -> Result<String, NegotiationError> {
        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(answer.sdp)
    }

    async fn add_ice_candidate(
        &self,
        candidate: RTCIceCandidateInit,
    ) -> Result<(), NegotiationError> {
        self.pc.add_ice_candidate(candidate).await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), NegotiationError> {
        self.pc.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn only_lost_ice_states_are_degraded() {
        assert!(ice_state_degraded(RTCIceConnectionState::Disconnected));
        assert!(ice_state_degraded(RTCIceConnectionState::Failed));
        for state in [
            RTCIceConnectionState::New,
            RTCIceConnectionState::Checking,
            RTCIceConnectionState::Connected,
            RTCIceConnectionState::Completed,
            RTCIceConnectionState::Closed,
        ] {
            assert!(!ice_state_degraded(state), "{state} flagged as degraded");
        }
    }

    #[test_timeout::tokio_timeout_test(30)]
    async fn builds_offer_without_ice_servers() {
        let factory = WebRtcEngineFactory::new(Vec::new());
        let handle = factory.create(ChannelId::new()).await.unwrap();

        let sdp = handle.engine.create_offer().await.unwrap();
        assert!(sdp.starts_with("v=0"));

        handle.engine.close().await.unwrap();
    }

    #[test_timeout::tokio_timeout_test(30)]
    async fn rejects_answer_without_pending_offer() {
        let factory = WebRtcEngineFactory::new(Vec::new());
        let handle = factory.create(ChannelId::new()).await.unwrap();

        let result = handle.engine.create_answer().await;
        assert!(result.is_err());

        handle.engine.close().await.unwrap();
    }
}
