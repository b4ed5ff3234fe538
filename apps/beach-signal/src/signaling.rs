use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

use crate::error::ProtocolError;

const KNOWN_TYPES: [&str; 4] = ["join", "offer", "answer", "candidate"];

/// Messages sent from a browser peer to the signaling server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Announce the peer and ask the server for an offer
    Join {
        #[serde(default)]
        name: Option<String>,
    },
    Offer {
        sdp: String,
    },
    Answer {
        sdp: String,
    },
    /// Trickled ICE candidate. The nested object is decoded separately so a bad
    /// candidate can be told apart from a bad envelope.
    Candidate {
        candidate: serde_json::Value,
    },
}

/// Messages sent from the signaling server to a browser peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate { candidate: RTCIceCandidateInit },
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Offer { .. } => "offer",
            ServerMessage::Answer { .. } => "answer",
            ServerMessage::Candidate { .. } => "candidate",
        }
    }
}

/// Decode one inbound text frame.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => Ok(message),
        Err(err) => {
            // A well-formed envelope with a tag we don't speak is ignored rather
            // than reported as malformed.
            if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(text) {
                if let Some(serde_json::Value::String(kind)) = map.get("type") {
                    if !KNOWN_TYPES.contains(&kind.as_str()) {
                        return Err(ProtocolError::UnknownType(kind.clone()));
                    }
                }
            }
            Err(ProtocolError::Malformed(err))
        }
    }
}

/// Decode the nested `candidate` object of a Candidate message.
pub fn decode_candidate(value: serde_json::Value) -> Result<RTCIceCandidateInit, ProtocolError> {
    serde_json::from_value(value).map_err(ProtocolError::Candidate)
}
