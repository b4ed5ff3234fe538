use thiserror::Error;

/// Transport-level failure on a client's WebSocket. Always fatal to the session.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel closed")]
    Closed,
    #[error("failed to encode outbound frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("websocket transport error: {0}")]
    Transport(#[from] axum::Error),
}

/// An inbound frame that could not be turned into a signaling message.
/// The frame is dropped; the session keeps running.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed signaling message: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown signaling message type `{0}`")]
    UnknownType(String),
    #[error("malformed ice candidate: {0}")]
    Candidate(#[source] serde_json::Error),
}

/// The peer-connection engine rejected an operation.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error(transparent)]
    Engine(#[from] webrtc::Error),
    #[error("negotiation rejected: {0}")]
    Rejected(String),
}
