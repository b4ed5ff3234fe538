use std::fmt::Display;

use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::ChannelError;
use crate::session::ChannelId;
use crate::signaling::ServerMessage;

/// Cloneable write handle for one client's WebSocket.
///
/// All clones feed the same writer task, which owns the socket's write half and
/// emits one complete text frame per message. That is what keeps candidate
/// forwarding and protocol replies from interleaving.
#[derive(Debug, Clone)]
pub struct OutboundChannel {
    channel_id: ChannelId,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl OutboundChannel {
    pub fn new(channel_id: ChannelId) -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { channel_id, tx }, rx)
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn send(&self, message: ServerMessage) -> Result<(), ChannelError> {
        self.tx.send(message).map_err(|_| ChannelError::Closed)
    }
}

pub fn encode_frame(message: &ServerMessage) -> Result<Message, ChannelError> {
    Ok(Message::Text(serde_json::to_string(message)?))
}

/// Drain `rx` into `sink` until every sender is gone or a write fails.
pub fn spawn_writer<S>(
    channel_id: ChannelId,
    mut sink: S,
    mut rx: mpsc::UnboundedReceiver<ServerMessage>,
) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display,
{
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let frame = match encode_frame(&message) {
                Ok(frame) => frame,
                Err(err) => {
                    error!(channel_id = %channel_id, kind = message.kind(), error = %err, "dropping unencodable frame");
                    continue;
                }
            };
            if let Err(err) = sink.send(frame).await {
                debug!(channel_id = %channel_id, error = %err, "websocket write failed");
                break;
            }
        }
        rx.close();
        let _ = sink.close().await;
        debug!("Message sender task ended for channel {}", channel_id);
    })
}
