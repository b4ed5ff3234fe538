use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::{spawn_writer, OutboundChannel};
use crate::engine::EngineFactory;
use crate::error::ChannelError;
use crate::forwarder::spawn_candidate_forwarder;
use crate::protocol::handle_frame;
use crate::registry::SessionRegistry;
use crate::session::{ChannelId, Session};

/// Shared state handed to every connection handler
#[derive(Clone)]
pub struct SignalingState {
    registry: SessionRegistry,
    engines: Arc<dyn EngineFactory>,
}

impl SignalingState {
    pub fn new(engines: Arc<dyn EngineFactory>) -> Self {
        Self {
            registry: SessionRegistry::new(),
            engines,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }
}

/// WebSocket upgrade handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<SignalingState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Some(remote_addr)))
}

/// Run one client from upgrade to teardown.
async fn handle_socket(socket: WebSocket, state: SignalingState, remote_addr: Option<SocketAddr>) {
    let channel_id = ChannelId::new();
    let (mut sender, receiver) = socket.split();

    let handle = match state.engines.create(channel_id).await {
        Ok(handle) => handle,
        Err(err) => {
            error!(channel_id = %channel_id, error = %err, "failed to create peer connection");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    let (outbound, rx) = OutboundChannel::new(channel_id);
    let writer = spawn_writer(channel_id, sender, rx);
    let forwarder = spawn_candidate_forwarder(handle.candidates, outbound.clone());
    let session = Arc::new(Session::new(channel_id, remote_addr, handle.engine, outbound));
    state.registry.register(channel_id, &session);

    info!(
        channel_id = %channel_id,
        remote_addr = ?remote_addr,
        sessions = state.registry.len(),
        "websocket connected"
    );

    drive_inbound(&state.registry, channel_id, receiver).await;

    teardown(&state.registry, session, forwarder).await;
    // Every sender is gone now; the writer flushes what is queued and exits.
    let _ = writer.await;
    debug!(channel_id = %channel_id, "websocket disconnected");
}

/// Feed inbound frames to the protocol handler until the channel ends.
///
/// Each message is processed against the session currently registered for
/// `channel_id`; once that entry is gone the loop stops.
pub async fn drive_inbound<S>(registry: &SessionRegistry, channel_id: ChannelId, mut receiver: S)
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = receiver.next().await {
        let message = match frame {
            Ok(message) => message,
            Err(err) => {
                let err = ChannelError::from(err);
                warn!(channel_id = %channel_id, error = %err, "websocket read failed");
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text,
            Message::Binary(data) => match String::from_utf8(data) {
                Ok(text) => text,
                Err(_) => {
                    debug!(channel_id = %channel_id, "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => {
                debug!(channel_id = %channel_id, "received close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let Some(session) = registry.lookup(channel_id) else {
            debug!(channel_id = %channel_id, "session no longer registered; stopping receive loop");
            break;
        };
        handle_frame(&session, &text).await;
    }
}

/// Remove the session from the registry and release everything it owns.
pub async fn teardown(
    registry: &SessionRegistry,
    session: Arc<Session>,
    forwarder: JoinHandle<usize>,
) {
    let channel_id = session.channel_id();
    registry.unregister(channel_id);
    forwarder.abort();
    session.close().await;
    info!(
        channel_id = %channel_id,
        sessions = registry.len(),
        connected_for_secs = (chrono::Utc::now() - session.connected_at()).num_seconds(),
        "session closed"
    );
}
