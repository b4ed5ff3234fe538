use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

use crate::channel::OutboundChannel;
use crate::engine::NegotiationEngine;

/// Identity of one accepted WebSocket. Never reused across reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(Uuid);

impl ChannelId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The signaling layer only tells an open channel from a closed one; whether
/// media actually flows is the engine's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Negotiating,
    Closed,
}

/// One connected client and the peer connection it owns.
pub struct Session {
    channel_id: ChannelId,
    remote_addr: Option<SocketAddr>,
    connected_at: DateTime<Utc>,
    engine: Box<dyn NegotiationEngine>,
    outbound: OutboundChannel,
    name: RwLock<Option<String>>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(
        channel_id: ChannelId,
        remote_addr: Option<SocketAddr>,
        engine: Box<dyn NegotiationEngine>,
        outbound: OutboundChannel,
    ) -> Self {
        Self {
            channel_id,
            remote_addr,
            connected_at: Utc::now(),
            engine,
            outbound,
            name: RwLock::new(None),
            state: Mutex::new(SessionState::Negotiating),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    pub fn engine(&self) -> &dyn NegotiationEngine {
        self.engine.as_ref()
    }

    pub fn outbound(&self) -> &OutboundChannel {
        &self.outbound
    }

    pub fn name(&self) -> Option<String> {
        self.name.read().clone()
    }

    /// Blank names are treated as absent.
    pub fn set_name(&self, name: Option<String>) {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        *self.name.write() = name;
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Move to `Closed` and release the peer connection. Only the first call
    /// reaches the engine.
    pub async fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closed;
        }
        if let Err(err) = self.engine.close().await {
            warn!(channel_id = %self.channel_id, error = %err, "failed to close peer connection");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("channel_id", &self.channel_id)
            .field("remote_addr", &self.remote_addr)
            .field("name", &*self.name.read())
            .field("state", &self.state())
            .finish()
    }
}
