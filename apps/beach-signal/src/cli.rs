use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error};

use crate::config::Config;
use crate::signaling::{ClientMessage, ServerMessage};

#[derive(Parser, Debug)]
#[command(name = "beach-signal")]
#[command(about = "Beach Signal WebRTC signaling server and probe client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Port to listen on (overrides BEACH_SIGNAL_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Address to bind (overrides BEACH_SIGNAL_BIND)
    #[arg(long)]
    pub bind: Option<String>,

    /// Directory of client assets (overrides BEACH_SIGNAL_STATIC_DIR)
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// ICE server URL; repeat for several (overrides BEACH_SIGNAL_ICE_SERVERS)
    #[arg(long = "ice-server")]
    pub ice_servers: Vec<String>,

    /// Build peer connections without any STUN/TURN servers
    #[arg(long, conflicts_with = "ice_servers")]
    pub no_ice_servers: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Join a running server and print the offer it answers with
    Probe {
        /// Server URL (e.g., ws://localhost:8080)
        #[arg(short, long, default_value = "ws://localhost:8080")]
        url: String,

        /// Display name sent with the join
        #[arg(short, long)]
        name: Option<String>,

        /// Seconds to wait for the offer
        #[arg(long, default_value_t = 5)]
        wait: u64,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the environment configuration.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = &self.bind {
            config.bind = bind.clone();
        }
        if let Some(dir) = &self.static_dir {
            config.static_dir = dir.clone();
        }
        if self.no_ice_servers {
            config.ice_servers.clear();
        } else if !self.ice_servers.is_empty() {
            config.ice_servers = self.ice_servers.clone();
        }
        config
    }
}

fn ws_url(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/ws") {
        base.to_string()
    } else {
        format!("{}/ws", base)
    }
}

/// Connect, join, and return the SDP of the first offer the server sends.
pub async fn run_probe(url: String, name: Option<String>, wait: u64) -> Result<String> {
    let ws_url = ws_url(&url);
    debug!("Connecting to {}", ws_url);

    let (ws_stream, _) = match timeout(Duration::from_secs(5), connect_async(&ws_url)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            error!("Failed to connect to {}: {}", ws_url, e);
            return Err(anyhow!("Connection failed: {}", e));
        }
        Err(_) => {
            error!("Connection timeout after 5 seconds");
            bail!("Connection timeout - is the signaling server running?");
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let join = serde_json::to_string(&ClientMessage::Join { name })?;
    write.send(Message::Text(join.into())).await?;

    let offer = timeout(Duration::from_secs(wait), await_offer(&mut read))
        .await
        .map_err(|_| anyhow!("No offer received within {} seconds", wait))??;

    let _ = write.send(Message::Close(None)).await;
    Ok(offer)
}

async fn await_offer<S>(read: &mut S) -> Result<String>
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(frame) = read.next().await {
        match frame? {
            Message::Text(text) => match serde_json::from_str::<ServerMessage>(text.as_str()) {
                Ok(ServerMessage::Offer { sdp }) => return Ok(sdp),
                Ok(other) => debug!("Skipping {} frame", other.kind()),
                Err(e) => debug!("Skipping undecodable frame: {}", e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }
    Err(anyhow!("Server closed the connection before sending an offer"))
}
