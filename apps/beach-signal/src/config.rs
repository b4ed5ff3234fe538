use std::env;
use std::path::PathBuf;

use webrtc::ice_transport::ice_server::RTCIceServer;

pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub static_dir: PathBuf,
    /// STUN/TURN URLs handed to every new peer connection (`iceServers`).
    pub ice_servers: Vec<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            port: lookup("BEACH_SIGNAL_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            bind: lookup("BEACH_SIGNAL_BIND").unwrap_or(defaults.bind),
            static_dir: lookup("BEACH_SIGNAL_STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.static_dir),
            ice_servers: lookup("BEACH_SIGNAL_ICE_SERVERS")
                .map(|raw| parse_ice_servers(&raw))
                .unwrap_or(defaults.ice_servers),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn rtc_ice_servers(&self) -> Vec<RTCIceServer> {
        if self.ice_servers.is_empty() {
            return Vec::new();
        }
        vec![RTCIceServer {
            urls: self.ice_servers.clone(),
            ..Default::default()
        }]
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind: "0.0.0.0".to_string(),
            static_dir: PathBuf::from("./web"),
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
        }
    }
}

/// Comma-separated list; blanks are skipped, so an empty string means no servers.
fn parse_ice_servers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}
