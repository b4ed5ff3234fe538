//! Signaling coordinator that pairs browser peers with server-side WebRTC
//! peer connections over a small JSON protocol.

pub mod channel;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod forwarder;
pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod signaling;
pub mod websocket;

use std::net::SocketAddr;
use std::path::Path;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::handlers::health_check;
use crate::websocket::{websocket_handler, SignalingState};

/// Routes: `/ws` upgrade, `/health`, and the client assets for everything else.
pub fn router(state: SignalingState, static_dir: &Path) -> Router {
    let assets =
        ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .with_state(state)
        .fallback_service(assets)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve `app` until the listener fails. Peer addresses are exposed to handlers.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
