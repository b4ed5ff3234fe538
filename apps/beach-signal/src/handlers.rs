use axum::{extract::State, response::Json};
use serde::Serialize;

use crate::websocket::SignalingState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub sessions: usize,
    pub peers: Vec<String>,
}

pub async fn health_check(State(state): State<SignalingState>) -> Json<HealthResponse> {
    let registry = state.registry();
    Json(HealthResponse {
        status: "ok",
        sessions: registry.len(),
        peers: registry.names(),
    })
}
