use crate::server::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Serialize;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub active_channels: usize,
    pub uptime_seconds: u64,
}

/// Health check endpoint returning structured JSON diagnostics
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let active_channels = state.coordinator.active_channel_count();
    crate::metrics::set_active_channels(active_channels);

    Json(HealthResponse {
        status: "ok",
        version: VERSION,
        active_channels,
        uptime_seconds: uptime,
    })
}
