//! Health check handlers

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::models::{HealthResponse, HealthStatus, SocketConfigResponse};
use crate::AppState;

/// Liveness probe
pub async fn root() -> &'static str {
    "ok"
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let uptime = state.started_at.elapsed().as_secs();
    let active_sessions = state.sessions.active_session_count().await;
    let engine_version = match state.engine.version().await {
        Ok(version) => Some(version),
        Err(e) => {
            tracing::warn!(error = %e, "Container engine unreachable");
            None
        }
    };

    // Determine health status
    let status = if engine_version.is_some() {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        active_sessions,
        engine_version,
    })
}

/// Address of the display service socket
pub async fn socket_config(State(state): State<Arc<AppState>>) -> Json<SocketConfigResponse> {
    Json(SocketConfigResponse {
        address: state.config.display_socket_address(),
    })
}
