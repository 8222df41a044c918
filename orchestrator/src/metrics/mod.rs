//! Prometheus metrics export
//!
//! Provides metrics endpoint for monitoring and alerting

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::tty::BridgeOutcome;
use crate::AppState;

/// Prometheus metrics recorder
static METRICS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize metrics system
pub fn init_metrics() -> anyhow::Result<()> {
    METRICS_HANDLE.get_or_try_init(|| {
        PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("dockside_exec_duration_seconds".to_string()),
                &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0],
            )?
            .install_recorder()
            .map_err(anyhow::Error::from)
    })?;
    Ok(())
}

/// Record a launch attempt
pub fn record_launch(success: bool) {
    let outcome = if success { "success" } else { "error" };
    counter!("dockside_launches_total", "outcome" => outcome).increment(1);
}

/// Record a shutdown; an already-gone container counts as success
pub fn record_shutdown(already_gone: bool) {
    let outcome = if already_gone { "already_gone" } else { "stopped" };
    counter!("dockside_shutdowns_total", "outcome" => outcome).increment(1);
}

/// Record a finished exec
pub fn record_exec(exit_code: Option<i64>, duration_secs: f64) {
    let outcome = match exit_code {
        Some(0) => "success",
        Some(_) => "nonzero",
        None => "error",
    };
    counter!("dockside_execs_total", "outcome" => outcome).increment(1);
    histogram!("dockside_exec_duration_seconds").record(duration_secs);
}

/// Record the terminal event of a publish
pub fn record_publish(success: bool) {
    let outcome = if success { "finished" } else { "failed" };
    counter!("dockside_publishes_total", "outcome" => outcome).increment(1);
}

pub fn record_bridge_opened() {
    gauge!("dockside_terminal_bridges_open").increment(1.0);
}

pub fn record_bridge_closed(outcome: &BridgeOutcome) {
    let label = match outcome {
        BridgeOutcome::Closed => "closed",
        BridgeOutcome::ShellFailed(_) => "shell_error",
        BridgeOutcome::ConnectionFailed(_) => "connection_error",
        BridgeOutcome::ClientGone => "client_gone",
    };
    gauge!("dockside_terminal_bridges_open").decrement(1.0);
    counter!("dockside_terminal_bridges_total", "outcome" => label).increment(1);
}

/// Prometheus metrics endpoint handler
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    // Update gauges with current values
    gauge!("dockside_active_sessions").set(state.sessions.active_session_count().await as f64);

    let metrics = METRICS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default();

    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        metrics,
    )
}
