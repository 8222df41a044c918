//! Dockside orchestrator - session containers with a browser terminal
//!
//! This is the main entry point for the orchestrator service.
//! It manages Docker containers and serves the HTTP and WebSocket API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderName;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use dockside_orchestrator::api::create_router;
use dockside_orchestrator::config::AppConfig;
use dockside_orchestrator::engine::{ContainerEngine, DockerEngine};
use dockside_orchestrator::logging::init_logging;
use dockside_orchestrator::tty::SshConnector;
use dockside_orchestrator::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_logging(&config.log_level, config.log_dir.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting Dockside orchestrator"
    );

    // Initialize metrics system
    dockside_orchestrator::metrics::init_metrics()?;
    info!("Prometheus metrics initialized");

    // Connect to the container engine
    let engine = DockerEngine::connect(&config.docker).context("Failed to configure Docker client")?;
    match engine.version().await {
        Ok(version) => info!(engine_version = %version, "Container engine reachable"),
        Err(e) => warn!(error = %e, "Container engine not reachable yet"),
    }

    let connector = Arc::new(SshConnector::new(config.ssh.clone()));

    let state = Arc::new(AppState::new(config.clone(), Arc::new(engine), connector));

    // Drop sessions whose containers were removed behind our back
    let sweep_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_state.config.docker.sweep_interval());
        loop {
            interval.tick().await;
            sweep_state.sessions.reap_stopped().await;
        }
    });

    // Build the router with all routes and middleware
    let x_request_id = HeaderName::from_static("x-request-id");
    let app = create_router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Bind to address
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(%addr, "Listening on");

    // Create the server
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");

    // Cleanup: stop all session containers if configured to do so
    if config.stop_sessions_on_exit {
        warn!("Stopping all session containers...");
        state.sessions.stop_all().await;
    }

    info!("Dockside orchestrator stopped");
    Ok(())
}

/// Handle shutdown signals gracefully
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
