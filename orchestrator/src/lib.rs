//! Dockside orchestrator library
//!
//! Runs one container per user session, bridges an interactive shell into it
//! and publishes the result as an image.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

pub mod api;
pub mod config;
pub mod container;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod tty;

#[cfg(test)]
pub(crate) mod testing;

/// Capacity of the publish event broadcast
const EVENT_CAPACITY: usize = 256;

/// Application state shared across all handlers
pub struct AppState {
    pub config: config::AppConfig,
    pub engine: Arc<dyn engine::ContainerEngine>,
    pub sessions: container::SessionManager,
    pub executor: container::CommandExecutor,
    pub publisher: container::CommitPipeline,
    pub terminal: tty::TerminalBridge,
    /// Publish progress for realtime subscribers
    pub events: broadcast::Sender<models::PublishNotice>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: config::AppConfig,
        engine: Arc<dyn engine::ContainerEngine>,
        connector: Arc<dyn tty::ShellConnector>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            sessions: container::SessionManager::new(config.docker.clone(), engine.clone()),
            executor: container::CommandExecutor::new(engine.clone(), &config.exec),
            publisher: container::CommitPipeline::new(engine.clone(), config.registry.clone()),
            terminal: tty::TerminalBridge::new(connector, config.ssh.input_buffer),
            engine,
            events,
            started_at: Instant::now(),
            config,
        }
    }
}
