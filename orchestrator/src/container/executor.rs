//! Command execution within containers

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::ExecConfig;
use crate::engine::{ContainerEngine, EngineError, ExecState};

use super::error::{ExecError, ExecTimeoutError};

/// Runs one-off commands inside containers and waits for their exit code
pub struct CommandExecutor {
    engine: Arc<dyn ContainerEngine>,
    poll_interval: Duration,
    timeout: Duration,
    max_polls: u32,
}

impl CommandExecutor {
    pub fn new(engine: Arc<dyn ContainerEngine>, config: &ExecConfig) -> Self {
        Self {
            engine,
            poll_interval: config.poll_interval(),
            timeout: config.timeout(),
            max_polls: config.poll_budget(),
        }
    }

    /// Run `argv` in the container and return its exit code
    pub async fn exec(&self, container_id: &str, argv: &[String]) -> Result<i64, ExecError> {
        if argv.first().map_or(true, |program| program.trim().is_empty()) {
            return Err(ExecError::EmptyCommand);
        }

        let exec_id = self
            .engine
            .create_exec(container_id, argv)
            .await
            .map_err(|e| match e {
                EngineError::NotFound(_) => ExecError::ContainerNotFound(container_id.to_string()),
                EngineError::Conflict(_) => ExecError::NotRunning(container_id.to_string()),
                other => ExecError::Create(other),
            })?;

        debug!(container_id = %container_id, exec_id = %exec_id, argv = ?argv, "Starting exec");

        self.engine
            .start_exec(&exec_id)
            .await
            .map_err(ExecError::Start)?;

        let started = Instant::now();
        let exit_code = match timeout(self.timeout, self.wait(container_id, &exec_id)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ExecTimeoutError {
                    exec_id,
                    polls: self.max_polls,
                    elapsed: started.elapsed(),
                }
                .into())
            }
        };

        info!(
            container_id = %container_id,
            exec_id = %exec_id,
            exit_code = exit_code,
            duration_ms = started.elapsed().as_millis() as u64,
            "Exec finished"
        );

        Ok(exit_code)
    }

    /// Poll the exec instance until it exits or the poll budget runs out
    async fn wait(&self, container_id: &str, exec_id: &str) -> Result<i64, ExecError> {
        let started = Instant::now();
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        for _ in 0..self.max_polls {
            ticker.tick().await;

            let state = self
                .engine
                .inspect_exec(exec_id)
                .await
                .map_err(ExecError::Inspect)?;

            match state {
                ExecState {
                    running: false,
                    exit_code: Some(code),
                } => return Ok(code),
                ExecState { running: true, .. } => {
                    let alive = self
                        .engine
                        .is_running(container_id)
                        .await
                        .map_err(ExecError::Inspect)?;
                    if !alive {
                        warn!(container_id = %container_id, exec_id = %exec_id, "Container vanished during exec");
                        return Err(ExecError::ContainerGone(container_id.to_string()));
                    }
                }
                // Not started yet
                ExecState { .. } => {}
            }
        }

        Err(ExecTimeoutError {
            exec_id: exec_id.to_string(),
            polls: self.max_polls,
            elapsed: started.elapsed(),
        }
        .into())
    }
}
