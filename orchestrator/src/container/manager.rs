//! Container lifecycle management

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::DockerConfig;
use crate::engine::{ContainerEngine, ContainerSpec, EngineError, ImageReference};
use crate::models::{ContainerSummary, FsChange, SessionInfo};

use super::error::{LaunchError, SessionError, ShutdownError};
use super::session::{Session, SessionHandle, SessionState};

/// Container names accepted by the engine
static CONTAINER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9][a-zA-Z0-9_.-]*$").expect("valid container name regex"));

/// Manages container lifecycle and sessions
pub struct SessionManager {
    config: DockerConfig,

    engine: Arc<dyn ContainerEngine>,

    /// Live sessions by session ID
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionManager {
    pub fn new(config: DockerConfig, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            config,
            engine,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_valid_name(name: &str) -> bool {
        CONTAINER_NAME.is_match(name)
    }

    /// Create and start a container for `name`, returning its id.
    ///
    /// A container that was created but failed to start is stopped again so
    /// nothing stays active.
    pub async fn launch(&self, name: &str) -> Result<String, LaunchError> {
        if !Self::is_valid_name(name) {
            return Err(LaunchError::InvalidName(name.to_string()));
        }

        let image = ImageReference::parse(&self.config.image);

        if self.config.force_pull {
            info!(image = %image, "Pulling base image");
            self.engine
                .pull_image(&image)
                .await
                .map_err(|source| LaunchError::Pull {
                    image: image.to_string(),
                    source,
                })?;
        }

        let ports = &self.config.ports;
        let spec = ContainerSpec {
            name: name.to_string(),
            image: image.to_string(),
            port_bindings: vec![
                (ports.shell_container, ports.shell_host),
                (ports.display_container, ports.display_host),
            ],
            auto_remove: true,
        };

        debug!(spec = ?spec, "Creating container");

        let container_id = self
            .engine
            .create_container(&spec)
            .await
            .map_err(|source| LaunchError::Create {
                name: name.to_string(),
                source,
            })?;

        if let Err(source) = self.engine.start_container(&container_id).await {
            error!(container_id = %container_id, error = %source, "Container start failed");
            self.discard_container(&container_id).await;
            return Err(LaunchError::Start {
                container_id,
                source,
            });
        }

        info!(container_id = %container_id, name = %name, "Container started");

        Ok(container_id)
    }

    /// Stop a container; auto-remove deletes it afterwards
    pub async fn shutdown(&self, container_id: &str) -> Result<(), ShutdownError> {
        match self.engine.stop_container(container_id).await {
            Ok(()) => {
                info!(container_id = %container_id, "Container stopped");
            }
            Err(EngineError::NotFound(_)) | Err(EngineError::NotModified(_)) => {
                warn!(container_id = %container_id, "Container already gone");
                self.forget_container(container_id).await;
                return Err(ShutdownError::AlreadyGone(container_id.to_string()));
            }
            Err(source) => {
                return Err(ShutdownError::Engine {
                    container_id: container_id.to_string(),
                    source,
                });
            }
        }

        self.forget_container(container_id).await;
        Ok(())
    }

    /// The engine's current container list
    pub async fn list(&self) -> Result<Vec<ContainerSummary>, EngineError> {
        self.engine.list_containers().await
    }

    /// Filesystem changes under the workspace root, `.git` excluded
    pub async fn changes(&self, container_id: &str) -> Result<Vec<FsChange>, EngineError> {
        let root = self.config.workspace_root.trim_end_matches('/');
        let prefix = format!("{}/", root);

        let changes = self.engine.container_changes(container_id).await?;

        Ok(changes
            .into_iter()
            .filter(|change| change.path.starts_with(&prefix))
            .filter(|change| !change.path.split('/').any(|part| part == ".git"))
            .collect())
    }

    /// Register a pending session
    pub async fn open(&self, name: &str) -> Result<SessionHandle, LaunchError> {
        if !Self::is_valid_name(name) {
            return Err(LaunchError::InvalidName(name.to_string()));
        }

        let session = Arc::new(Session::new(name));
        self.sessions
            .write()
            .await
            .insert(session.session_id, session.clone());

        debug!(session_id = %session.session_id, name = %name, "Session opened");

        Ok(session)
    }

    /// Stop a container no session will own; failures are only logged
    async fn discard_container(&self, container_id: &str) {
        match self.engine.stop_container(container_id).await {
            Ok(()) => debug!(container_id = %container_id, "Discarded unowned container"),
            Err(e @ (EngineError::NotFound(_) | EngineError::NotModified(_))) => {
                debug!(container_id = %container_id, error = %e, "Unowned container already stopped")
            }
            Err(e) => warn!(container_id = %container_id, error = %e, "Failed to discard unowned container"),
        }
    }

    /// Launch the session's container and bind it.
    ///
    /// On failure the session is unregistered and never becomes running.
    pub async fn start_session(&self, session: &SessionHandle) -> Result<String, LaunchError> {
        if session.state().await != SessionState::Pending {
            return Err(LaunchError::AlreadyLaunched(session.session_id));
        }

        let container_id = match self.launch(&session.name).await {
            Ok(id) => id,
            Err(e) => {
                session.mark_stopped().await;
                self.sessions.write().await.remove(&session.session_id);
                return Err(e);
            }
        };

        if !session.bind_container(container_id.clone()).await {
            // Lost a race with another launch of the same session
            self.discard_container(&container_id).await;
            return Err(LaunchError::AlreadyLaunched(session.session_id));
        }

        info!(
            session_id = %session.session_id,
            container_id = %container_id,
            "Session launched"
        );

        Ok(container_id)
    }

    /// Open and start a session in one step
    pub async fn launch_session(&self, name: &str) -> Result<SessionHandle, LaunchError> {
        let session = self.open(name).await?;
        self.start_session(&session).await?;
        Ok(session)
    }

    pub async fn get(&self, session_id: &Uuid) -> Option<SessionHandle> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn session_info(&self, session_id: &Uuid) -> Option<SessionInfo> {
        let session = self.get(session_id).await?;
        Some(session.info().await)
    }

    /// Shut down the container bound to a session and drop the session
    pub async fn shutdown_session(&self, session_id: &Uuid) -> Result<String, ShutdownError> {
        let session = self
            .get(session_id)
            .await
            .ok_or(ShutdownError::UnknownSession(*session_id))?;

        let container_id = session
            .container_id()
            .ok_or(ShutdownError::NotLaunched(*session_id))?
            .to_string();

        self.shutdown(&container_id).await?;
        Ok(container_id)
    }

    /// Bound container of a running session
    pub async fn container_for(&self, session_id: &Uuid) -> Result<String, SessionError> {
        let session = self
            .get(session_id)
            .await
            .ok_or(SessionError::Unknown(*session_id))?;

        match session.state().await {
            SessionState::Pending => Err(SessionError::Pending(*session_id)),
            SessionState::Stopped => Err(SessionError::Stopped(*session_id)),
            SessionState::Running => session
                .container_id()
                .map(str::to_string)
                .ok_or(SessionError::Pending(*session_id)),
        }
    }

    /// Like [`container_for`](Self::container_for), but also confirms with the engine
    /// that the container is still running
    pub async fn ensure_running(&self, session_id: &Uuid) -> Result<String, SessionError> {
        let container_id = self.container_for(session_id).await?;

        if !self.engine.is_running(&container_id).await? {
            warn!(
                session_id = %session_id,
                container_id = %container_id,
                "Session container was removed externally"
            );
            self.forget_container(&container_id).await;
            return Err(SessionError::Stopped(*session_id));
        }

        if let Some(session) = self.get(session_id).await {
            session.touch().await;
        }

        Ok(container_id)
    }

    /// Mark every session bound to `container_id` stopped and drop it
    pub async fn forget_container(&self, container_id: &str) {
        let removed: Vec<SessionHandle> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .values()
                .filter(|s| s.container_id() == Some(container_id))
                .map(|s| s.session_id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in removed {
            session.mark_stopped().await;
            debug!(session_id = %session.session_id, "Session closed");
        }
    }

    /// Drop sessions whose container no longer runs; returns how many were dropped
    pub async fn reap_stopped(&self) -> usize {
        let bound: Vec<String> = self
            .sessions
            .read()
            .await
            .values()
            .filter_map(|s| s.container_id().map(str::to_string))
            .collect();

        let mut reaped = 0;
        for container_id in bound {
            match self.engine.is_running(&container_id).await {
                Ok(true) => {}
                Ok(false) => {
                    info!(container_id = %container_id, "Session container is gone");
                    self.forget_container(&container_id).await;
                    reaped += 1;
                }
                Err(e) => debug!(container_id = %container_id, error = %e, "Liveness check failed"),
            }
        }
        reaped
    }

    /// Number of sessions with a running container
    pub async fn active_session_count(&self) -> u64 {
        let sessions: Vec<SessionHandle> = self.sessions.read().await.values().cloned().collect();
        let mut count = 0;
        for session in sessions {
            if session.state().await == SessionState::Running {
                count += 1;
            }
        }
        count
    }

    /// Stop every session container
    pub async fn stop_all(&self) {
        let containers: Vec<String> = self
            .sessions
            .read()
            .await
            .values()
            .filter_map(|s| s.container_id().map(str::to_string))
            .collect();

        for container_id in containers {
            match self.shutdown(&container_id).await {
                Ok(()) => {}
                Err(e) if e.is_already_gone() => {}
                Err(e) => error!(container_id = %container_id, error = %e, "Failed to stop session container"),
            }
        }
    }
}
