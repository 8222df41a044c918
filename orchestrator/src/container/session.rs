//! Session records binding a display name to at most one container

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{SessionInfo, SessionStatus};

/// Session state; transitions only move forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Running,
    Stopped,
}

impl From<SessionState> for SessionStatus {
    fn from(state: SessionState) -> Self {
        match state {
            SessionState::Pending => SessionStatus::Pending,
            SessionState::Running => SessionStatus::Running,
            SessionState::Stopped => SessionStatus::Stopped,
        }
    }
}

/// A user session with an associated container
#[derive(Debug)]
pub struct Session {
    /// Unique session ID
    pub session_id: Uuid,

    /// Display name, also the container name
    pub name: String,

    /// Container ID; set once on launch and never replaced
    container_id: OnceCell<String>,

    state: RwLock<SessionState>,

    pub created_at: DateTime<Utc>,

    last_activity: RwLock<DateTime<Utc>>,

    exec_count: AtomicU64,
}

impl Session {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4(),
            name: name.into(),
            container_id: OnceCell::new(),
            state: RwLock::new(SessionState::Pending),
            created_at: now,
            last_activity: RwLock::new(now),
            exec_count: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    pub fn container_id(&self) -> Option<&str> {
        self.container_id.get().map(String::as_str)
    }

    /// Bind the container and mark the session running.
    ///
    /// Returns false when a container was already bound or the session has
    /// left the pending state.
    pub async fn bind_container(&self, container_id: String) -> bool {
        let mut state = self.state.write().await;
        if *state != SessionState::Pending || self.container_id.set(container_id).is_err() {
            return false;
        }
        *state = SessionState::Running;
        true
    }

    pub async fn mark_stopped(&self) {
        *self.state.write().await = SessionState::Stopped;
    }

    pub async fn touch(&self) {
        *self.last_activity.write().await = Utc::now();
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read().await
    }

    pub fn increment_execs(&self) {
        self.exec_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exec_count(&self) -> u64 {
        self.exec_count.load(Ordering::Relaxed)
    }

    pub async fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.session_id,
            name: self.name.clone(),
            container_id: self.container_id().map(str::to_string),
            status: self.state().await.into(),
            created_at: self.created_at,
            last_activity: self.last_activity().await,
            exec_count: self.exec_count(),
        }
    }
}

/// Thread-safe session handle
pub type SessionHandle = Arc<Session>;
