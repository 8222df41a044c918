//! Data models for the Dockside orchestrator
//!
//! This module defines all request/response types and the engine-facing
//! summaries shared between components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Container Models
// ============================================================================

/// Container as listed by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub ports: Vec<PortSummary>,
}

/// Published port of a listed container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortSummary {
    pub private_port: u16,
    #[serde(default)]
    pub public_port: Option<u16>,
    #[serde(default)]
    pub ip: Option<String>,
}

/// Kind of a filesystem change inside a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Modified,
    Added,
    Deleted,
}

/// One filesystem change relative to the container's image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsChange {
    pub path: String,
    pub kind: ChangeKind,
}

// ============================================================================
// Session Models
// ============================================================================

/// Request to launch a session container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Display name, also used as the container name
    pub name: String,
}

/// Response after a successful launch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchResponse {
    pub session_id: Uuid,
    pub container_id: String,
    pub name: String,
}

/// Session information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub container_id: Option<String>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub exec_count: u64,
}

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Stopped,
}

/// Response after a shutdown request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownResponse {
    pub container_id: String,
    /// The container was already gone before this request
    pub already_gone: bool,
}

/// Address of the display service socket
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocketConfigResponse {
    pub address: String,
}

// ============================================================================
// Execution Models
// ============================================================================

/// Request to run a command inside a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecRequest {
    /// Argument vector, executed without a shell
    pub cmd: Vec<String>,
}

/// Result of a finished command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResponse {
    pub container_id: String,
    pub exit_code: i64,
    pub duration_ms: u64,
}

// ============================================================================
// Publish Models
// ============================================================================

/// Request to commit and publish the session's container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    /// Working directory of the published image
    pub cwd: String,
    /// Entrypoint of the published image
    pub entrypoint: Vec<String>,
}

/// Response once a commit succeeded and the push started
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitResponse {
    pub container_id: String,
    pub image_id: String,
    pub image: String,
}

/// Events on a publish stream; the last one is always `finished` or `failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PublishEvent {
    Progress {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        progress: Option<String>,
    },
    Finished {
        image: String,
    },
    Failed {
        image: String,
        message: String,
    },
}

impl PublishEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PublishEvent::Progress { .. })
    }
}

/// Publish event as broadcast to realtime subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishNotice {
    pub channel: String,
    pub container_id: String,
    pub event: PublishEvent,
}

impl PublishNotice {
    pub const CHANNEL: &'static str = "docker_publish";

    pub fn new(container_id: impl Into<String>, event: PublishEvent) -> Self {
        Self {
            channel: Self::CHANNEL.to_string(),
            container_id: container_id.into(),
            event,
        }
    }
}

// ============================================================================
// System Models
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: u64,
    #[serde(default)]
    pub engine_version: Option<String>,
}

/// Health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

// ============================================================================
// Error Models
// ============================================================================

/// Standard error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }
}
