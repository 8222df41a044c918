//! Container engine client
//!
//! [`ContainerEngine`] is the narrow surface the rest of the crate needs from
//! the container runtime. [`DockerEngine`] implements it on top of bollard;
//! tests substitute fakes or mocks.

mod docker;
mod reference;

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use docker::DockerEngine;
pub use reference::ImageReference;

use crate::models::{ContainerSummary, FsChange};

/// Errors reported by the container engine, classified by cause
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("No such object: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not modified: {0}")]
    NotModified(String),

    #[error("Failed to connect to container engine: {0}")]
    Connection(String),

    #[error("Engine stream failed: {0}")]
    Stream(String),

    #[error("Container engine error: {0}")]
    Api(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

/// Everything needed to create a session container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Container port -> host port, both TCP
    pub port_bindings: Vec<(u16, u16)>,
    pub auto_remove: bool,
}

/// Image configuration applied when committing a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSpec {
    pub reference: ImageReference,
    pub working_dir: String,
    pub entrypoint: Vec<String>,
    /// Default command; empty clears the base image's command
    pub cmd: Vec<String>,
}

/// Snapshot of an exec instance as reported by inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecState {
    pub running: bool,
    pub exit_code: Option<i64>,
}

/// One progress record from an image push
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushProgress {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Registry credentials as carried by a Docker auth config
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryCredentials {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub serveraddress: Option<String>,
    #[serde(default)]
    pub identitytoken: Option<String>,
}

/// Live push progress
pub type PushStream = BoxStream<'static, Result<PushProgress, EngineError>>;

/// Operations consumed from the container runtime
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Engine version string
    async fn version(&self) -> Result<String, EngineError>;

    /// Pull an image and wait for the progress stream to complete
    async fn pull_image(&self, reference: &ImageReference) -> Result<(), EngineError>;

    /// Create a container and return its id
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, id: &str) -> Result<(), EngineError>;

    /// Whether the container exists and is running
    async fn is_running(&self, id: &str) -> Result<bool, EngineError>;

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError>;

    async fn container_changes(&self, id: &str) -> Result<Vec<FsChange>, EngineError>;

    /// Create an exec instance and return its id
    async fn create_exec(&self, container_id: &str, argv: &[String]) -> Result<String, EngineError>;

    /// Start an exec instance attached; output is drained in the background
    async fn start_exec(&self, exec_id: &str) -> Result<(), EngineError>;

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecState, EngineError>;

    /// Commit a container into the image named by the spec and return the image id
    async fn commit_container(&self, container_id: &str, spec: &CommitSpec) -> Result<String, EngineError>;

    /// Begin pushing an image; progress arrives on the returned stream
    async fn push_image(
        &self,
        reference: &ImageReference,
        credentials: Option<RegistryCredentials>,
    ) -> Result<PushStream, EngineError>;
}

/// Container port key in the engine's `<port>/<proto>` form
pub(crate) fn tcp_port_key(port: u16) -> String {
    format!("{}/tcp", port)
}

/// Exposed ports map for a container spec
pub(crate) fn exposed_ports(spec: &ContainerSpec) -> HashMap<String, HashMap<(), ()>> {
    spec.port_bindings
        .iter()
        .map(|(container, _)| (tcp_port_key(*container), HashMap::new()))
        .collect()
}
