//! Error types for session, exec and publish operations

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::engine::EngineError;

/// Lookup failures on the session registry
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unknown session: {0}")]
    Unknown(Uuid),

    #[error("Session {0} has no container yet")]
    Pending(Uuid),

    #[error("Session {0} is stopped")]
    Stopped(Uuid),

    #[error("Failed to check session container: {0}")]
    Engine(#[from] EngineError),
}

/// Launching a session container failed; nothing was left running
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("Invalid container name: {0:?}")]
    InvalidName(String),

    #[error("Session {0} is already launched")]
    AlreadyLaunched(Uuid),

    #[error("Failed to pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to create container {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: EngineError,
    },

    #[error("Failed to start container {container_id}: {source}")]
    Start {
        container_id: String,
        #[source]
        source: EngineError,
    },
}

#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("Unknown session: {0}")]
    UnknownSession(Uuid),

    #[error("Session {0} was never launched")]
    NotLaunched(Uuid),

    /// The container was already stopped or removed; callers treat this as success
    #[error("Container {0} is already gone")]
    AlreadyGone(String),

    #[error("Failed to stop container {container_id}: {source}")]
    Engine {
        container_id: String,
        #[source]
        source: EngineError,
    },
}

impl ShutdownError {
    pub fn is_already_gone(&self) -> bool {
        matches!(self, ShutdownError::AlreadyGone(_))
    }
}

/// An exec instance did not reach a terminal state within its bounds
#[derive(Debug, Error)]
#[error("Command {exec_id} still running after {polls} polls ({elapsed:?})")]
pub struct ExecTimeoutError {
    pub exec_id: String,
    pub polls: u32,
    pub elapsed: Duration,
}

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("Command must not be empty")]
    EmptyCommand,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("No such container: {0}")]
    ContainerNotFound(String),

    #[error("Container {0} is not running")]
    NotRunning(String),

    #[error("Container {0} went away while the command was running")]
    ContainerGone(String),

    #[error("Failed to create exec: {0}")]
    Create(#[source] EngineError),

    #[error("Failed to start exec: {0}")]
    Start(#[source] EngineError),

    #[error("Failed to inspect exec: {0}")]
    Inspect(#[source] EngineError),

    #[error(transparent)]
    TimedOut(#[from] ExecTimeoutError),
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("No such container: {0}")]
    ContainerNotFound(String),

    #[error("{0:?} does not form a valid image tag")]
    InvalidName(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Failed to commit container: {0}")]
    Engine(#[source] EngineError),
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Registry credentials could not be decoded: {0}")]
    Credentials(String),

    #[error("Push of {image} rejected: {message}")]
    Rejected { image: String, message: String },

    #[error("Failed to push image: {0}")]
    Engine(#[source] EngineError),
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Commit(#[from] CommitError),

    #[error(transparent)]
    Push(#[from] PushError),
}
