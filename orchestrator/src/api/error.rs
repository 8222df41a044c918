//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::container::{
    CommitError, ExecError, LaunchError, PublishError, PushError, SessionError, ShutdownError,
};
use crate::engine::EngineError;
use crate::models::ErrorResponse;

/// API error types
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Session required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Gone: {0}")]
    Gone(String),

    #[error("Execution timeout")]
    Timeout,

    #[error("Upstream error: {0}")]
    BadGateway(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "NO_SESSION", self.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            ApiError::Gone(msg) => (StatusCode::GONE, "GONE", msg.clone()),
            ApiError::Timeout => (
                StatusCode::REQUEST_TIMEOUT,
                "EXECUTION_TIMEOUT",
                self.to_string(),
            ),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR", msg.clone()),
            ApiError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "ENGINE_UNAVAILABLE",
                msg.clone(),
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = Json(ErrorResponse::new(error_code, message));
        (status, body).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "Internal error");
        ApiError::Internal(err.to_string())
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound(_) => ApiError::NotFound(err.to_string()),
            EngineError::Conflict(_) => ApiError::Conflict(err.to_string()),
            EngineError::Connection(_) => ApiError::Unavailable(err.to_string()),
            _ => {
                tracing::error!(error = %err, "Engine error");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Unknown(_) => ApiError::NotFound(err.to_string()),
            SessionError::Pending(_) => ApiError::Conflict(err.to_string()),
            SessionError::Stopped(_) => ApiError::Gone(err.to_string()),
            SessionError::Engine(e) => e.into(),
        }
    }
}

impl From<LaunchError> for ApiError {
    fn from(err: LaunchError) -> Self {
        match &err {
            LaunchError::InvalidName(_) => ApiError::BadRequest(err.to_string()),
            LaunchError::AlreadyLaunched(_) => ApiError::Conflict(err.to_string()),
            LaunchError::Create {
                source: EngineError::Conflict(_),
                ..
            } => ApiError::Conflict(err.to_string()),
            LaunchError::Pull { .. } | LaunchError::Create { .. } | LaunchError::Start { .. } => {
                tracing::error!(error = %err, "Launch failed");
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<ShutdownError> for ApiError {
    fn from(err: ShutdownError) -> Self {
        match &err {
            ShutdownError::UnknownSession(_) => ApiError::NotFound(err.to_string()),
            ShutdownError::NotLaunched(_) => ApiError::Conflict(err.to_string()),
            ShutdownError::AlreadyGone(_) => ApiError::Gone(err.to_string()),
            ShutdownError::Engine { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ExecError> for ApiError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::EmptyCommand => ApiError::BadRequest(err.to_string()),
            ExecError::Session(e) => e.into(),
            ExecError::ContainerNotFound(_) => ApiError::NotFound(err.to_string()),
            ExecError::NotRunning(_) | ExecError::ContainerGone(_) => {
                ApiError::Conflict(err.to_string())
            }
            ExecError::TimedOut(e) => {
                tracing::warn!(error = %e, "Exec timed out");
                ApiError::Timeout
            }
            ExecError::Create(_) | ExecError::Start(_) | ExecError::Inspect(_) => {
                ApiError::Internal(err.to_string())
            }
        }
    }
}

impl From<PublishError> for ApiError {
    fn from(err: PublishError) -> Self {
        match err {
            PublishError::Commit(CommitError::ContainerNotFound(id)) => {
                ApiError::NotFound(format!("No such container: {}", id))
            }
            PublishError::Commit(CommitError::InvalidName(name)) => {
                ApiError::BadRequest(format!("{:?} does not form a valid image tag", name))
            }
            PublishError::Commit(CommitError::Session(e)) => e.into(),
            PublishError::Push(PushError::Rejected { image, message }) => {
                ApiError::BadGateway(format!("Push of {} rejected: {}", image, message))
            }
            other => {
                tracing::error!(error = %other, "Publish failed");
                ApiError::Internal(other.to_string())
            }
        }
    }
}
