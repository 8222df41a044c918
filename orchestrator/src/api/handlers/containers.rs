//! Container listing and filesystem change handlers

use std::sync::Arc;

use axum::{extract::State, Json};

use crate::api::{ApiError, SessionKey};
use crate::models::{ContainerSummary, FsChange};
use crate::AppState;

/// Containers currently known to the engine
pub async fn list_containers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ContainerSummary>>, ApiError> {
    Ok(Json(state.sessions.list().await?))
}

/// Workspace changes in the session's container
pub async fn list_changes(
    State(state): State<Arc<AppState>>,
    SessionKey(session_id): SessionKey,
) -> Result<Json<Vec<FsChange>>, ApiError> {
    let container_id = state.sessions.container_for(&session_id).await?;
    Ok(Json(state.sessions.changes(&container_id).await?))
}
