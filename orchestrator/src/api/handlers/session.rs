//! Session management handlers

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header::SET_COOKIE, HeaderName, StatusCode},
    Json,
};
use tracing::info;

use crate::api::extract::{clear_session_cookie, session_cookie};
use crate::api::{ApiError, SessionKey};
use crate::container::ShutdownError;
use crate::models::{LaunchRequest, LaunchResponse, SessionInfo, ShutdownResponse};
use crate::AppState;

type WithCookie<T> = (StatusCode, [(HeaderName, String); 1], Json<T>);

/// Launch a session container
pub async fn launch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<LaunchRequest>,
) -> Result<WithCookie<LaunchResponse>, ApiError> {
    let result = state.sessions.launch_session(request.name.trim()).await;
    crate::metrics::record_launch(result.is_ok());
    let session = result?;

    let container_id = session
        .container_id()
        .map(str::to_string)
        .ok_or_else(|| ApiError::Internal("Launched session has no container".into()))?;

    info!(
        session_id = %session.session_id,
        container_id = %container_id,
        "Session launched via API"
    );

    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, session_cookie(session.session_id))],
        Json(LaunchResponse {
            session_id: session.session_id,
            container_id,
            name: session.name.clone(),
        }),
    ))
}

/// Get current session info
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    SessionKey(session_id): SessionKey,
) -> Result<Json<SessionInfo>, ApiError> {
    let info = state
        .sessions
        .session_info(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound("No active session".into()))?;

    Ok(Json(info))
}

/// Shut down the session's container
pub async fn shutdown_session(
    State(state): State<Arc<AppState>>,
    SessionKey(session_id): SessionKey,
) -> Result<WithCookie<ShutdownResponse>, ApiError> {
    let response = match state.sessions.shutdown_session(&session_id).await {
        Ok(container_id) => ShutdownResponse {
            container_id,
            already_gone: false,
        },
        Err(ShutdownError::AlreadyGone(container_id)) => ShutdownResponse {
            container_id,
            already_gone: true,
        },
        Err(e) => return Err(e.into()),
    };

    Ok(shutdown_reply(response))
}

/// Shut down an explicit container
pub async fn shutdown_container(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<String>,
) -> Result<WithCookie<ShutdownResponse>, ApiError> {
    let already_gone = match state.sessions.shutdown(&container_id).await {
        Ok(()) => false,
        Err(e) if e.is_already_gone() => true,
        Err(e) => return Err(e.into()),
    };

    Ok(shutdown_reply(ShutdownResponse {
        container_id,
        already_gone,
    }))
}

fn shutdown_reply(response: ShutdownResponse) -> WithCookie<ShutdownResponse> {
    crate::metrics::record_shutdown(response.already_gone);
    (
        StatusCode::OK,
        [(SET_COOKIE, clear_session_cookie())],
        Json(response),
    )
}
