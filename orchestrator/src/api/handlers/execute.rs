//! Command execution handlers

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::api::{ApiError, SessionKey};
use crate::models::{ExecRequest, ExecResponse};
use crate::AppState;

/// Run a command in the session's container
pub async fn exec_session(
    State(state): State<Arc<AppState>>,
    SessionKey(session_id): SessionKey,
    Json(request): Json<ExecRequest>,
) -> Result<(StatusCode, Json<ExecResponse>), ApiError> {
    let container_id = state.sessions.ensure_running(&session_id).await?;
    run(&state, container_id, &request.cmd, Some(session_id)).await
}

/// Run a command in an explicit container
pub async fn exec_container(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<String>,
    Json(request): Json<ExecRequest>,
) -> Result<(StatusCode, Json<ExecResponse>), ApiError> {
    run(&state, container_id, &request.cmd, None).await
}

/// A non-zero exit code is reported with status 500 and the code in the body
async fn run(
    state: &AppState,
    container_id: String,
    cmd: &[String],
    session_id: Option<Uuid>,
) -> Result<(StatusCode, Json<ExecResponse>), ApiError> {
    let start_time = Instant::now();
    let result = state.executor.exec(&container_id, cmd).await;
    let duration = start_time.elapsed();

    crate::metrics::record_exec(result.as_ref().ok().copied(), duration.as_secs_f64());
    let exit_code = result?;

    if let Some(session_id) = session_id {
        if let Some(session) = state.sessions.get(&session_id).await {
            session.increment_execs();
            session.touch().await;
        }
    }

    let status = if exit_code == 0 {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };

    Ok((
        status,
        Json(ExecResponse {
            container_id,
            exit_code,
            duration_ms: duration.as_millis() as u64,
        }),
    ))
}
