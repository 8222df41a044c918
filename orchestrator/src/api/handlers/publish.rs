//! Commit and publish handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tracing::debug;

use crate::api::{ApiError, SessionKey};
use crate::models::{CommitRequest, CommitResponse, PublishEvent, PublishNotice};
use crate::AppState;

/// Commit the session's container and start publishing it.
///
/// Push progress is broadcast on the `docker_publish` channel.
pub async fn commit(
    State(state): State<Arc<AppState>>,
    SessionKey(session_id): SessionKey,
    Json(request): Json<CommitRequest>,
) -> Result<(StatusCode, Json<CommitResponse>), ApiError> {
    let container_id = state.sessions.container_for(&session_id).await?;
    let session = state
        .sessions
        .get(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound("No active session".into()))?;

    let result = state
        .publisher
        .commit(&container_id, &session.name, &request.cwd, request.entrypoint)
        .await;
    if result.is_err() {
        crate::metrics::record_publish(false);
    }
    let publication = result?;

    let response = CommitResponse {
        container_id: container_id.clone(),
        image_id: publication.image_id.clone(),
        image: publication.reference.to_string(),
    };

    tokio::spawn(forward_events(
        state.events.clone(),
        container_id,
        publication.events,
    ));

    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn forward_events(
    events: broadcast::Sender<PublishNotice>,
    container_id: String,
    mut stream: BoxStream<'static, PublishEvent>,
) {
    while let Some(event) = stream.next().await {
        if event.is_terminal() {
            crate::metrics::record_publish(matches!(event, PublishEvent::Finished { .. }));
        }

        // No subscribers is not an error
        if events
            .send(PublishNotice::new(container_id.clone(), event))
            .is_err()
        {
            debug!(container_id = %container_id, "No publish subscribers");
        }
    }
}
