//! Realtime publish events via WebSocket

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

use crate::models::PublishNotice;
use crate::AppState;

/// WebSocket feed of `docker_publish` notices
pub async fn events_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    // Subscribe before the upgrade so nothing published meanwhile is missed
    let notices = state.events.subscribe();
    ws.on_upgrade(move |socket| handle_events_socket(socket, notices))
}

async fn handle_events_socket(socket: WebSocket, mut notices: broadcast::Receiver<PublishNotice>) {
    let (mut sender, mut receiver) = socket.split();

    info!("Event stream WebSocket connected");

    loop {
        tokio::select! {
            notice = notices.recv() => match notice {
                Ok(notice) => {
                    let text = match serde_json::to_string(&notice) {
                        Ok(text) => text,
                        Err(e) => {
                            error!(error = %e, "Failed to serialize publish notice");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped = skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },

            msg = receiver.next() => match msg {
                Some(Ok(Message::Ping(data))) => {
                    if sender.send(Message::Pong(data)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Event stream WebSocket closed");
}
