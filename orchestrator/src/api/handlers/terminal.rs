//! Interactive terminal over WebSocket

use std::sync::Arc;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::api::{ApiError, SessionKey};
use crate::tty::TerminalFrame;
use crate::AppState;

/// What a client WebSocket message means to the bridge
#[derive(Debug, PartialEq, Eq)]
enum ClientInput {
    /// Bytes for the shell's stdin
    Bytes(Vec<u8>),
    /// Answer with a pong carrying this payload
    Ping(Vec<u8>),
    Ignore,
    Close,
}

/// Notices travel as text, shell output as binary
fn frame_message(frame: TerminalFrame) -> Message {
    match frame {
        TerminalFrame::Notice(text) => Message::Text(text),
        TerminalFrame::Output(bytes) => Message::Binary(bytes),
    }
}

fn client_input(message: Message) -> ClientInput {
    match message {
        Message::Text(text) => ClientInput::Bytes(text.into_bytes()),
        Message::Binary(data) => ClientInput::Bytes(data),
        Message::Ping(data) => ClientInput::Ping(data),
        Message::Pong(_) => ClientInput::Ignore,
        Message::Close(_) => ClientInput::Close,
    }
}

/// Upgrade to a terminal bridge; the session's container must be running
pub async fn terminal_handler(
    SessionKey(session_id): SessionKey,
    State(state): State<Arc<AppState>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let container_id = state.sessions.ensure_running(&session_id).await?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    Ok(ws.on_upgrade(move |socket| handle_terminal_socket(socket, state, session_id, container_id)))
}

async fn handle_terminal_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    session_id: Uuid,
    container_id: String,
) {
    let (mut sender, mut receiver) = socket.split();

    info!(session_id = %session_id, container_id = %container_id, "Terminal WebSocket connected");

    let (input_tx, input_rx) = state.terminal.input_channel();
    let (frame_tx, mut frame_rx) = mpsc::channel::<TerminalFrame>(64);
    let (pong_tx, mut pong_rx) = mpsc::channel::<Vec<u8>>(4);

    let writer = tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                frame = frame_rx.recv() => match frame {
                    Some(frame) => frame_message(frame),
                    None => break,
                },
                Some(payload) = pong_rx.recv() => Message::Pong(payload),
            };

            if sender.send(message).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    let reader = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(error = %e, "Terminal WebSocket read failed");
                    break;
                }
            };

            match client_input(msg) {
                ClientInput::Bytes(bytes) => {
                    if input_tx.send(bytes).await.is_err() {
                        break;
                    }
                }
                ClientInput::Ping(data) => {
                    let _ = pong_tx.send(data).await;
                }
                ClientInput::Ignore => {}
                ClientInput::Close => break,
            }
        }
    });

    let outcome = state.terminal.run(input_rx, frame_tx).await;

    reader.abort();
    let _ = writer.await;

    info!(session_id = %session_id, outcome = ?outcome, "Terminal WebSocket closed");
}
