//! Interactive terminal bridge
//!
//! Relays a remote shell (SSH into the session container) to a client-facing
//! duplex channel. Each bridge walks `Connecting -> Ready -> Streaming -> Closed`
//! and reports every way of ending with exactly one in-band notice, except a
//! client disconnect, which ends silently.

mod ssh;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub use ssh::SshConnector;

pub const ESTABLISHED_NOTICE: &str = "\r\n*** SSH CONNECTION ESTABLISHED ***\r\n";
pub const CLOSED_NOTICE: &str = "\r\n*** SSH CONNECTION CLOSED ***\r\n";

pub fn shell_error_notice(message: &str) -> String {
    format!("\r\n*** SSH SHELL ERROR: {} ***\r\n", message)
}

pub fn connection_error_notice(message: &str) -> String {
    format!("\r\n*** SSH CONNECTION ERROR: {} ***\r\n", message)
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("{0}")]
    Connect(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("{0}")]
    Shell(String),

    #[error("{0}")]
    Io(String),
}

/// What the remote shell produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    Output(Vec<u8>),
    Closed,
    Failed(String),
}

/// Frame sent to the client: notices are text, shell output is binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalFrame {
    Notice(String),
    Output(Vec<u8>),
}

/// Bridge lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Connecting,
    Ready,
    Streaming,
    Closed,
}

/// How a bridge ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    /// The shell closed its stream
    Closed,
    /// PTY or shell request failed
    ShellFailed(String),
    /// Connect, auth or transport failure
    ConnectionFailed(String),
    /// The client went away first
    ClientGone,
}

/// Opens connections to the remote shell host
#[async_trait]
pub trait ShellConnector: Send + Sync {
    /// Connect and authenticate
    async fn connect(&self) -> Result<Box<dyn RemoteShell>, BridgeError>;
}

/// An authenticated connection to the shell host
#[async_trait]
pub trait RemoteShell: Send {
    /// Request a PTY and an interactive shell
    async fn open_shell(&mut self) -> Result<(), BridgeError>;

    /// Write bytes to the shell's stdin
    async fn send(&mut self, bytes: &[u8]) -> Result<(), BridgeError>;

    /// Next event from the shell; must be cancel safe
    async fn next_event(&mut self) -> ShellEvent;

    /// Tear the connection down
    async fn close(&mut self);
}

/// Terminal bridge shared by all realtime connections
pub struct TerminalBridge {
    connector: Arc<dyn ShellConnector>,
    input_buffer: usize,
}

impl TerminalBridge {
    pub fn new(connector: Arc<dyn ShellConnector>, input_buffer: usize) -> Self {
        Self {
            connector,
            input_buffer: input_buffer.max(1),
        }
    }

    /// Bounded queue for client input; frames wait here until the shell is ready
    pub fn input_channel(&self) -> (mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
        mpsc::channel(self.input_buffer)
    }

    /// Run one bridge until either side ends it.
    ///
    /// `inbound` carries client bytes and closes when the client disconnects.
    pub async fn run(
        &self,
        mut inbound: mpsc::Receiver<Vec<u8>>,
        outbound: mpsc::Sender<TerminalFrame>,
    ) -> BridgeOutcome {
        crate::metrics::record_bridge_opened();
        let outcome = self.drive(&mut inbound, &outbound).await;
        crate::metrics::record_bridge_closed(&outcome);
        outcome
    }

    async fn drive(
        &self,
        inbound: &mut mpsc::Receiver<Vec<u8>>,
        outbound: &mpsc::Sender<TerminalFrame>,
    ) -> BridgeOutcome {
        let mut state = BridgeState::Connecting;
        debug!(state = ?state, "Terminal bridge starting");

        let mut shell = match self.connector.connect().await {
            Ok(shell) => shell,
            Err(e) => {
                warn!(error = %e, "SSH connection failed");
                let message = e.to_string();
                notify(outbound, connection_error_notice(&message)).await;
                return BridgeOutcome::ConnectionFailed(message);
            }
        };

        state = BridgeState::Ready;
        debug!(state = ?state, "SSH connection established");
        notify(outbound, ESTABLISHED_NOTICE.to_string()).await;

        if let Err(e) = shell.open_shell().await {
            warn!(error = %e, "SSH shell request failed");
            let message = e.to_string();
            shell.close().await;
            notify(outbound, shell_error_notice(&message)).await;
            return BridgeOutcome::ShellFailed(message);
        }

        state = BridgeState::Streaming;
        info!(state = ?state, "Terminal streaming");

        // Unbiased so steady output cannot starve client input
        let outcome = loop {
            tokio::select! {
                event = shell.next_event() => match event {
                    ShellEvent::Output(bytes) => {
                        if outbound.send(TerminalFrame::Output(bytes)).await.is_err() {
                            shell.close().await;
                            break BridgeOutcome::ClientGone;
                        }
                    }
                    ShellEvent::Closed => {
                        shell.close().await;
                        notify(outbound, CLOSED_NOTICE.to_string()).await;
                        break BridgeOutcome::Closed;
                    }
                    ShellEvent::Failed(message) => {
                        shell.close().await;
                        notify(outbound, connection_error_notice(&message)).await;
                        break BridgeOutcome::ConnectionFailed(message);
                    }
                },

                input = inbound.recv() => match input {
                    Some(bytes) => {
                        if let Err(e) = shell.send(&bytes).await {
                            let message = e.to_string();
                            shell.close().await;
                            notify(outbound, connection_error_notice(&message)).await;
                            break BridgeOutcome::ConnectionFailed(message);
                        }
                    }
                    None => {
                        shell.close().await;
                        break BridgeOutcome::ClientGone;
                    }
                },
            }
        };

        state = BridgeState::Closed;
        info!(state = ?state, outcome = ?outcome, "Terminal bridge ended");
        outcome
    }
}

async fn notify(outbound: &mpsc::Sender<TerminalFrame>, notice: String) {
    // Client may already be gone
    let _ = outbound.send(TerminalFrame::Notice(notice)).await;
}
