//! SSH transport for the terminal bridge

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::SshConfig;

use super::{BridgeError, RemoteShell, ShellConnector, ShellEvent};

/// Session containers generate fresh host keys on every launch, so any key is accepted
struct ContainerHost;

#[async_trait]
impl client::Handler for ContainerHost {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &key::PublicKey,
    ) -> Result<bool, Self::Error> {
        debug!(fingerprint = %server_public_key.fingerprint(), "Accepting container host key");
        Ok(true)
    }
}

/// Connects to the session container's SSH daemon
pub struct SshConnector {
    config: SshConfig,
}

impl SshConnector {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    async fn authenticate(&self, handle: &mut Handle<ContainerHost>) -> Result<(), BridgeError> {
        let username = self.config.username.as_str();

        let accepted = match &self.config.private_key_path {
            Some(path) => {
                let key_pair = russh_keys::load_secret_key(path, None)
                    .map_err(|e| BridgeError::Auth(format!("{}: {}", path.display(), e)))?;
                handle
                    .authenticate_publickey(username, Arc::new(key_pair))
                    .await
            }
            None => {
                handle
                    .authenticate_password(username, self.config.password.as_str())
                    .await
            }
        }
        .map_err(|e| BridgeError::Auth(e.to_string()))?;

        if !accepted {
            return Err(BridgeError::Auth(format!("rejected for user {}", username)));
        }

        Ok(())
    }
}

#[async_trait]
impl ShellConnector for SshConnector {
    async fn connect(&self) -> Result<Box<dyn RemoteShell>, BridgeError> {
        let address = (self.config.host.clone(), self.config.port);
        let client_config = Arc::new(client::Config::default());

        let connect = async {
            let mut handle = client::connect(client_config, address, ContainerHost)
                .await
                .map_err(|e| BridgeError::Connect(e.to_string()))?;
            self.authenticate(&mut handle).await?;
            Ok::<_, BridgeError>(handle)
        };

        let handle = timeout(self.config.connect_timeout(), connect)
            .await
            .map_err(|_| {
                BridgeError::Connect(format!(
                    "timed out after {}s connecting to {}:{}",
                    self.config.connect_timeout_seconds, self.config.host, self.config.port
                ))
            })??;

        info!(host = %self.config.host, port = self.config.port, "SSH connection established");

        Ok(Box::new(SshShell {
            handle,
            channel: None,
            pending: VecDeque::new(),
            saw_close: false,
            term: self.config.term.clone(),
            cols: self.config.cols,
            rows: self.config.rows,
        }))
    }
}

struct SshShell {
    handle: Handle<ContainerHost>,
    channel: Option<Channel<client::Msg>>,
    /// Output that arrived while waiting for the shell reply
    pending: VecDeque<ShellEvent>,
    saw_close: bool,
    term: String,
    cols: u32,
    rows: u32,
}

const CONNECTION_LOST: &str = "connection lost";

/// Map the next channel message. The channel yields `None` once the session is
/// gone; without a prior EOF or close that means the transport dropped.
fn translate(message: Option<ChannelMsg>, saw_close: bool) -> Option<ShellEvent> {
    match message {
        Some(ChannelMsg::Data { data }) => Some(ShellEvent::Output(data.to_vec())),
        Some(ChannelMsg::ExtendedData { data, .. }) => Some(ShellEvent::Output(data.to_vec())),
        Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) => Some(ShellEvent::Closed),
        Some(ChannelMsg::ExitStatus { exit_status }) => {
            debug!(exit_status = exit_status, "Remote shell exited");
            None
        }
        Some(_) => None,
        None if saw_close => Some(ShellEvent::Closed),
        None => Some(ShellEvent::Failed(CONNECTION_LOST.to_string())),
    }
}

#[async_trait]
impl RemoteShell for SshShell {
    async fn open_shell(&mut self) -> Result<(), BridgeError> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| BridgeError::Shell(e.to_string()))?;

        channel
            .request_pty(false, &self.term, self.cols, self.rows, 0, 0, &[])
            .await
            .map_err(|e| BridgeError::Shell(e.to_string()))?;

        channel
            .request_shell(true)
            .await
            .map_err(|e| BridgeError::Shell(e.to_string()))?;

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Success) => break,
                Some(ChannelMsg::Failure) => {
                    return Err(BridgeError::Shell("shell request rejected".to_string()))
                }
                Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => {
                    return Err(BridgeError::Shell(
                        "channel closed before the shell started".to_string(),
                    ))
                }
                Some(other) => {
                    if let Some(event) = translate(Some(other), false) {
                        self.pending.push_back(event);
                    }
                }
            }
        }

        self.channel = Some(channel);
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), BridgeError> {
        let channel = self
            .channel
            .as_mut()
            .ok_or_else(|| BridgeError::Io("shell is not open".to_string()))?;

        channel
            .data(bytes)
            .await
            .map_err(|e| BridgeError::Io(e.to_string()))
    }

    async fn next_event(&mut self) -> ShellEvent {
        if let Some(event) = self.pending.pop_front() {
            return event;
        }

        let channel = match self.channel.as_mut() {
            Some(channel) => channel,
            None => return ShellEvent::Failed("shell is not open".to_string()),
        };

        loop {
            if let Some(event) = translate(channel.wait().await, self.saw_close) {
                if event == ShellEvent::Closed {
                    self.saw_close = true;
                }
                return event;
            }
        }
    }

    async fn close(&mut self) {
        if let Some(channel) = self.channel.take() {
            let _ = channel.close().await;
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
        {
            debug!(error = %e, "SSH disconnect failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use russh::CryptoVec;

    #[test]
    fn test_translate_channel_messages() {
        assert_eq!(
            translate(
                Some(ChannelMsg::Data {
                    data: CryptoVec::from_slice(b"\x1b[0m\xff")
                }),
                false
            ),
            Some(ShellEvent::Output(b"\x1b[0m\xff".to_vec()))
        );
        assert_eq!(
            translate(
                Some(ChannelMsg::ExtendedData {
                    data: CryptoVec::from_slice(b"err"),
                    ext: 1
                }),
                false
            ),
            Some(ShellEvent::Output(b"err".to_vec()))
        );
        assert_eq!(translate(Some(ChannelMsg::Eof), false), Some(ShellEvent::Closed));
        assert_eq!(
            translate(Some(ChannelMsg::ExitStatus { exit_status: 0 }), false),
            None
        );
    }

    #[test]
    fn test_dropped_session_is_failure() {
        assert_eq!(
            translate(None, false),
            Some(ShellEvent::Failed("connection lost".to_string()))
        );
        assert_eq!(translate(None, true), Some(ShellEvent::Closed));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connect_error() {
        let config = SshConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout_seconds: 2,
            ..SshConfig::default()
        };
        let connector = SshConnector::new(config);

        match connector.connect().await {
            Err(BridgeError::Connect(_)) => {}
            Err(other) => panic!("expected connect error, got {}", other),
            Ok(_) => panic!("connected to a closed port"),
        }
    }
}
