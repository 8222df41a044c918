//! Configuration module for the Dockside orchestrator
//!
//! Supports configuration via:
//! - YAML/TOML config files
//! - Environment variables (with DOCKSIDE_ prefix)
//!
//! The resulting [`AppConfig`] is built once in `main` and handed to each
//! component constructor; nothing reads configuration from global state.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for the JSON log file (no file logging when unset)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Stop every session container when the orchestrator exits
    #[serde(default = "default_true")]
    pub stop_sessions_on_exit: bool,

    /// Container engine settings
    #[serde(default)]
    pub docker: DockerConfig,

    /// Image registry settings used when publishing
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Remote shell settings for the terminal bridge
    #[serde(default)]
    pub ssh: SshConfig,

    /// Command execution polling bounds
    #[serde(default)]
    pub exec: ExecConfig,
}

/// Container engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Engine endpoint: a unix socket path, `unix://...` or `http(s)://host:port`
    #[serde(default = "default_docker_endpoint")]
    pub endpoint: String,

    /// Request timeout towards the engine, in seconds
    #[serde(default = "default_docker_timeout")]
    pub timeout_seconds: u64,

    /// Base image for session containers
    #[serde(default = "default_image")]
    pub image: String,

    /// Pull the base image before every launch
    #[serde(default)]
    pub force_pull: bool,

    /// Port mapping for the shell and display services
    #[serde(default)]
    pub ports: PortMapping,

    /// Only filesystem changes below this path are reported
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,

    /// Interval of the sweep dropping sessions whose container was removed, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

/// Container/host port pairs exposed by every session container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortMapping {
    #[serde(default = "default_shell_container_port")]
    pub shell_container: u16,

    #[serde(default = "default_shell_host_port")]
    pub shell_host: u16,

    #[serde(default = "default_display_port")]
    pub display_container: u16,

    #[serde(default = "default_display_port")]
    pub display_host: u16,
}

/// Registry configuration for commit/publish
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Image namespace (organisation)
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Image repository under the namespace
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Base64 encoded JSON auth config (`X-Registry-Auth` format)
    #[serde(default)]
    pub auth_key: Option<String>,
}

/// SSH configuration for the terminal bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_host")]
    pub host: String,

    #[serde(default = "default_shell_host_port")]
    pub port: u16,

    #[serde(default = "default_ssh_user")]
    pub username: String,

    #[serde(default = "default_ssh_user")]
    pub password: String,

    /// Authenticate with this private key instead of the password
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// Terminal type requested for the PTY
    #[serde(default = "default_term")]
    pub term: String,

    #[serde(default = "default_cols")]
    pub cols: u32,

    #[serde(default = "default_rows")]
    pub rows: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Client frames buffered while the shell is not ready yet
    #[serde(default = "default_input_buffer")]
    pub input_buffer: usize,
}

/// Bounds for exec status polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Interval between exec inspections, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Overall wait limit, in seconds
    #[serde(default = "default_exec_timeout")]
    pub timeout_seconds: u64,

    /// Maximum number of inspections (derived from the timeout when unset)
    #[serde(default)]
    pub max_polls: Option<u32>,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_docker_endpoint() -> String {
    "unix:///var/run/docker.sock".to_string()
}

fn default_docker_timeout() -> u64 {
    120
}

fn default_image() -> String {
    "jataware/clouseau:latest".to_string()
}

fn default_workspace_root() -> String {
    "/home/clouseau".to_string()
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_shell_container_port() -> u16 {
    22
}

fn default_shell_host_port() -> u16 {
    2224
}

fn default_display_port() -> u16 {
    6010
}

fn default_namespace() -> String {
    "jataware".to_string()
}

fn default_repository() -> String {
    "clouseau".to_string()
}

fn default_ssh_host() -> String {
    "127.0.0.1".to_string()
}

fn default_ssh_user() -> String {
    "clouseau".to_string()
}

fn default_term() -> String {
    "xterm-256color".to_string()
}

fn default_cols() -> u32 {
    80
}

fn default_rows() -> u32 {
    24
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_input_buffer() -> usize {
    256
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_exec_timeout() -> u64 {
    3600
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            endpoint: default_docker_endpoint(),
            timeout_seconds: default_docker_timeout(),
            image: default_image(),
            force_pull: false,
            ports: PortMapping::default(),
            workspace_root: default_workspace_root(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl Default for PortMapping {
    fn default() -> Self {
        Self {
            shell_container: default_shell_container_port(),
            shell_host: default_shell_host_port(),
            display_container: default_display_port(),
            display_host: default_display_port(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            repository: default_repository(),
            auth_key: None,
        }
    }
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: default_ssh_host(),
            port: default_shell_host_port(),
            username: default_ssh_user(),
            password: default_ssh_user(),
            private_key_path: None,
            term: default_term(),
            cols: default_cols(),
            rows: default_rows(),
            connect_timeout_seconds: default_connect_timeout(),
            input_buffer: default_input_buffer(),
        }
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            timeout_seconds: default_exec_timeout(),
            max_polls: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            log_dir: None,
            stop_sessions_on_exit: true,
            docker: DockerConfig::default(),
            registry: RegistryConfig::default(),
            ssh: SshConfig::default(),
            exec: ExecConfig::default(),
        }
    }
}

impl ExecConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Effective poll budget: the configured cap, or as many polls as fit in the timeout
    pub fn poll_budget(&self) -> u32 {
        self.max_polls.unwrap_or_else(|| {
            let polls = self.timeout().as_millis() / u128::from(self.poll_interval_ms.max(1));
            u32::try_from(polls).unwrap_or(u32::MAX).max(1)
        })
    }
}

impl DockerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl SshConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }
}

impl AppConfig {
    /// Load configuration from file and environment variables
    pub fn load() -> Result<Self> {
        // Try to load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config/dockside").required(false))
            .add_source(config::File::with_name("/etc/dockside/config").required(false))
            // Override with environment variables, e.g. DOCKSIDE__DOCKER__FORCE_PULL=true
            .add_source(
                config::Environment::with_prefix("DOCKSIDE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("Port cannot be 0");
        }

        if self.docker.image.trim().is_empty() {
            anyhow::bail!("A base image must be configured");
        }

        if self.docker.image.contains('@') {
            anyhow::bail!(
                "Base image must be referenced by tag, not digest: {}",
                self.docker.image
            );
        }

        if self.exec.poll_interval_ms == 0 {
            anyhow::bail!("Exec poll interval cannot be 0");
        }

        if self.exec.timeout().as_millis() < u128::from(self.exec.poll_interval_ms) {
            anyhow::bail!("Exec timeout must be at least one poll interval");
        }

        if self.exec.max_polls == Some(0) {
            anyhow::bail!("Exec poll budget cannot be 0");
        }

        if self.ssh.input_buffer == 0 {
            anyhow::bail!("Terminal input buffer cannot be 0");
        }

        Ok(())
    }

    /// WebSocket address of the display service advertised to clients
    pub fn display_socket_address(&self) -> String {
        format!("ws://{}:{}", self.ssh.host, self.docker.ports.display_host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.port, 3000);
        assert!(!config.docker.force_pull);
        assert_eq!(config.docker.ports.shell_container, 22);
        assert_eq!(config.docker.ports.shell_host, 2224);
        assert_eq!(config.docker.ports.display_host, 6010);
        assert_eq!(config.ssh.port, 2224);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let config = AppConfig {
            port: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.exec.poll_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.exec.timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_digest_image_rejected() {
        let mut config = AppConfig::default();
        config.docker.image = "jataware/clouseau@sha256:4f53cda18c2b".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("digest"));

        config.docker.image = "registry.local:5000/jataware/clouseau:base".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_poll_budget() {
        let exec = ExecConfig {
            poll_interval_ms: 500,
            timeout_seconds: 10,
            max_polls: None,
        };
        assert_eq!(exec.poll_budget(), 20);

        let capped = ExecConfig {
            max_polls: Some(3),
            ..exec
        };
        assert_eq!(capped.poll_budget(), 3);
    }

    #[test]
    fn test_display_socket_address() {
        let mut config = AppConfig::default();
        config.ssh.host = "shell.internal".to_string();
        assert_eq!(config.display_socket_address(), "ws://shell.internal:6010");
    }
}
