//! Docker engine implementation using bollard

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::auth::DockerCredentials;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions, LogOutput,
    StartContainerOptions, StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::{CommitContainerOptions, CreateImageOptions, PushImageOptions};
use bollard::service::{HostConfig, PortBinding};
use bollard::Docker;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::DockerConfig;
use crate::models::{ChangeKind, ContainerSummary, FsChange, PortSummary};

use super::{
    exposed_ports, tcp_port_key, CommitSpec, ContainerEngine, ContainerSpec, EngineError,
    ExecState, ImageReference, PushProgress, PushStream, RegistryCredentials,
};

/// Container engine backed by the Docker API
#[derive(Clone)]
pub struct DockerEngine {
    client: Docker,
}

impl DockerEngine {
    /// Connect to the engine named by the configuration
    pub fn connect(config: &DockerConfig) -> Result<Self, EngineError> {
        let endpoint = config.endpoint.as_str();
        let timeout = config.timeout_seconds;

        let client = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            Docker::connect_with_http(endpoint, timeout, bollard::API_DEFAULT_VERSION)
        } else if endpoint.starts_with("tcp://") {
            let address = endpoint.replacen("tcp://", "http://", 1);
            Docker::connect_with_http(&address, timeout, bollard::API_DEFAULT_VERSION)
        } else {
            let path = endpoint.trim_start_matches("unix://");
            Docker::connect_with_unix(path, timeout, bollard::API_DEFAULT_VERSION)
        }
        .map_err(|e| EngineError::Connection(e.to_string()))?;

        info!(endpoint = %endpoint, "Docker client configured");

        Ok(Self { client })
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(err: bollard::errors::Error) -> Self {
        use bollard::errors::Error;

        match err {
            Error::DockerResponseServerError {
                status_code: 404,
                message,
            } => EngineError::NotFound(message),
            Error::DockerResponseServerError {
                status_code: 409,
                message,
            } => EngineError::Conflict(message),
            Error::DockerResponseServerError {
                status_code: 304,
                message,
            } => EngineError::NotModified(message),
            Error::HyperResponseError { .. }
            | Error::IOError { .. }
            | Error::RequestTimeoutError => EngineError::Connection(err.to_string()),
            other => EngineError::Api(other.to_string()),
        }
    }
}

impl From<RegistryCredentials> for DockerCredentials {
    fn from(credentials: RegistryCredentials) -> Self {
        DockerCredentials {
            username: credentials.username,
            password: credentials.password,
            email: credentials.email,
            serveraddress: credentials.serveraddress,
            identitytoken: credentials.identitytoken,
            ..Default::default()
        }
    }
}

fn change_kind(code: i64) -> ChangeKind {
    match code {
        1 => ChangeKind::Added,
        2 => ChangeKind::Deleted,
        _ => ChangeKind::Modified,
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn version(&self) -> Result<String, EngineError> {
        let version = self.client.version().await?;
        Ok(version.version.unwrap_or_else(|| "unknown".to_string()))
    }

    async fn pull_image(&self, reference: &ImageReference) -> Result<(), EngineError> {
        let options = CreateImageOptions {
            from_image: reference.repository.as_str(),
            tag: reference.tag.as_str(),
            ..Default::default()
        };

        let mut stream = self.client.create_image(Some(options), None, None);

        // The image is only usable once the whole stream has been consumed
        while let Some(result) = stream.next().await {
            let info = result?;
            if let Some(error) = info.error {
                return Err(EngineError::Stream(error));
            }
            if let Some(status) = info.status {
                debug!(image = %reference, status = %status, "Pull progress");
            }
        }

        info!(image = %reference, "Image pulled");
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let port_bindings: HashMap<String, Option<Vec<PortBinding>>> = spec
            .port_bindings
            .iter()
            .map(|(container, host)| {
                let binding = PortBinding {
                    host_ip: None,
                    host_port: Some(host.to_string()),
                };
                (tcp_port_key(*container), Some(vec![binding]))
            })
            .collect();

        let host_config = HostConfig {
            auto_remove: Some(spec.auto_remove),
            port_bindings: Some(port_bindings),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            exposed_ports: Some(exposed_ports(spec)),
            host_config: Some(host_config),
            ..Default::default()
        };

        let response = self.client.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            warn!(container = %spec.name, warning = %warning, "Engine warning on create");
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.client
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), EngineError> {
        self.client
            .stop_container(id, None::<StopContainerOptions>)
            .await?;
        Ok(())
    }

    async fn is_running(&self, id: &str) -> Result<bool, EngineError> {
        match self
            .client
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(info) => Ok(info.state.and_then(|s| s.running).unwrap_or(false)),
            Err(e) => match EngineError::from(e) {
                EngineError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, EngineError> {
        let options = ListContainersOptions::<String> {
            all: false,
            ..Default::default()
        };

        let containers = self.client.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerSummary {
                id: c.id.unwrap_or_default(),
                names: c
                    .names
                    .unwrap_or_default()
                    .into_iter()
                    .map(|n| n.trim_start_matches('/').to_string())
                    .collect(),
                image: c.image.unwrap_or_default(),
                state: c.state,
                status: c.status,
                created: c.created.unwrap_or(0),
                ports: c
                    .ports
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| PortSummary {
                        private_port: p.private_port,
                        public_port: p.public_port,
                        ip: p.ip,
                    })
                    .collect(),
            })
            .collect())
    }

    async fn container_changes(&self, id: &str) -> Result<Vec<FsChange>, EngineError> {
        let changes = self.client.container_changes(id).await?;

        Ok(changes
            .unwrap_or_default()
            .into_iter()
            .map(|change| FsChange {
                path: change.path,
                kind: change_kind(change.kind as i64),
            })
            .collect())
    }

    async fn create_exec(&self, container_id: &str, argv: &[String]) -> Result<String, EngineError> {
        let options = CreateExecOptions {
            cmd: Some(argv.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.client.create_exec(container_id, options).await?;
        Ok(exec.id)
    }

    async fn start_exec(&self, exec_id: &str) -> Result<(), EngineError> {
        let options = StartExecOptions {
            detach: false,
            ..Default::default()
        };

        match self.client.start_exec(exec_id, Some(options)).await? {
            StartExecResults::Attached { mut output, .. } => {
                let exec_id = exec_id.to_string();
                tokio::spawn(async move {
                    while let Some(chunk) = output.next().await {
                        match chunk {
                            Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                                debug!(exec_id = %exec_id, stdout = %String::from_utf8_lossy(&message), "Exec output");
                            }
                            Ok(LogOutput::StdErr { message }) => {
                                debug!(exec_id = %exec_id, stderr = %String::from_utf8_lossy(&message), "Exec output");
                            }
                            Ok(LogOutput::StdIn { .. }) => {}
                            Err(e) => {
                                warn!(exec_id = %exec_id, error = %e, "Exec output stream failed");
                                break;
                            }
                        }
                    }
                });
            }
            StartExecResults::Detached => {
                debug!(exec_id = %exec_id, "Exec started detached");
            }
        }

        Ok(())
    }

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecState, EngineError> {
        let inspect = self.client.inspect_exec(exec_id).await?;
        Ok(ExecState {
            running: inspect.running.unwrap_or(false),
            exit_code: inspect.exit_code,
        })
    }

    async fn commit_container(&self, container_id: &str, spec: &CommitSpec) -> Result<String, EngineError> {
        let options = CommitContainerOptions {
            container: container_id.to_string(),
            repo: spec.reference.repository.clone(),
            tag: spec.reference.tag.clone(),
            pause: true,
            ..Default::default()
        };

        let config = Config::<String> {
            working_dir: Some(spec.working_dir.clone()),
            entrypoint: Some(spec.entrypoint.clone()),
            cmd: Some(spec.cmd.clone()),
            ..Default::default()
        };

        self.client.commit_container(options, config).await?;

        let image = self.client.inspect_image(&spec.reference.to_string()).await?;
        Ok(image.id.unwrap_or_else(|| spec.reference.to_string()))
    }

    async fn push_image(
        &self,
        reference: &ImageReference,
        credentials: Option<RegistryCredentials>,
    ) -> Result<PushStream, EngineError> {
        let options = PushImageOptions {
            tag: reference.tag.clone(),
        };

        let stream = self
            .client
            .push_image(
                &reference.repository,
                Some(options),
                credentials.map(DockerCredentials::from),
            )
            .map(|item| {
                item.map(|info| PushProgress {
                    id: None,
                    status: info.status,
                    progress: info.progress,
                    error: info.error,
                })
                .map_err(EngineError::from)
            });

        Ok(stream.boxed())
    }
}
