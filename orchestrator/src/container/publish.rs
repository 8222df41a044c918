//! Commit a container into an image and push it to the registry

use std::collections::HashSet;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::RegistryConfig;
use crate::engine::{
    CommitSpec, ContainerEngine, EngineError, ImageReference, PushProgress, PushStream,
    RegistryCredentials,
};
use crate::models::PublishEvent;

use super::error::{CommitError, PublishError, PushError};

/// A committed image whose push is in progress
pub struct Publication {
    pub container_id: String,
    pub image_id: String,
    pub reference: ImageReference,
    /// Progress events, ending with exactly one `finished` or `failed`
    pub events: BoxStream<'static, PublishEvent>,
}

pub struct CommitPipeline {
    engine: Arc<dyn ContainerEngine>,
    registry: RegistryConfig,
    /// References published by this process, to flag overwrites
    published: Mutex<HashSet<String>>,
}

impl CommitPipeline {
    pub fn new(engine: Arc<dyn ContainerEngine>, registry: RegistryConfig) -> Self {
        Self {
            engine,
            registry,
            published: Mutex::new(HashSet::new()),
        }
    }

    /// Target reference for a session name: `<namespace>/<repository>:<name>-latest`
    pub fn reference_for(&self, name: &str) -> Result<ImageReference, CommitError> {
        let tag = format!("{}-latest", name);
        if !ImageReference::is_valid_tag(&tag) {
            return Err(CommitError::InvalidName(name.to_string()));
        }
        Ok(ImageReference::new(
            format!("{}/{}", self.registry.namespace, self.registry.repository),
            tag,
        ))
    }

    /// Decode the configured registry key
    pub fn credentials(&self) -> Result<Option<RegistryCredentials>, PushError> {
        match self.registry.auth_key.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(key) => decode_auth_key(key).map(Some),
        }
    }

    /// Commit the container and start pushing it.
    ///
    /// Returns once the push has been accepted; the rest of the push arrives
    /// on [`Publication::events`].
    pub async fn commit(
        &self,
        container_id: &str,
        name: &str,
        working_dir: &str,
        entrypoint: Vec<String>,
    ) -> Result<Publication, PublishError> {
        let reference = self.reference_for(name)?;
        let credentials = self.credentials()?;

        let spec = CommitSpec {
            reference: reference.clone(),
            working_dir: working_dir.to_string(),
            entrypoint,
            cmd: Vec::new(),
        };

        let image_id = self
            .engine
            .commit_container(container_id, &spec)
            .await
            .map_err(|e| match e {
                EngineError::NotFound(_) => CommitError::ContainerNotFound(container_id.to_string()),
                other => CommitError::Engine(other),
            })?;

        info!(
            container_id = %container_id,
            image = %reference,
            image_id = %image_id,
            "Container committed"
        );

        if !self.published.lock().await.insert(reference.to_string()) {
            warn!(image = %reference, "Tag re-published; previous image is overwritten");
        }

        let mut push = self
            .engine
            .push_image(&reference, credentials)
            .await
            .map_err(PushError::Engine)?;

        // A rejected push (bad credentials, unknown repository) fails on its first record
        let first = match push.next().await {
            Some(Ok(progress)) => match progress.error {
                Some(message) => {
                    return Err(PushError::Rejected {
                        image: reference.to_string(),
                        message,
                    }
                    .into())
                }
                None => Some(progress),
            },
            Some(Err(e)) => return Err(PushError::Engine(e).into()),
            None => None,
        };

        Ok(Publication {
            container_id: container_id.to_string(),
            image_id,
            events: publish_events(reference.to_string(), first, push),
            reference,
        })
    }
}

fn decode_auth_key(key: &str) -> Result<RegistryCredentials, PushError> {
    let raw = general_purpose::STANDARD
        .decode(key)
        .or_else(|_| general_purpose::URL_SAFE.decode(key))
        .map_err(|e| PushError::Credentials(e.to_string()))?;

    serde_json::from_slice(&raw).map_err(|e| PushError::Credentials(e.to_string()))
}

enum PushState {
    Pushing {
        pending: Option<PushProgress>,
        rest: PushStream,
    },
    Done,
}

/// Translate raw push records into publish events with a single terminal event
fn publish_events(
    image: String,
    first: Option<PushProgress>,
    rest: PushStream,
) -> BoxStream<'static, PublishEvent> {
    let initial = PushState::Pushing {
        pending: first,
        rest,
    };

    stream::unfold(initial, move |state| {
        let image = image.clone();
        async move {
            let (pending, mut rest) = match state {
                PushState::Done => return None,
                PushState::Pushing { pending, rest } => (pending, rest),
            };

            let next = match pending {
                Some(progress) => Some(Ok(progress)),
                None => rest.next().await,
            };

            match next {
                Some(Ok(PushProgress {
                    error: Some(message),
                    ..
                })) => {
                    warn!(image = %image, error = %message, "Push failed");
                    Some((PublishEvent::Failed { image, message }, PushState::Done))
                }
                Some(Ok(progress)) => Some((
                    PublishEvent::Progress {
                        id: progress.id,
                        status: progress.status,
                        progress: progress.progress,
                    },
                    PushState::Pushing {
                        pending: None,
                        rest,
                    },
                )),
                Some(Err(e)) => {
                    warn!(image = %image, error = %e, "Push stream failed");
                    Some((
                        PublishEvent::Failed {
                            image,
                            message: e.to_string(),
                        },
                        PushState::Done,
                    ))
                }
                None => {
                    info!(image = %image, "Push finished");
                    Some((PublishEvent::Finished { image }, PushState::Done))
                }
            }
        }
    })
    .boxed()
}
