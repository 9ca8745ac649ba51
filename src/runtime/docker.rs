//! Docker Engine runtime using the bollard crate.
//!
//! Maps the runtime contract onto Docker: a runtime container is a Docker
//! container named after its handle, and its task is the container's main
//! process. Creating the task is free, starting it starts the container,
//! and the task only exists while the container is running.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions,
    ListContainersOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::HostConfig;
use bollard::Docker;
use futures::StreamExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{parse_selector, ExitStatus, Labels, RuntimeClient, RuntimeContainer, Signal, Task};
use crate::error::RuntimeError;
use crate::oci::OciSpec;

/// Runtime client backed by the local Docker daemon.
///
/// The client starts disconnected; [`RuntimeClient::init`] connects it.
#[derive(Default)]
pub struct DockerRuntime {
    docker: RwLock<Option<Docker>>,
}

impl DockerRuntime {
    /// Creates a disconnected client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client from an existing bollard connection.
    pub fn from_docker(docker: Docker) -> Self {
        Self {
            docker: RwLock::new(Some(docker)),
        }
    }

    async fn connection(&self) -> Result<Docker, RuntimeError> {
        self.docker
            .read()
            .await
            .clone()
            .ok_or_else(|| RuntimeError::Unavailable("docker client not initialized".to_string()))
    }

    /// Pulls `image` unless the daemon already has it.
    async fn ensure_image(docker: &Docker, image: &str) -> Result<(), RuntimeError> {
        if docker.inspect_image(image).await.is_ok() {
            return Ok(());
        }

        info!(image = %image, "Pulling image");
        let options = CreateImageOptions {
            from_image: image,
            ..Default::default()
        };

        let mut stream = docker.create_image(Some(options), None, None);
        while let Some(result) = stream.next().await {
            result.map_err(|source| RuntimeError::ImagePull {
                image: image.to_string(),
                source,
            })?;
        }

        Ok(())
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn init(&self) -> Result<(), RuntimeError> {
        let docker = Docker::connect_with_local_defaults()
            .map_err(|e| RuntimeError::Unavailable(format!("failed to connect: {e}")))?;

        *self.docker.write().await = Some(docker);
        info!("Connected to docker daemon");
        Ok(())
    }

    async fn stop(&self) -> Result<(), RuntimeError> {
        self.docker.write().await.take();
        Ok(())
    }

    async fn version(&self) -> Result<String, RuntimeError> {
        let version = self.connection().await?.version().await?;
        Ok(version.version.unwrap_or_default())
    }

    async fn new_container(
        &self,
        handle: &str,
        labels: &Labels,
        oci: &OciSpec,
    ) -> Result<Arc<dyn RuntimeContainer>, RuntimeError> {
        let image = oci.image.clone().ok_or_else(|| {
            RuntimeError::Unsupported("raw root filesystems require a docker:// image".to_string())
        })?;

        let resources = &oci.linux.resources;
        let binds: Vec<String> = oci
            .mounts
            .iter()
            .map(|m| {
                let mode = if m.options.iter().any(|o| o == "rw") {
                    "rw"
                } else {
                    "ro"
                };
                format!("{}:{}:{}", m.source, m.destination, mode)
            })
            .collect();

        let host_config = HostConfig {
            memory: docker_limit("memory limit", resources.memory_limit)?,
            cpu_shares: docker_limit("cpu shares", resources.cpu_shares)?,
            pids_limit: docker_limit("pids limit", resources.pids_limit)?,
            binds: if binds.is_empty() { None } else { Some(binds) },
            ..Default::default()
        };

        let config = Config {
            image: Some(image.clone()),
            hostname: Some(oci.hostname.clone()),
            env: if oci.process.env.is_empty() {
                None
            } else {
                Some(oci.process.env.clone())
            },
            labels: Some(labels.clone()),
            host_config: Some(host_config),
            ..Default::default()
        };

        let docker = self.connection().await?;
        Self::ensure_image(&docker, &image).await?;

        let options = CreateContainerOptions {
            name: handle.to_string(),
            platform: None,
        };

        docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 409, ..
                } => RuntimeError::AlreadyExists(handle.to_string()),
                other => RuntimeError::Docker(other),
            })?;

        debug!(handle = %handle, "Created docker container");
        Ok(Arc::new(DockerContainer::new(docker, handle)))
    }

    async fn get_container(&self, handle: &str) -> Result<Arc<dyn RuntimeContainer>, RuntimeError> {
        let docker = self.connection().await?;
        let container = DockerContainer::new(docker, handle);
        container.inspect().await?;
        Ok(Arc::new(container))
    }

    async fn containers(
        &self,
        selectors: &[String],
    ) -> Result<Vec<Arc<dyn RuntimeContainer>>, RuntimeError> {
        let docker = self.connection().await?;

        let mut label_filters = Vec::with_capacity(selectors.len());
        for selector in selectors {
            let (key, value) = parse_selector(selector)
                .ok_or_else(|| RuntimeError::Other(format!("malformed selector '{selector}'")))?;
            label_filters.push(format!("{key}={value}"));
        }

        let mut filters = HashMap::new();
        if !label_filters.is_empty() {
            filters.insert("label".to_string(), label_filters);
        }

        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let summaries = docker.list_containers(Some(options)).await?;

        Ok(summaries
            .into_iter()
            .filter_map(|s| s.names.and_then(|names| names.into_iter().next()))
            .map(|name| {
                Arc::new(DockerContainer::new(
                    docker.clone(),
                    name.trim_start_matches('/'),
                )) as Arc<dyn RuntimeContainer>
            })
            .collect())
    }
}

/// A Docker container addressed by name.
pub struct DockerContainer {
    docker: Docker,
    id: String,
}

impl DockerContainer {
    fn new(docker: Docker, id: impl Into<String>) -> Self {
        Self {
            docker,
            id: id.into(),
        }
    }

    async fn inspect(&self) -> Result<bollard::models::ContainerInspectResponse, RuntimeError> {
        self.docker
            .inspect_container(&self.id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| not_found_or(e, || RuntimeError::container_not_found(&self.id)))
    }
}

#[async_trait]
impl RuntimeContainer for DockerContainer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn labels(&self) -> Result<Labels, RuntimeError> {
        let info = self.inspect().await?;
        Ok(info.config.and_then(|c| c.labels).unwrap_or_default())
    }

    async fn set_labels(&self, _labels: Labels) -> Result<Labels, RuntimeError> {
        Err(RuntimeError::Unsupported(
            "docker container labels are immutable".to_string(),
        ))
    }

    async fn new_task(&self) -> Result<Arc<dyn Task>, RuntimeError> {
        Ok(Arc::new(DockerTask {
            docker: self.docker.clone(),
            id: self.id.clone(),
        }))
    }

    async fn task(&self) -> Result<Arc<dyn Task>, RuntimeError> {
        let info = self.inspect().await?;
        let running = info.state.and_then(|s| s.running).unwrap_or(false);

        if !running {
            return Err(RuntimeError::task_not_found(&self.id));
        }

        self.new_task().await
    }

    async fn delete(&self) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: false,
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(&self.id, Some(options))
            .await
            .map_err(|e| not_found_or(e, || RuntimeError::container_not_found(&self.id)))
    }
}

/// The main process of a Docker container.
pub struct DockerTask {
    docker: Docker,
    id: String,
}

impl DockerTask {
    async fn exit_status(&self) -> Result<ExitStatus, RuntimeError> {
        let info = self
            .docker
            .inspect_container(&self.id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| not_found_or(e, || RuntimeError::task_not_found(&self.id)))?;

        Ok(ExitStatus {
            code: info.state.and_then(|s| s.exit_code).unwrap_or(-1),
        })
    }
}

#[async_trait]
impl Task for DockerTask {
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> Result<(), RuntimeError> {
        self.docker
            .start_container(&self.id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn kill(&self, signal: Signal) -> Result<(), RuntimeError> {
        let options = KillContainerOptions {
            signal: signal.name(),
        };

        self.docker
            .kill_container(&self.id, Some(options))
            .await
            .map_err(|e| kill_error(e, &self.id))
    }

    async fn wait(&self) -> Result<ExitStatus, RuntimeError> {
        let options = WaitContainerOptions {
            condition: "not-running",
        };

        let mut stream = self.docker.wait_container(&self.id, Some(options));

        match stream.next().await {
            Some(Ok(response)) => Ok(ExitStatus {
                code: response.status_code,
            }),
            // bollard reports a non-zero exit as an error
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => {
                Ok(ExitStatus { code })
            }
            Some(Err(e)) => Err(not_found_or(e, || RuntimeError::task_not_found(&self.id))),
            None => self.exit_status().await,
        }
    }

    async fn delete(&self) -> Result<ExitStatus, RuntimeError> {
        self.exit_status().await
    }
}

/// Docker answers 409 both for a stopped container, whose task is gone,
/// and for a paused one, which still has a task.
fn kill_error(err: bollard::errors::Error, id: &str) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            ref message,
        } if message.contains("is not running") => RuntimeError::task_not_found(id),
        bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            ref message,
        } => {
            warn!(container = %id, message = %message, "Kill rejected by docker");
            RuntimeError::Docker(err)
        }
        other => not_found_or(other, || RuntimeError::task_not_found(id)),
    }
}

fn docker_limit(name: &str, value: Option<u64>) -> Result<Option<i64>, RuntimeError> {
    value
        .map(|v| {
            i64::try_from(v)
                .map_err(|_| RuntimeError::Other(format!("{name} {v} exceeds docker's range")))
        })
        .transpose()
}

fn not_found_or(
    err: bollard::errors::Error,
    not_found: impl FnOnce() -> RuntimeError,
) -> RuntimeError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        } => not_found(),
        other => RuntimeError::Docker(other),
    }
}
