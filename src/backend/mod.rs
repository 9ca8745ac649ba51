//! Garden-style container management over a low-level runtime.
//!
//! [`Backend`] implements the public contract (create, lookup, list,
//! destroy, start/stop, ping, grace time) by validating input, delegating
//! to the runtime and its collaborators, and translating runtime errors.
//!
//! # Destroy
//!
//! Teardown is ordered and fail-fast, with no retries and no rollback:
//!
//! ```text
//! get container ─► get task ─┬─ not found ─────────────────────────────► delete container
//!                            └─ found ─► kill ─► remove network ─► delete task ─► delete container
//! ```
//!
//! A task that is already gone is not a failure, so calling destroy again
//! after a partial teardown makes progress.

pub mod config;
pub mod container;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::error::BackendError;
use crate::killer::{KillBehavior, Killer, SignalKiller};
use crate::network::{HostNetwork, Network};
use crate::oci::OciSpec;
use crate::runtime::{label_selectors, RuntimeClient};
use crate::spec::ContainerSpec;
use crate::userns::{ProcUserNamespace, UserNamespace};

pub use config::{BackendConfig, DEFAULT_NAMESPACE};
pub use container::Container;

/// Property holding a container's idle timeout, in nanoseconds.
pub const GRACE_TIME_KEY: &str = "garden.grace-time";

/// Container lifecycle backend.
///
/// The backend keeps no state between calls. Concurrent operations on the
/// same handle are not serialized here; callers that race a create against
/// a destroy, or two destroys, rely on the runtime's own atomicity.
#[derive(Clone)]
pub struct Backend {
    runtime: Arc<dyn RuntimeClient>,
    network: Arc<dyn Network>,
    user_namespace: Arc<dyn UserNamespace>,
    killer: Arc<dyn Killer>,
    namespace: String,
}

impl Backend {
    /// Builds a backend, filling unset collaborators with the built-ins.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::MissingClient` when no runtime is configured.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let runtime = config.runtime.ok_or(BackendError::MissingClient)?;

        Ok(Self {
            runtime,
            network: config.network.unwrap_or_else(|| Arc::new(HostNetwork)),
            user_namespace: config
                .user_namespace
                .unwrap_or_else(|| Arc::new(ProcUserNamespace::new())),
            killer: config
                .killer
                .unwrap_or_else(|| Arc::new(SignalKiller::new())),
            namespace: config.namespace,
        })
    }

    /// Returns the runtime namespace.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Connects to the runtime.
    pub async fn start(&self) -> Result<(), BackendError> {
        self.runtime
            .init()
            .await
            .map_err(|e| BackendError::runtime("failed to initialize runtime client", e))
    }

    /// Disconnects from the runtime. Failures are only logged.
    pub async fn stop(&self) {
        if let Err(e) = self.runtime.stop().await {
            warn!(error = %e, "Failed to stop runtime client");
        }
    }

    /// Checks that the runtime answers.
    pub async fn ping(&self) -> Result<(), BackendError> {
        self.runtime
            .version()
            .await
            .map(|_| ())
            .map_err(|e| BackendError::runtime("failed getting runtime version", e))
    }

    /// Creates a container and starts its task.
    ///
    /// A container whose task fails to be created or started is left in
    /// place; destroying it is up to the caller.
    #[instrument(skip(self, spec), fields(handle = %spec.handle))]
    pub async fn create(&self, spec: &ContainerSpec) -> Result<Container, BackendError> {
        let rootfs = spec.validate().map_err(BackendError::InvalidSpec)?;

        let (max_uid, max_gid) = self
            .user_namespace
            .max_valid_ids()
            .await
            .map_err(BackendError::UserNamespace)?;

        let oci = OciSpec::from_spec(spec, &rootfs, max_uid, max_gid);

        let container = self
            .runtime
            .new_container(&spec.handle, &spec.properties, &oci)
            .await
            .map_err(|e| BackendError::runtime("new container", e))?;

        let task = container
            .new_task()
            .await
            .map_err(|e| BackendError::runtime("new task", e))?;

        task.start()
            .await
            .map_err(|e| BackendError::runtime("task start", e))?;

        info!("Container created");
        Ok(Container::new(container, Arc::clone(&self.killer)))
    }

    /// Retrieves a container by handle. An unknown handle is an error.
    pub async fn lookup(&self, handle: &str) -> Result<Container, BackendError> {
        if handle.is_empty() {
            return Err(BackendError::EmptyHandle);
        }

        let container = self
            .runtime
            .get_container(handle)
            .await
            .map_err(|e| BackendError::runtime("get container", e))?;

        Ok(Container::new(container, Arc::clone(&self.killer)))
    }

    /// Lists containers whose properties match every filter entry.
    ///
    /// Empty keys or values reject the whole filter.
    pub async fn containers(
        &self,
        filter: &HashMap<String, String>,
    ) -> Result<Vec<Container>, BackendError> {
        if let Some((key, value)) = filter
            .iter()
            .find(|(key, value)| key.is_empty() || value.is_empty())
        {
            return Err(BackendError::InvalidFilter {
                key: key.clone(),
                value: value.clone(),
            });
        }

        let selectors = label_selectors(filter);

        let containers = self
            .runtime
            .containers(&selectors)
            .await
            .map_err(|e| BackendError::runtime("list containers", e))?;

        Ok(containers
            .into_iter()
            .map(|c| Container::new(c, Arc::clone(&self.killer)))
            .collect())
    }

    /// Tears a container down: kill, network, task, container.
    ///
    /// Every step runs at most once and the first failure stops the
    /// teardown.
    #[instrument(skip(self))]
    pub async fn destroy(&self, handle: &str) -> Result<(), BackendError> {
        if handle.is_empty() {
            return Err(BackendError::EmptyHandle);
        }

        let container = self
            .runtime
            .get_container(handle)
            .await
            .map_err(|e| BackendError::runtime("get container", e))?;

        let task = match container.task().await {
            Ok(task) => task,
            Err(e) if e.is_not_found() => {
                debug!("No task found, deleting container");
                container
                    .delete()
                    .await
                    .map_err(|e| BackendError::runtime("delete container", e))?;
                info!("Container destroyed");
                return Ok(());
            }
            Err(e) => return Err(BackendError::runtime("get task", e)),
        };

        self.killer
            .kill(task.as_ref(), KillBehavior::Gracefully)
            .await
            .map_err(BackendError::Kill)?;

        self.network
            .remove(&self.namespace, handle)
            .await
            .map_err(BackendError::Network)?;

        task.delete()
            .await
            .map_err(|e| BackendError::runtime("delete task", e))?;

        container
            .delete()
            .await
            .map_err(|e| BackendError::runtime("delete container", e))?;

        info!("Container destroyed");
        Ok(())
    }

    /// Returns the container's idle timeout.
    ///
    /// Advisory: a missing, unreadable or malformed value yields zero.
    pub async fn grace_time(&self, container: &Container) -> Duration {
        match container.property(GRACE_TIME_KEY).await {
            Ok(value) => value
                .parse::<u64>()
                .map(Duration::from_nanos)
                .unwrap_or(Duration::ZERO),
            Err(_) => Duration::ZERO,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
