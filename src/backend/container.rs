//! Contract-level view of a runtime container.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::BackendError;
use crate::killer::{KillBehavior, Killer};
use crate::runtime::{Labels, RuntimeContainer};

/// A container as seen through the backend contract.
///
/// Holds no state of its own: properties are the runtime container's
/// labels and are read on every call.
#[derive(Clone)]
pub struct Container {
    inner: Arc<dyn RuntimeContainer>,
    killer: Arc<dyn Killer>,
}

impl Container {
    pub(crate) fn new(inner: Arc<dyn RuntimeContainer>, killer: Arc<dyn Killer>) -> Self {
        Self { inner, killer }
    }

    /// Returns the container's handle.
    pub fn handle(&self) -> &str {
        self.inner.id()
    }

    /// Returns all properties.
    pub async fn properties(&self) -> Result<Labels, BackendError> {
        self.inner
            .labels()
            .await
            .map_err(|e| BackendError::runtime("get labels", e))
    }

    /// Returns a single property.
    pub async fn property(&self, name: &str) -> Result<String, BackendError> {
        self.properties()
            .await?
            .remove(name)
            .ok_or_else(|| BackendError::PropertyNotFound(name.to_string()))
    }

    pub async fn set_property(&self, name: &str, value: &str) -> Result<(), BackendError> {
        let mut labels = self.properties().await?;
        labels.insert(name.to_string(), value.to_string());
        self.store(labels).await
    }

    pub async fn remove_property(&self, name: &str) -> Result<(), BackendError> {
        let mut labels = self.properties().await?;
        if labels.remove(name).is_none() {
            return Err(BackendError::PropertyNotFound(name.to_string()));
        }
        self.store(labels).await
    }

    /// Stops the container's task. `kill` skips the graceful period.
    ///
    /// A container without a task is already stopped.
    pub async fn stop(&self, kill: bool) -> Result<(), BackendError> {
        let task = match self.inner.task().await {
            Ok(task) => task,
            Err(e) if e.is_not_found() => {
                debug!(handle = %self.handle(), "No task to stop");
                return Ok(());
            }
            Err(e) => return Err(BackendError::runtime("get task", e)),
        };

        let behavior = if kill {
            KillBehavior::Ungracefully
        } else {
            KillBehavior::Gracefully
        };

        self.killer
            .kill(task.as_ref(), behavior)
            .await
            .map_err(BackendError::Kill)
    }

    async fn store(&self, labels: Labels) -> Result<(), BackendError> {
        self.inner
            .set_labels(labels)
            .await
            .map(|_| ())
            .map_err(|e| BackendError::runtime("set labels", e))
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("handle", &self.handle())
            .finish()
    }
}
