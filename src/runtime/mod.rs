//! Low-level container runtime abstraction.
//!
//! The backend drives a runtime through three capability traits:
//!
//! ```text
//! RuntimeClient ──new_container/get_container/containers──► RuntimeContainer
//! RuntimeContainer ──new_task/task──► Task
//! ```
//!
//! A container owns at most one task, the process group running inside it.
//! Runtimes report absent containers and tasks with
//! [`RuntimeError::NotFound`](crate::error::RuntimeError::NotFound).

pub mod docker;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::oci::OciSpec;

pub use docker::DockerRuntime;

/// Key/value labels attached to a runtime container.
pub type Labels = HashMap<String, String>;

/// Signals the backend sends to tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Request orderly termination.
    Term,
    /// Terminate immediately.
    Kill,
}

impl Signal {
    /// Returns the conventional signal name.
    pub fn name(&self) -> &'static str {
        match self {
            Signal::Term => "SIGTERM",
            Signal::Kill => "SIGKILL",
        }
    }

    /// Returns the POSIX signal number.
    pub fn number(&self) -> i32 {
        match self {
            Signal::Term => 15,
            Signal::Kill => 9,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Exit status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i64,
}

/// Client of the low-level container runtime.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Connects to the runtime.
    async fn init(&self) -> Result<(), RuntimeError>;

    /// Releases the runtime connection.
    async fn stop(&self) -> Result<(), RuntimeError>;

    /// Queries the runtime version; doubles as a health check.
    async fn version(&self) -> Result<String, RuntimeError>;

    /// Creates a container without starting anything in it.
    async fn new_container(
        &self,
        handle: &str,
        labels: &Labels,
        oci: &OciSpec,
    ) -> Result<Arc<dyn RuntimeContainer>, RuntimeError>;

    /// Retrieves an existing container by handle.
    async fn get_container(&self, handle: &str) -> Result<Arc<dyn RuntimeContainer>, RuntimeError>;

    /// Lists containers matching every `key==value` selector.
    async fn containers(
        &self,
        selectors: &[String],
    ) -> Result<Vec<Arc<dyn RuntimeContainer>>, RuntimeError>;
}

/// A container owned by the runtime.
#[async_trait]
pub trait RuntimeContainer: Send + Sync {
    /// Returns the container's handle.
    fn id(&self) -> &str;

    async fn labels(&self) -> Result<Labels, RuntimeError>;

    /// Replaces the container's labels, returning the stored set.
    async fn set_labels(&self, labels: Labels) -> Result<Labels, RuntimeError>;

    /// Creates the container's task.
    async fn new_task(&self) -> Result<Arc<dyn Task>, RuntimeError>;

    /// Retrieves the container's task; not-found when none exists.
    async fn task(&self) -> Result<Arc<dyn Task>, RuntimeError>;

    /// Deletes the container record.
    async fn delete(&self) -> Result<(), RuntimeError>;
}

/// The process group running inside a container.
#[async_trait]
pub trait Task: Send + Sync {
    fn id(&self) -> &str;

    async fn start(&self) -> Result<(), RuntimeError>;

    async fn kill(&self, signal: Signal) -> Result<(), RuntimeError>;

    /// Waits until the task has exited.
    async fn wait(&self) -> Result<ExitStatus, RuntimeError>;

    /// Deletes the exited task and reports its status.
    async fn delete(&self) -> Result<ExitStatus, RuntimeError>;
}

/// Encodes a label filter as `key==value` selectors.
pub fn label_selectors<'a, I>(filter: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    filter
        .into_iter()
        .map(|(key, value)| format!("{key}=={value}"))
        .collect()
}

/// Splits a `key==value` selector.
pub fn parse_selector(selector: &str) -> Option<(&str, &str)> {
    selector.split_once("==")
}
