//! garden-backend: Garden-style container lifecycle over a low-level runtime.
//!
//! This library exposes a stable container-management contract (create,
//! lookup, list, destroy, start/stop, ping, grace time) and drives a
//! container runtime, a network collaborator, a user namespace mapper and
//! a task killer to implement it.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use garden_backend::{Backend, BackendConfig, ContainerSpec, DockerRuntime};
//!
//! let backend = Backend::new(BackendConfig::new().with_runtime(Arc::new(DockerRuntime::new())))?;
//! backend.start().await?;
//!
//! let container = backend
//!     .create(&ContainerSpec::new("build-42", "docker:///busybox"))
//!     .await?;
//! backend.destroy(container.handle()).await?;
//! ```

pub mod backend;
pub mod error;
pub mod killer;
pub mod network;
pub mod oci;
pub mod runtime;
pub mod spec;
pub mod userns;

pub use backend::{Backend, BackendConfig, Container, GRACE_TIME_KEY};
pub use error::{
    BackendError, BoxError, ErrorKind, KillError, NetworkError, RuntimeError, SpecError,
    UserNamespaceError,
};
pub use killer::{KillBehavior, Killer, SignalKiller};
pub use network::{HostNetwork, Network};
pub use runtime::{DockerRuntime, RuntimeClient, RuntimeContainer, Task};
pub use spec::ContainerSpec;
pub use userns::{ProcUserNamespace, UserNamespace};
