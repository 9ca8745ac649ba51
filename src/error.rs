//! Error types for garden-backend operations.
//!
//! Defines error types for each collaborator and for the backend itself:
//! - Container spec validation
//! - Low-level runtime (containers and tasks)
//! - Task killing
//! - Network teardown
//! - User namespace mapping
//! - The public backend contract, which wraps all of the above

use thiserror::Error;

/// Boxed error raised by a pluggable collaborator.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors found while validating a container spec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("handle must be specified")]
    EmptyHandle,

    #[error("rootfs path must be specified")]
    EmptyRootfs,

    #[error("malformed rootfs '{uri}': {reason}")]
    MalformedRootfs { uri: String, reason: String },

    #[error("malformed env entry '{0}': expected KEY=VALUE")]
    MalformedEnv(String),

    #[error("bind mount '{src}' -> '{dst}' must use absolute paths")]
    RelativeBindMount { src: String, dst: String },
}

/// Errors reported by the low-level container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },

    #[error("container '{0}' already exists")]
    AlreadyExists(String),

    #[error("runtime not available: {0}")]
    Unavailable(String),

    #[error("unsupported by runtime: {0}")]
    Unsupported(String),

    #[error("pull image '{image}': {source}")]
    ImagePull {
        image: String,
        #[source]
        source: bollard::errors::Error,
    },

    #[error("docker: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("{0}")]
    Other(String),
}

impl RuntimeError {
    /// Builds a not-found error for a container handle.
    pub fn container_not_found(id: impl Into<String>) -> Self {
        RuntimeError::NotFound {
            what: "container",
            id: id.into(),
        }
    }

    /// Builds a not-found error for a container's task.
    pub fn task_not_found(id: impl Into<String>) -> Self {
        RuntimeError::NotFound {
            what: "task",
            id: id.into(),
        }
    }

    /// Returns true when the runtime reports the entity as absent.
    pub fn is_not_found(&self) -> bool {
        match self {
            RuntimeError::NotFound { .. } => true,
            RuntimeError::Docker(bollard::errors::Error::DockerResponseServerError {
                status_code,
                ..
            }) => *status_code == 404,
            _ => false,
        }
    }
}

/// Errors that can occur while killing a task.
#[derive(Debug, Error)]
pub enum KillError {
    #[error("send {signal}: {source}")]
    Signal {
        signal: &'static str,
        #[source]
        source: RuntimeError,
    },

    #[error("wait for exit: {0}")]
    Wait(#[source] RuntimeError),

    #[error("{0}")]
    Other(#[source] BoxError),
}

/// Errors that can occur while tearing down a container's network.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("remove network for '{handle}': {source}")]
    Remove {
        handle: String,
        #[source]
        source: BoxError,
    },
}

/// Errors that can occur while resolving user namespace id maps.
#[derive(Debug, Error)]
pub enum UserNamespaceError {
    #[error("malformed id map '{path}' line {line}: {reason}")]
    MalformedMap {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("id map '{0}' has no entries")]
    EmptyMap(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable classification of a [`BackendError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected input; no collaborator was called.
    Validation,
    /// The backend was constructed incorrectly.
    Configuration,
    /// The container runtime failed.
    Runtime,
    /// The user namespace mapper failed.
    UserNamespace,
    /// The killer failed.
    Kill,
    /// The network collaborator failed.
    Network,
}

/// Errors returned by the public backend contract.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("empty handle")]
    EmptyHandle,

    #[error("invalid container spec: {0}")]
    InvalidSpec(SpecError),

    #[error("invalid property filter: key '{key}' value '{value}'")]
    InvalidFilter { key: String, value: String },

    #[error("property '{0}' not found")]
    PropertyNotFound(String),

    #[error("nil client")]
    MissingClient,

    #[error("{op}: {source}")]
    Runtime {
        op: &'static str,
        #[source]
        source: RuntimeError,
    },

    #[error("max valid ids: {0}")]
    UserNamespace(#[source] UserNamespaceError),

    #[error("kill task: {0}")]
    Kill(#[source] KillError),

    #[error("remove network: {0}")]
    Network(#[source] NetworkError),
}

impl BackendError {
    pub(crate) fn runtime(op: &'static str, source: RuntimeError) -> Self {
        BackendError::Runtime { op, source }
    }

    /// Returns the stable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackendError::EmptyHandle
            | BackendError::InvalidSpec(_)
            | BackendError::InvalidFilter { .. }
            | BackendError::PropertyNotFound(_) => ErrorKind::Validation,
            BackendError::MissingClient => ErrorKind::Configuration,
            BackendError::Runtime { .. } => ErrorKind::Runtime,
            BackendError::UserNamespace(_) => ErrorKind::UserNamespace,
            BackendError::Kill(_) => ErrorKind::Kill,
            BackendError::Network(_) => ErrorKind::Network,
        }
    }

    /// Returns true if the error was raised before any collaborator call.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}
