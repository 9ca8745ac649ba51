//! Container network teardown.

use async_trait::async_trait;
use tracing::debug;

use crate::error::NetworkError;

/// Manages the network attachment of containers.
#[async_trait]
pub trait Network: Send + Sync {
    /// Releases the network attachment of the container `handle` in
    /// `namespace`.
    async fn remove(&self, namespace: &str, handle: &str) -> Result<(), NetworkError>;
}

/// Containers share the host's network stack; nothing is attached, so
/// nothing has to be released.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostNetwork;

#[async_trait]
impl Network for HostNetwork {
    async fn remove(&self, namespace: &str, handle: &str) -> Result<(), NetworkError> {
        debug!(namespace = %namespace, handle = %handle, "Host network has nothing to release");
        Ok(())
    }
}
