//! Construction options for the backend.

use std::fmt;
use std::sync::Arc;

use crate::killer::Killer;
use crate::network::Network;
use crate::runtime::RuntimeClient;
use crate::userns::UserNamespace;

/// Default runtime namespace the backend's containers live in.
pub const DEFAULT_NAMESPACE: &str = "garden";

/// Collaborators and settings of a [`Backend`](super::Backend).
///
/// Only the runtime is required; every other collaborator falls back to a
/// built-in implementation when unset.
#[derive(Clone)]
pub struct BackendConfig {
    /// Low-level container runtime.
    pub runtime: Option<Arc<dyn RuntimeClient>>,
    /// Network teardown; defaults to [`HostNetwork`](crate::network::HostNetwork).
    pub network: Option<Arc<dyn Network>>,
    /// Id mapping; defaults to [`ProcUserNamespace`](crate::userns::ProcUserNamespace).
    pub user_namespace: Option<Arc<dyn UserNamespace>>,
    /// Task termination; defaults to [`SignalKiller`](crate::killer::SignalKiller).
    pub killer: Option<Arc<dyn Killer>>,
    /// Namespace passed to the network collaborator.
    pub namespace: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            runtime: None,
            network: None,
            user_namespace: None,
            killer: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

impl BackendConfig {
    /// Creates a configuration with no collaborators set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime client.
    pub fn with_runtime(mut self, runtime: Arc<dyn RuntimeClient>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Overrides the network collaborator.
    pub fn with_network(mut self, network: Arc<dyn Network>) -> Self {
        self.network = Some(network);
        self
    }

    /// Overrides the user namespace mapper.
    pub fn with_user_namespace(mut self, user_namespace: Arc<dyn UserNamespace>) -> Self {
        self.user_namespace = Some(user_namespace);
        self
    }

    /// Overrides the killer.
    pub fn with_killer(mut self, killer: Arc<dyn Killer>) -> Self {
        self.killer = Some(killer);
        self
    }

    /// Sets the runtime namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("runtime", &self.runtime.is_some())
            .field("network", &self.network.is_some())
            .field("user_namespace", &self.user_namespace.is_some())
            .field("killer", &self.killer.is_some())
            .field("namespace", &self.namespace)
            .finish()
    }
}
