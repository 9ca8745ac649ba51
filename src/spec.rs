//! Container specifications accepted by the backend.
//!
//! A [`ContainerSpec`] is the high-level description of a container. It
//! is validated before any collaborator is touched.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SpecError;

const RAW_SCHEME: &str = "raw";
const DOCKER_SCHEME: &str = "docker";

/// Access mode of a bind mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMountMode {
    /// Read-only.
    #[default]
    Ro,
    /// Read-write.
    Rw,
}

/// A host directory mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindMount {
    /// Absolute path on the host.
    pub src_path: String,
    /// Absolute path inside the container.
    pub dst_path: String,
    /// Access mode.
    #[serde(default)]
    pub mode: BindMountMode,
}

impl BindMount {
    /// Creates a read-only bind mount.
    pub fn new(src_path: impl Into<String>, dst_path: impl Into<String>) -> Self {
        Self {
            src_path: src_path.into(),
            dst_path: dst_path.into(),
            mode: BindMountMode::Ro,
        }
    }

    /// Makes the mount read-write.
    pub fn read_write(mut self) -> Self {
        self.mode = BindMountMode::Rw;
        self
    }
}

/// Optional resource limits for a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    /// Memory limit in bytes.
    pub memory_bytes: Option<u64>,
    /// Relative CPU weight.
    pub cpu_shares: Option<u64>,
    /// Maximum number of processes.
    pub pids: Option<u64>,
}

/// High-level description of a container to create.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Unique name of the container.
    pub handle: String,
    /// Root filesystem URI (`raw:///path` or `docker:///image`).
    pub rootfs_path: String,
    /// Runs without user namespace remapping when set.
    #[serde(default)]
    pub privileged: bool,
    /// Environment in `KEY=VALUE` form.
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub bind_mounts: Vec<BindMount>,
    #[serde(default)]
    pub limits: Limits,
    /// Initial container properties.
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// Opaque network request handed to the runtime as an annotation.
    #[serde(default)]
    pub network: Option<String>,
}

impl ContainerSpec {
    /// Creates a spec with the given handle and rootfs URI.
    pub fn new(handle: impl Into<String>, rootfs_path: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            rootfs_path: rootfs_path.into(),
            ..Default::default()
        }
    }

    /// Marks the container as privileged.
    pub fn with_privileged(mut self, privileged: bool) -> Self {
        self.privileged = privileged;
        self
    }

    /// Sets the environment.
    pub fn with_env(mut self, env: Vec<String>) -> Self {
        self.env = env;
        self
    }

    /// Adds a bind mount.
    pub fn with_bind_mount(mut self, mount: BindMount) -> Self {
        self.bind_mounts.push(mount);
        self
    }

    /// Sets resource limits.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets a single property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the network request.
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    /// Validates the spec and returns the parsed root filesystem.
    pub fn validate(&self) -> Result<Rootfs, SpecError> {
        if self.handle.is_empty() {
            return Err(SpecError::EmptyHandle);
        }

        let rootfs = Rootfs::parse(&self.rootfs_path)?;

        for entry in &self.env {
            match entry.split_once('=') {
                Some((key, _)) if !key.is_empty() => {}
                _ => return Err(SpecError::MalformedEnv(entry.clone())),
            }
        }

        for mount in &self.bind_mounts {
            if !Path::new(&mount.src_path).is_absolute() || !Path::new(&mount.dst_path).is_absolute()
            {
                return Err(SpecError::RelativeBindMount {
                    src: mount.src_path.clone(),
                    dst: mount.dst_path.clone(),
                });
            }
        }

        Ok(rootfs)
    }
}

/// A parsed root filesystem reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rootfs {
    /// An unpacked root filesystem directory on the host.
    Raw(String),
    /// An image reference resolved by the runtime.
    Image(String),
}

impl Rootfs {
    /// Parses a rootfs URI of the form `scheme:///path`.
    pub fn parse(uri: &str) -> Result<Self, SpecError> {
        if uri.is_empty() {
            return Err(SpecError::EmptyRootfs);
        }

        let malformed = |reason: &str| SpecError::MalformedRootfs {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| malformed("missing scheme"))?;

        match scheme {
            RAW_SCHEME => {
                if rest.is_empty() || rest == "/" {
                    return Err(malformed("empty path"));
                }
                if !rest.starts_with('/') {
                    return Err(malformed("path must be absolute"));
                }
                Ok(Rootfs::Raw(rest.to_string()))
            }
            DOCKER_SCHEME => {
                let image = rest.trim_start_matches('/');
                if image.is_empty() {
                    return Err(malformed("empty image reference"));
                }
                Ok(Rootfs::Image(image.to_string()))
            }
            other => Err(malformed(&format!("unsupported scheme '{other}'"))),
        }
    }

    /// Returns the path or image reference.
    pub fn as_str(&self) -> &str {
        match self {
            Rootfs::Raw(path) => path,
            Rootfs::Image(image) => image,
        }
    }
}
