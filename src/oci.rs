//! Translation of container specs into runtime configuration.
//!
//! The runtime consumes an [`OciSpec`], a subset of the OCI runtime
//! specification sufficient to describe the root filesystem, environment,
//! mounts, resource limits and user namespace mappings of a container.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::spec::{BindMountMode, ContainerSpec, Rootfs};

const OCI_VERSION: &str = "1.0.2";

/// Annotation carrying the spec's network request.
pub const NETWORK_ANNOTATION: &str = "garden.network";

/// Runtime configuration derived from a [`ContainerSpec`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OciSpec {
    pub oci_version: String,
    pub hostname: String,
    pub root: Root,
    pub process: Process,
    pub mounts: Vec<Mount>,
    pub linux: Linux,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Image reference when the rootfs is resolved by the runtime.
    #[serde(skip)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Root {
    pub path: String,
    pub readonly: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Process {
    pub env: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Mount {
    pub destination: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdMapping {
    #[serde(rename = "containerID")]
    pub container_id: u32,
    #[serde(rename = "hostID")]
    pub host_id: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_shares: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pids_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Linux {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub uid_mappings: Vec<IdMapping>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub gid_mappings: Vec<IdMapping>,
    pub resources: Resources,
}

impl OciSpec {
    /// Builds the runtime configuration for `spec`.
    ///
    /// `rootfs` is the value returned by [`ContainerSpec::validate`];
    /// `max_uid`/`max_gid` come from the user namespace mapper and are
    /// only used for unprivileged containers.
    pub fn from_spec(spec: &ContainerSpec, rootfs: &Rootfs, max_uid: u32, max_gid: u32) -> Self {
        let (root_path, image) = match rootfs {
            Rootfs::Raw(path) => (path.clone(), None),
            Rootfs::Image(image) => (String::new(), Some(image.clone())),
        };

        let mounts = spec
            .bind_mounts
            .iter()
            .map(|m| Mount {
                destination: m.dst_path.clone(),
                kind: "bind".to_string(),
                source: m.src_path.clone(),
                options: vec![
                    "rbind".to_string(),
                    match m.mode {
                        BindMountMode::Ro => "ro".to_string(),
                        BindMountMode::Rw => "rw".to_string(),
                    },
                ],
            })
            .collect();

        let (uid_mappings, gid_mappings) = if spec.privileged {
            (Vec::new(), Vec::new())
        } else {
            (id_mappings(max_uid), id_mappings(max_gid))
        };

        let mut annotations = BTreeMap::new();
        if let Some(network) = &spec.network {
            annotations.insert(NETWORK_ANNOTATION.to_string(), network.clone());
        }

        Self {
            oci_version: OCI_VERSION.to_string(),
            hostname: spec.handle.clone(),
            root: Root {
                path: root_path,
                readonly: false,
            },
            process: Process {
                env: spec.env.clone(),
            },
            mounts,
            linux: Linux {
                uid_mappings,
                gid_mappings,
                resources: Resources {
                    memory_limit: spec.limits.memory_bytes,
                    cpu_shares: spec.limits.cpu_shares,
                    pids_limit: spec.limits.pids,
                },
            },
            annotations,
            image,
        }
    }
}

/// Root in the container maps to the highest host id; every other id
/// maps to itself.
fn id_mappings(max_id: u32) -> Vec<IdMapping> {
    let mut mappings = vec![IdMapping {
        container_id: 0,
        host_id: max_id,
        size: 1,
    }];

    if max_id > 1 {
        mappings.push(IdMapping {
            container_id: 1,
            host_id: 1,
            size: max_id - 1,
        });
    }

    mappings
}
