//! Host-path volumes for service requests
//!
//! Each [`HostMount`] becomes one `hostPath` volume on the pod and one
//! volume mount on the container. Volume names are assigned by position:
//! the i-th mount gets `v<i>`.

use serde::{Deserialize, Serialize};

use crate::request::HostMount;

/// Prefix of every generated volume name
pub const VOLUME_NAME_PREFIX: &str = "v";

// =============================================================================
// Kubernetes Volume Types
// =============================================================================

/// Pod volume backed by a directory on the node
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Volume {
    /// Volume name, referenced by the container mount
    pub name: String,
    /// Host path source
    pub host_path: HostPathVolumeSource,
}

/// hostPath volume source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostPathVolumeSource {
    /// Directory on the node
    pub path: String,
    /// hostPath type check (e.g. "Directory"); unchecked when absent
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// Container volume mount
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    /// Volume name
    pub name: String,
    /// Mount path
    pub mount_path: String,
    /// Read only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
}

// =============================================================================
// Mount compilation
// =============================================================================

/// Volumes and mounts compiled from a request's mounts, index-aligned
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompiledVolumes {
    /// Pod volumes
    pub volumes: Vec<Volume>,
    /// Container mounts, `mounts[i]` references `volumes[i]`
    pub mounts: Vec<VolumeMount>,
}

impl CompiledVolumes {
    /// True if no mounts were requested
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }
}

/// Name of the volume generated for the mount at `ordinal`
pub fn volume_name(ordinal: usize) -> String {
    format!("{}{}", VOLUME_NAME_PREFIX, ordinal)
}

/// Compile host mounts into pod volumes and container mounts
pub fn compile_mounts(mounts: &[HostMount]) -> CompiledVolumes {
    let mut output = CompiledVolumes::default();

    for (ordinal, mount) in mounts.iter().enumerate() {
        let name = volume_name(ordinal);
        output.volumes.push(Volume {
            name: name.clone(),
            host_path: HostPathVolumeSource {
                path: mount.host_path.clone(),
                type_: None,
            },
        });
        output.mounts.push(VolumeMount {
            name,
            mount_path: mount.container_path.clone(),
            read_only: None,
        });
    }

    output
}
