//! Service requests and the handles returned for them
//!
//! A [`ServiceRequest`] describes one long-lived container service. It is
//! loadable from YAML or JSON and validated before anything is built from it.
//! [`ContainerService`] is what the caller keeps afterwards and hands back to
//! destroy the service.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Placement placeholder reported until multi-node placement exists
pub const DEFAULT_NODE_ID: &str = "default";

/// Longest name the control plane accepts for a network-service
const MAX_NAME_LEN: usize = 63;
const MAX_SUBDOMAIN_LEN: usize = 253;

/// One host directory mounted into the container.
///
/// The position of a mount in [`ServiceRequest::mounts`] decides its generated
/// volume name (`v0`, `v1`, ...).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostMount {
    /// Path on the node
    pub host_path: String,
    /// Path inside the container
    pub container_path: String,
}

impl HostMount {
    /// Create a mount pairing `host_path` with `container_path`
    pub fn new(host_path: impl Into<String>, container_path: impl Into<String>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
        }
    }
}

/// External exposure of the container through a per-node port
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PublishPort {
    /// Port opened on every node
    pub node_port: u16,
    /// Port the container listens on
    pub target_port: u16,
}

fn default_replicas() -> u32 {
    1
}

/// Request to run an image as a long-lived, replica-managed service
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    /// Names the workload, the network-service and the selector label
    pub service_name: String,
    /// Container image to run
    pub image_reference: String,
    /// Desired replica count, at least 1
    #[serde(default = "default_replicas")]
    pub replica_count: u32,
    /// Arguments passed to the container entrypoint, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub launch_args: Vec<String>,
    /// Environment variables, emitted in key order
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    /// Host directories to mount, in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<HostMount>,
    /// When present, a NodePort network-service is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_port: Option<PublishPort>,
    /// GPUs to attach to the container
    #[serde(default)]
    pub gpu_count: u32,
}

impl ServiceRequest {
    /// Create a single-replica request with nothing but a name and image
    pub fn new(service_name: impl Into<String>, image_reference: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            image_reference: image_reference.into(),
            replica_count: default_replicas(),
            launch_args: Vec::new(),
            environment: BTreeMap::new(),
            mounts: Vec::new(),
            publish_port: None,
            gpu_count: 0,
        }
    }

    /// Set the replica count
    pub fn with_replicas(mut self, replicas: u32) -> Self {
        self.replica_count = replicas;
        self
    }

    /// Append an entrypoint argument
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.launch_args.push(arg.into());
        self
    }

    /// Set an environment variable
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    /// Append a host mount
    pub fn with_mount(
        mut self,
        host_path: impl Into<String>,
        container_path: impl Into<String>,
    ) -> Self {
        self.mounts.push(HostMount::new(host_path, container_path));
        self
    }

    /// Publish `target_port` on every node at `node_port`
    pub fn with_publish_port(mut self, node_port: u16, target_port: u16) -> Self {
        self.publish_port = Some(PublishPort {
            node_port,
            target_port,
        });
        self
    }

    /// Attach GPUs
    pub fn with_gpus(mut self, count: u32) -> Self {
        self.gpu_count = count;
        self
    }

    /// Check the request before any manifest is built from it
    pub fn validate(&self) -> Result<(), Error> {
        let name = &self.service_name;

        validate_dns_label(name)
            .map_err(|msg| Error::validation_for_field(name, "service_name", msg))?;

        if self.image_reference.trim().is_empty() {
            return Err(Error::validation_for_field(
                name,
                "image_reference",
                "image reference cannot be empty",
            ));
        }

        if self.replica_count == 0 {
            return Err(Error::validation_for_field(
                name,
                "replica_count",
                "replica count must be at least 1",
            ));
        }

        let mut host_paths = HashSet::new();
        let mut container_paths = HashSet::new();
        for (i, mount) in self.mounts.iter().enumerate() {
            if mount.host_path.is_empty() {
                return Err(Error::validation_for_field(
                    name,
                    format!("mounts[{}].host_path", i),
                    "host path cannot be empty",
                ));
            }
            if !mount.container_path.starts_with('/') {
                return Err(Error::validation_for_field(
                    name,
                    format!("mounts[{}].container_path", i),
                    format!(
                        "container path must be absolute: '{}'",
                        mount.container_path
                    ),
                ));
            }
            if !host_paths.insert(mount.host_path.as_str()) {
                return Err(Error::validation_for_field(
                    name,
                    format!("mounts[{}].host_path", i),
                    format!("duplicate host path '{}'", mount.host_path),
                ));
            }
            if !container_paths.insert(mount.container_path.as_str()) {
                return Err(Error::validation_for_field(
                    name,
                    format!("mounts[{}].container_path", i),
                    format!("duplicate container path '{}'", mount.container_path),
                ));
            }
        }

        if let Some(port) = &self.publish_port {
            if port.node_port == 0 {
                return Err(Error::validation_for_field(
                    name,
                    "publish_port.node_port",
                    "node port cannot be 0",
                ));
            }
            if port.target_port == 0 {
                return Err(Error::validation_for_field(
                    name,
                    "publish_port.target_port",
                    "target port cannot be 0",
                ));
            }
        }

        Ok(())
    }
}

/// Auxiliary facts about a created service
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    /// Node the service was placed on
    pub node_id: String,
    /// GPUs attached per replica
    pub gpu_count: u32,
    /// Logical service name
    pub service_name: String,
    /// Replicas requested
    pub replica_count: u32,
}

/// Handle to a created service, owned by the caller until it is destroyed
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ContainerService {
    /// Identifier used to destroy the service
    pub id: String,
    /// In-cluster discovery name
    pub hostname: String,
    /// Node port when the service was published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposed_port: Option<u16>,
    /// Placement and sizing details
    pub info: ServiceInfo,
}

impl ContainerService {
    /// Describe the service that `request` produces
    pub fn from_request(request: &ServiceRequest) -> Self {
        Self {
            id: request.service_name.clone(),
            hostname: request.service_name.clone(),
            exposed_port: request.publish_port.map(|p| p.node_port),
            info: ServiceInfo {
                node_id: DEFAULT_NODE_ID.to_string(),
                gpu_count: request.gpu_count,
                service_name: request.service_name.clone(),
                replica_count: request.replica_count,
            },
        }
    }

    /// Handle for a service known only by name, e.g. one created elsewhere
    pub fn named(service_name: impl Into<String>) -> Self {
        let name = service_name.into();
        Self {
            id: name.clone(),
            hostname: name.clone(),
            exposed_port: None,
            info: ServiceInfo {
                node_id: DEFAULT_NODE_ID.to_string(),
                gpu_count: 0,
                service_name: name,
                replica_count: 0,
            },
        }
    }
}

/// One path of a routing rule set
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PathRule {
    /// URL path prefix
    pub path: String,
    /// Network-service receiving the traffic
    pub backend_service_name: String,
    /// Port on that network-service
    pub backend_port: u16,
}

impl PathRule {
    /// Route `path` to `backend_service_name:backend_port`
    pub fn new(
        path: impl Into<String>,
        backend_service_name: impl Into<String>,
        backend_port: u16,
    ) -> Self {
        Self {
            path: path.into(),
            backend_service_name: backend_service_name.into(),
            backend_port,
        }
    }
}

/// Desired state of one routing rule set
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngressRuleSet {
    /// Name of the live routing rule object
    pub ingress_name: String,
    /// Paths in the order they are written
    #[serde(default)]
    pub paths: Vec<PathRule>,
}

impl IngressRuleSet {
    /// Create an empty rule set
    pub fn new(ingress_name: impl Into<String>) -> Self {
        Self {
            ingress_name: ingress_name.into(),
            paths: Vec::new(),
        }
    }

    /// Append a path
    pub fn with_path(
        mut self,
        path: impl Into<String>,
        backend_service_name: impl Into<String>,
        backend_port: u16,
    ) -> Self {
        self.paths
            .push(PathRule::new(path, backend_service_name, backend_port));
        self
    }

    /// Check names, paths and ports
    pub fn validate(&self) -> Result<(), Error> {
        let name = &self.ingress_name;

        validate_dns_subdomain(name)
            .map_err(|msg| Error::validation_for_field(name, "ingress_name", msg))?;

        if self.paths.is_empty() {
            return Err(Error::validation_for_field(
                name,
                "paths",
                "at least one path is required",
            ));
        }

        let mut seen = HashSet::new();
        for (i, rule) in self.paths.iter().enumerate() {
            if !rule.path.starts_with('/') {
                return Err(Error::validation_for_field(
                    name,
                    format!("paths[{}].path", i),
                    format!("path must start with '/': '{}'", rule.path),
                ));
            }
            if !seen.insert(rule.path.as_str()) {
                return Err(Error::validation_for_field(
                    name,
                    format!("paths[{}].path", i),
                    format!("duplicate path '{}'", rule.path),
                ));
            }
            validate_dns_label(&rule.backend_service_name).map_err(|msg| {
                Error::validation_for_field(
                    name,
                    format!("paths[{}].backend_service_name", i),
                    msg,
                )
            })?;
            if rule.backend_port == 0 {
                return Err(Error::validation_for_field(
                    name,
                    format!("paths[{}].backend_port", i),
                    "backend port cannot be 0",
                ));
            }
        }

        Ok(())
    }
}

/// Validate a name usable for a Deployment, Service and label value alike.
///
/// Rules:
/// - Must not be empty or longer than 63 characters
/// - Must start with a lowercase letter
/// - May contain lowercase letters, digits, and hyphens
/// - Must not end with a hyphen
pub(crate) fn validate_dns_label(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("name cannot be empty".to_string());
    }

    if s.len() > MAX_NAME_LEN {
        return Err(format!(
            "name must be at most {} characters: {}",
            MAX_NAME_LEN, s
        ));
    }

    let mut chars = s.chars();

    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return Err(format!("name must start with lowercase letter: {}", s)),
    }

    for c in chars {
        if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '-' {
            return Err(format!(
                "name must be lowercase alphanumeric with hyphens: {}",
                s
            ));
        }
    }

    if s.ends_with('-') {
        return Err(format!("name cannot end with hyphen: {}", s));
    }

    Ok(())
}

/// Validate an object name that may be a dotted DNS subdomain (Ingress names).
///
/// Each dot-separated part must be non-empty, lowercase alphanumeric with
/// hyphens, and start and end with an alphanumeric character.
pub(crate) fn validate_dns_subdomain(s: &str) -> Result<(), String> {
    if s.is_empty() {
        return Err("name cannot be empty".to_string());
    }

    if s.len() > MAX_SUBDOMAIN_LEN {
        return Err(format!(
            "name must be at most {} characters: {}",
            MAX_SUBDOMAIN_LEN, s
        ));
    }

    let alphanumeric = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    for part in s.split('.') {
        if !part.chars().all(|c| alphanumeric(c) || c == '-') {
            return Err(format!(
                "name must be lowercase alphanumeric with hyphens and dots: {}",
                s
            ));
        }
        if !part.starts_with(alphanumeric) || !part.ends_with(alphanumeric) {
            return Err(format!(
                "each dot-separated part must start and end with a letter or digit: {}",
                s
            ));
        }
    }

    Ok(())
}
