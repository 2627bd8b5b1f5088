//! Workload types for berth services
//!
//! This module defines the Kubernetes resources generated for a service request:
//! - Deployment: the replica-managed workload running the image
//! - Service: NodePort exposure, only when the request publishes a port
//!
//! Host-path volumes live in [`volume`]. Use [`ServiceSpecBuilder`] to build both.

pub mod volume;

use std::collections::BTreeMap;

use berth_common::kube_utils::{HasApiResource, ObjectMeta};
use berth_common::{DEFAULT_NAMESPACE, SELECTOR_LABEL};
use serde::{Deserialize, Serialize};

use crate::request::{PublishPort, ServiceRequest};
use crate::Error;
use volume::{compile_mounts, Volume, VolumeMount};

/// Extended resource name GPUs are requested under by default
pub const DEFAULT_GPU_RESOURCE: &str = "nvidia.com/gpu";

/// Service type for per-node external exposure
pub const SERVICE_TYPE_NODE_PORT: &str = "NodePort";

// =============================================================================
// Deployment
// =============================================================================

/// Kubernetes Deployment
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: DeploymentSpec,
}

impl HasApiResource for Deployment {
    const API_VERSION: &'static str = "apps/v1";
    const KIND: &'static str = "Deployment";
}

/// Deployment spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    /// Number of replicas
    pub replicas: u32,
    /// Label selector
    pub selector: LabelSelector,
    /// Pod template
    pub template: PodTemplateSpec,
}

/// Label selector
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Match labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}

/// Pod template spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplateSpec {
    /// Pod metadata
    pub metadata: PodMeta,
    /// Pod spec
    pub spec: PodSpec,
}

/// Pod metadata (subset of ObjectMeta)
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodMeta {
    /// Labels
    pub labels: BTreeMap<String, String>,
}

/// Pod spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    /// Containers
    pub containers: Vec<Container>,
    /// Volumes
    #[serde(default)]
    pub volumes: Vec<Volume>,
}

/// Container spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Container name
    pub name: String,
    /// Image
    pub image: String,
    /// Args
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    /// Environment variables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    /// Resource requirements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    /// Volume mounts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volume_mounts: Vec<VolumeMount>,
}

/// Environment variable with a literal value
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EnvVar {
    /// Variable name
    pub name: String,
    /// Value
    pub value: String,
}

/// Resource requirements keyed by resource name
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceRequirements {
    /// Limits
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
    /// Requests
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,
}

// =============================================================================
// Service
// =============================================================================

/// Kubernetes Service
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// API version
    pub api_version: String,
    /// Kind
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    pub spec: ServiceSpec,
}

impl HasApiResource for Service {
    const API_VERSION: &'static str = "v1";
    const KIND: &'static str = "Service";
}

/// Service spec
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Service type
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    /// Ports
    pub ports: Vec<ServicePort>,
    /// Selector
    pub selector: BTreeMap<String, String>,
}

/// Service port
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    /// Port number
    pub port: u16,
    /// Target port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    /// Node port (NodePort and LoadBalancer only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_port: Option<u16>,
    /// Protocol
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

// =============================================================================
// Generated Workloads Container
// =============================================================================

/// The resources generated for one service request
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedWorkloads {
    /// Kubernetes Deployment
    pub deployment: Deployment,
    /// Kubernetes Service, present only when a port is published
    pub service: Option<Service>,
}

impl GeneratedWorkloads {
    /// Whether a network-service will be created alongside the workload
    pub fn is_exposed(&self) -> bool {
        self.service.is_some()
    }
}

// =============================================================================
// Service Spec Builder
// =============================================================================

/// Builds workload and network-service manifests from a [`ServiceRequest`].
///
/// Pure: no cluster access. The same request always yields the same manifests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSpecBuilder {
    namespace: String,
    gpu_resource: String,
}

impl Default for ServiceSpecBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl ServiceSpecBuilder {
    /// Builder for the given namespace, requesting GPUs as `nvidia.com/gpu`
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            gpu_resource: DEFAULT_GPU_RESOURCE.to_string(),
        }
    }

    /// Request GPUs under a different extended resource name
    pub fn with_gpu_resource(mut self, resource: impl Into<String>) -> Self {
        self.gpu_resource = resource.into();
        self
    }

    /// Namespace every manifest is placed in
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Validate `request` and build its manifests.
    pub fn build(&self, request: &ServiceRequest) -> Result<GeneratedWorkloads, Error> {
        request.validate()?;

        Ok(GeneratedWorkloads {
            deployment: self.build_deployment(request),
            service: request
                .publish_port
                .map(|port| self.build_network_service(&request.service_name, port)),
        })
    }

    /// Build the Deployment for a request.
    ///
    /// The pod template and the Deployment selector both carry `name=<service>`.
    pub fn build_deployment(&self, request: &ServiceRequest) -> Deployment {
        let name = &request.service_name;
        let compiled = compile_mounts(&request.mounts);

        let env = request
            .environment
            .iter()
            .map(|(key, value)| EnvVar {
                name: key.clone(),
                value: value.clone(),
            })
            .collect();

        let args = if request.launch_args.is_empty() {
            None
        } else {
            Some(request.launch_args.clone())
        };

        let container = Container {
            name: name.clone(),
            image: request.image_reference.clone(),
            args,
            env,
            resources: self.gpu_resources(request.gpu_count),
            volume_mounts: compiled.mounts,
        };

        let mut pod_labels = selector_labels(name);
        pod_labels.insert(berth_common::LABEL_NAME.to_string(), name.clone());
        pod_labels.insert(
            berth_common::LABEL_MANAGED_BY.to_string(),
            berth_common::LABEL_MANAGED_BY_BERTH.to_string(),
        );

        Deployment {
            api_version: Deployment::API_VERSION.to_string(),
            kind: Deployment::KIND.to_string(),
            metadata: ObjectMeta::new(name, &self.namespace).with_label(SELECTOR_LABEL, name),
            spec: DeploymentSpec {
                replicas: request.replica_count,
                selector: LabelSelector {
                    match_labels: selector_labels(name),
                },
                template: PodTemplateSpec {
                    metadata: PodMeta { labels: pod_labels },
                    spec: PodSpec {
                        containers: vec![container],
                        volumes: compiled.volumes,
                    },
                },
            },
        }
    }

    /// Build the NodePort Service fronting the workload's pods.
    pub fn build_network_service(&self, name: &str, port: PublishPort) -> Service {
        Service {
            api_version: Service::API_VERSION.to_string(),
            kind: Service::KIND.to_string(),
            metadata: ObjectMeta::new(name, &self.namespace).with_label(SELECTOR_LABEL, name),
            spec: ServiceSpec {
                type_: Some(SERVICE_TYPE_NODE_PORT.to_string()),
                ports: vec![ServicePort {
                    port: port.target_port,
                    target_port: Some(port.target_port),
                    node_port: Some(port.node_port),
                    protocol: None,
                }],
                selector: selector_labels(name),
            },
        }
    }

    /// GPU limit for `count` GPUs; no resource section at all for zero.
    fn gpu_resources(&self, count: u32) -> Option<ResourceRequirements> {
        if count == 0 {
            return None;
        }
        let mut limits = BTreeMap::new();
        limits.insert(self.gpu_resource.clone(), count.to_string());
        Some(ResourceRequirements {
            limits,
            requests: BTreeMap::new(),
        })
    }
}

fn selector_labels(name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(SELECTOR_LABEL.to_string(), name.to_string());
    labels
}
