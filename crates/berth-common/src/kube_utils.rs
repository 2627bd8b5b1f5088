//! Shared Kubernetes utilities using kube-rs
//!
//! Object metadata for generated manifests, `ApiResource` construction for
//! typed manifests, and construction of the authenticated control-plane
//! client.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::{debug, info};

use crate::Error;

// =============================================================================
// ObjectMeta - Canonical Kubernetes metadata for generated resources
// =============================================================================

/// Standard Kubernetes ObjectMeta for generated resources.
///
/// Used by workloads, network-services, and routing rules. Adds the
/// recommended name and managed-by labels on construction.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Resource name
    pub name: String,
    /// Resource namespace
    #[serde(default)]
    pub namespace: String,
    /// Labels
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Annotations
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create new metadata with the standard berth labels
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        let name = name.into();
        let mut labels = BTreeMap::new();
        labels.insert(crate::LABEL_NAME.to_string(), name.clone());
        labels.insert(
            crate::LABEL_MANAGED_BY.to_string(),
            crate::LABEL_MANAGED_BY_BERTH.to_string(),
        );
        Self {
            name,
            namespace: namespace.into(),
            labels,
            annotations: BTreeMap::new(),
        }
    }

    /// Add a label
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add an annotation
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// HasApiResource Trait
// =============================================================================

/// Trait for manifest types with a known API group, version, and kind.
///
/// The constants drive both the `apiVersion`/`kind` fields written into the
/// manifest and the `ApiResource` used to address it, so the two never drift.
///
/// # Example
/// ```ignore
/// impl HasApiResource for Ingress {
///     const API_VERSION: &'static str = "networking.k8s.io/v1";
///     const KIND: &'static str = "Ingress";
/// }
///
/// let ar = Ingress::api_resource();
/// ```
pub trait HasApiResource {
    /// Full API version (e.g., "apps/v1", "v1")
    const API_VERSION: &'static str;
    /// Resource kind (e.g., "Deployment")
    const KIND: &'static str;

    /// Build an ApiResource from the type's constants.
    fn api_resource() -> ApiResource {
        build_api_resource(Self::API_VERSION, Self::KIND)
    }
}

/// Build an ApiResource from a known apiVersion and kind.
///
/// ```ignore
/// let ar = build_api_resource("apps/v1", "Deployment");
/// let api: Api<DynamicObject> = Api::namespaced_with(client, "default", &ar);
/// ```
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into (group, version); the core group is empty.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Irregular plurals among the kinds berth addresses
const KIND_PLURALS: &[(&str, &str)] = &[("ingress", "ingresses"), ("endpoints", "endpoints")];

/// Lowercase plural resource name for a kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

// =============================================================================
// Cluster connection
// =============================================================================

/// Environment variable holding the control-plane host inside a pod
pub const ENV_SERVICE_HOST: &str = "KUBERNETES_SERVICE_HOST";
/// Environment variable holding the control-plane port inside a pod
pub const ENV_SERVICE_PORT: &str = "KUBERNETES_SERVICE_PORT";
/// Service-account bearer token mounted into every pod
pub const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";
/// Service-account CA bundle mounted into every pod
pub const DEFAULT_CA_CERT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/ca.crt";

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to build the authenticated control-plane client.
///
/// Read once; the resulting client never changes its endpoint, credential,
/// or TLS trust decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterSettings {
    /// Control-plane host
    pub host: String,
    /// Control-plane port
    pub port: u16,
    /// File holding the bearer token
    pub token_path: PathBuf,
    /// CA bundle used to verify the control plane (ignored when skipping verification)
    pub ca_cert_path: Option<PathBuf>,
    /// Skip TLS verification of the control plane
    pub insecure_skip_tls_verify: bool,
    /// Namespace every resource is addressed in
    pub namespace: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read timeout
    pub read_timeout: Duration,
}

impl ClusterSettings {
    /// Settings for an explicit endpoint with the service-account defaults
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            ca_cert_path: Some(PathBuf::from(DEFAULT_CA_CERT_PATH)),
            insecure_skip_tls_verify: false,
            namespace: crate::DEFAULT_NAMESPACE.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Read the endpoint from `KUBERNETES_SERVICE_HOST` / `KUBERNETES_SERVICE_PORT`
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the endpoint through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let host = lookup(ENV_SERVICE_HOST)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::config("env", format!("{} is not set", ENV_SERVICE_HOST)))?;
        let port = lookup(ENV_SERVICE_PORT)
            .ok_or_else(|| Error::config("env", format!("{} is not set", ENV_SERVICE_PORT)))?;
        let port = port.trim().parse::<u16>().map_err(|e| {
            Error::config(
                "env",
                format!("{} is not a valid port '{}': {}", ENV_SERVICE_PORT, port, e),
            )
        })?;
        Ok(Self::new(host, port))
    }

    /// Use a different namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Use a different bearer token file
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Set the TLS trust decision
    pub fn with_insecure_skip_tls_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_tls_verify = skip;
        self
    }

    /// Control-plane URL; IPv6 hosts are bracketed
    pub fn endpoint(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("https://[{}]:{}", self.host, self.port)
        } else {
            format!("https://{}:{}", self.host, self.port)
        }
    }

    /// Read the bearer token; an unreadable or empty file is a configuration error
    pub async fn read_token(&self) -> Result<String, Error> {
        let raw = tokio::fs::read_to_string(&self.token_path).await.map_err(|e| {
            Error::config(
                "token",
                format!("failed to read {}: {}", self.token_path.display(), e),
            )
        })?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(Error::config(
                "token",
                format!("{} is empty", self.token_path.display()),
            ));
        }
        Ok(token.to_string())
    }

    /// Build a kubeconfig describing this endpoint and credential
    pub fn to_kubeconfig(&self, token: &str) -> Result<Kubeconfig, Error> {
        let mut cluster = serde_json::json!({
            "server": self.endpoint(),
            "insecure-skip-tls-verify": self.insecure_skip_tls_verify,
        });
        if let (false, Some(ca)) = (self.insecure_skip_tls_verify, &self.ca_cert_path) {
            cluster["certificate-authority"] = serde_json::Value::String(ca.display().to_string());
        }

        let value = serde_json::json!({
            "apiVersion": "v1",
            "kind": "Config",
            "clusters": [{ "name": "berth", "cluster": cluster }],
            "users": [{ "name": "berth", "user": { "token": token } }],
            "contexts": [{
                "name": "berth",
                "context": { "cluster": "berth", "user": "berth", "namespace": self.namespace }
            }],
            "current-context": "berth",
        });

        serde_json::from_value(value)
            .map_err(|e| Error::serialization_for_kind("Config", e.to_string()))
    }

    /// Read the credential and build the client
    pub async fn connect(&self) -> Result<Client, Error> {
        let token = self.read_token().await?;
        let kubeconfig = self.to_kubeconfig(&token)?;
        let mut config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| {
                Error::config("connect", format!("failed to load cluster config: {}", e))
            })?;
        config.connect_timeout = Some(self.connect_timeout);
        config.read_timeout = Some(self.read_timeout);
        config.default_namespace = self.namespace.clone();

        info!(
            endpoint = %self.endpoint(),
            namespace = %self.namespace,
            verify_tls = !self.insecure_skip_tls_verify,
            "connecting to control plane"
        );
        Ok(Client::try_from(config)?)
    }
}

/// Create a kube client from an optional kubeconfig path with default timeouts
///
/// Without a path the standard inference chain applies (`KUBECONFIG`,
/// `~/.kube/config`, then in-cluster service account).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            debug!(path = %path.display(), "loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::config("create_client", format!("failed to read kubeconfig: {}", e))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| {
                    Error::config("create_client", format!("failed to load kubeconfig: {}", e))
                })?
        }
        None => Config::infer().await.map_err(|e| {
            Error::config("create_client", format!("failed to infer config: {}", e))
        })?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Ok(Client::try_from(config)?)
}
