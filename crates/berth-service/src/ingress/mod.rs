//! Ingress module for HTTP routing rules
//!
//! This module provides types and planning logic for:
//! - **Ingress**: `networking.k8s.io/v1` routing rule sets mapping paths to services
//! - **Update planning**: Create vs replace against the live rule sets, with an
//!   optional merge keyed by path
//!
//! The live object under an ingress name is the source of truth. Every update
//! re-reads it and decides from scratch.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use berth_common::kube_utils::{HasApiResource, ObjectMeta};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::request::{IngressRuleSet, PathRule};

/// Annotation rewriting matched prefixes to `/` at the nginx controller
pub const REWRITE_TARGET_ANNOTATION: &str = "nginx.ingress.kubernetes.io/rewrite-target";

/// Path type written for every generated path
pub const PATH_TYPE_PREFIX: &str = "Prefix";

// =============================================================================
// Macro for default serde functions
// =============================================================================

macro_rules! impl_api_defaults {
    ($type:ty) => {
        impl $type {
            fn default_api_version() -> String {
                <Self as HasApiResource>::API_VERSION.to_string()
            }
            fn default_kind() -> String {
                <Self as HasApiResource>::KIND.to_string()
            }
        }
    };
}

// =============================================================================
// Ingress Types
// =============================================================================

/// Kubernetes Ingress resource
///
/// Deserialization is lenient so live objects written by other tools still
/// decode: unknown fields are ignored and most fields are optional.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Ingress {
    /// API version (networking.k8s.io/v1)
    #[serde(default = "Ingress::default_api_version")]
    pub api_version: String,
    /// Resource kind (Ingress)
    #[serde(default = "Ingress::default_kind")]
    pub kind: String,
    /// Metadata
    pub metadata: ObjectMeta,
    /// Spec
    #[serde(default)]
    pub spec: IngressSpec,
}

impl HasApiResource for Ingress {
    const API_VERSION: &'static str = "networking.k8s.io/v1";
    const KIND: &'static str = "Ingress";
}

impl_api_defaults!(Ingress);

impl Ingress {
    /// Every path across all host-less rules, in order
    pub fn paths(&self) -> impl Iterator<Item = &HttpIngressPath> {
        self.spec
            .rules
            .iter()
            .filter(|rule| rule.host.is_none())
            .filter_map(|rule| rule.http.as_ref())
            .flat_map(|http| http.paths.iter())
    }
}

/// Ingress spec
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressSpec {
    /// Ingress class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    /// Rules
    #[serde(default)]
    pub rules: Vec<IngressRule>,
}

/// Ingress rule
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressRule {
    /// Host to match; all hosts when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// HTTP paths
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpIngressRuleValue>,
}

/// HTTP rule value
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpIngressRuleValue {
    /// Paths
    #[serde(default)]
    pub paths: Vec<HttpIngressPath>,
}

/// One path of an HTTP rule
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpIngressPath {
    /// Path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Path type (Prefix, Exact, ImplementationSpecific)
    #[serde(default)]
    pub path_type: String,
    /// Backend
    pub backend: IngressBackend,
}

/// Ingress backend
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressBackend {
    /// Service backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<IngressServiceBackend>,
}

/// Service backend
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngressServiceBackend {
    /// Service name
    pub name: String,
    /// Service port
    #[serde(default)]
    pub port: ServiceBackendPort,
}

/// Service port referenced by number or name
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBackendPort {
    /// Port number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u16>,
    /// Port name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

// =============================================================================
// Ingress Path Builder
// =============================================================================

/// Builds Ingress manifests from [`IngressRuleSet`]s
pub struct IngressPathBuilder;

impl IngressPathBuilder {
    /// Build the full Ingress for a rule set.
    ///
    /// One host-less rule holds one path per [`PathRule`], in order.
    pub fn build(rule_set: &IngressRuleSet, namespace: &str, class: Option<&str>) -> Ingress {
        let metadata = ObjectMeta::new(&rule_set.ingress_name, namespace)
            .with_annotation(REWRITE_TARGET_ANNOTATION, "/");

        Ingress {
            api_version: Ingress::default_api_version(),
            kind: Ingress::default_kind(),
            metadata,
            spec: IngressSpec {
                ingress_class_name: class.map(str::to_string),
                rules: vec![IngressRule {
                    host: None,
                    http: Some(HttpIngressRuleValue {
                        paths: Self::build_paths(&rule_set.paths),
                    }),
                }],
            },
        }
    }

    /// Convert path rules into native paths
    pub fn build_paths(rules: &[PathRule]) -> Vec<HttpIngressPath> {
        rules.iter().map(Self::build_path).collect()
    }

    fn build_path(rule: &PathRule) -> HttpIngressPath {
        HttpIngressPath {
            path: Some(rule.path.clone()),
            path_type: PATH_TYPE_PREFIX.to_string(),
            backend: IngressBackend {
                service: Some(IngressServiceBackend {
                    name: rule.backend_service_name.clone(),
                    port: ServiceBackendPort {
                        number: Some(rule.backend_port),
                        name: None,
                    },
                }),
            },
        }
    }
}

// =============================================================================
// Update planning
// =============================================================================

/// How an existing rule set is updated
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum IngressUpdateMode {
    /// The desired rule set overwrites the live one entirely
    #[default]
    Replace,
    /// Live paths not named by the desired set are kept after the desired ones
    MergeByPath,
}

impl fmt::Display for IngressUpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngressUpdateMode::Replace => write!(f, "replace"),
            IngressUpdateMode::MergeByPath => write!(f, "merge"),
        }
    }
}

impl FromStr for IngressUpdateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(IngressUpdateMode::Replace),
            "merge" | "merge-by-path" => Ok(IngressUpdateMode::MergeByPath),
            other => Err(format!(
                "unknown ingress update mode '{}' (expected replace or merge)",
                other
            )),
        }
    }
}

/// A live routing rule set as listed from the control plane
#[derive(Clone, Debug, PartialEq)]
pub struct RoutingRuleEntry {
    /// Object name
    pub name: String,
    /// Decoded object, absent when the live shape could not be decoded
    pub manifest: Option<Ingress>,
}

/// What `update_ingress` did to the live rule set
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IngressChange {
    /// No rule set existed under the name; one was created
    Created,
    /// The existing rule set was replaced
    Replaced,
}

impl fmt::Display for IngressChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngressChange::Created => write!(f, "created"),
            IngressChange::Replaced => write!(f, "replaced"),
        }
    }
}

/// The write `update_ingress` is about to issue
#[derive(Clone, Debug, PartialEq)]
pub struct IngressPlan {
    /// Create or replace
    pub change: IngressChange,
    /// Manifest to submit
    pub manifest: Ingress,
}

/// Decide between create and replace for `desired` given the live rule sets.
pub fn plan_update(
    live: &[RoutingRuleEntry],
    mut desired: Ingress,
    mode: IngressUpdateMode,
) -> IngressPlan {
    let name = desired.metadata.name.clone();
    let Some(existing) = live.iter().find(|entry| entry.name == name) else {
        return IngressPlan {
            change: IngressChange::Created,
            manifest: desired,
        };
    };

    if mode == IngressUpdateMode::MergeByPath {
        match &existing.manifest {
            Some(current) => merge_paths(&mut desired, current),
            None => warn!(
                ingress = %name,
                "live ingress could not be decoded, replacing without merge"
            ),
        }
    }

    IngressPlan {
        change: IngressChange::Replaced,
        manifest: desired,
    }
}

/// Append live paths whose path is not in `desired` to desired's first rule.
///
/// Desired paths keep their order and win on conflicts. Live paths follow in
/// their live order. Host-specific live rules are not carried over.
pub fn merge_paths(desired: &mut Ingress, live: &Ingress) {
    let claimed: HashSet<Option<String>> = desired.paths().map(|p| p.path.clone()).collect();

    let kept: Vec<HttpIngressPath> = live
        .paths()
        .filter(|p| !claimed.contains(&p.path))
        .cloned()
        .collect();

    if kept.is_empty() {
        return;
    }

    if desired.spec.rules.is_empty() {
        desired.spec.rules.push(IngressRule::default());
    }
    let rule = &mut desired.spec.rules[0];
    rule.http
        .get_or_insert_with(HttpIngressRuleValue::default)
        .paths
        .extend(kept);
}
