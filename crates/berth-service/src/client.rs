//! Control-plane verbs for workloads, network-services and routing rules
//!
//! [`ClusterClient`] is the seam between the manager and the cluster: the
//! manager only ever talks to the trait, tests substitute a mock, and
//! [`KubeClusterClient`] issues the real calls through kube-rs.

use async_trait::async_trait;
use berth_common::kube_utils::{ClusterSettings, HasApiResource};
use berth_common::Operation;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde::Serialize;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::ingress::{Ingress, RoutingRuleEntry};
use crate::workload::{Deployment, Service};
use crate::Error;

/// Identity of a resource the control plane accepted
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceHandle {
    /// Resource kind (e.g. "Deployment")
    pub kind: String,
    /// Resource name
    pub name: String,
    /// UID assigned by the control plane
    pub uid: Option<String>,
}

impl ResourceHandle {
    /// Handle for a resource of `kind` named `name`
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            uid: None,
        }
    }

    /// Attach the control-plane UID
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }
}

impl std::fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

// =============================================================================
// Traits for dependency injection and testability
// =============================================================================

/// Resource verbs against the cluster control plane
///
/// Every call is one round-trip; nothing is cached. Implementations are bound
/// to a single namespace at construction.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Namespace every verb is scoped to
    fn namespace(&self) -> String;

    /// Create the replica-managed workload
    async fn create_workload(&self, manifest: &Deployment) -> Result<ResourceHandle, Error>;

    /// Delete the workload named `name`
    async fn delete_workload(&self, name: &str) -> Result<(), Error>;

    /// Create the network-service
    async fn create_network_service(&self, manifest: &Service) -> Result<ResourceHandle, Error>;

    /// Delete the network-service named `name`
    async fn delete_network_service(&self, name: &str) -> Result<(), Error>;

    /// List every routing rule set in the namespace
    async fn list_routing_rules(&self) -> Result<Vec<RoutingRuleEntry>, Error>;

    /// Create a routing rule set
    async fn create_routing_rule(&self, manifest: &Ingress) -> Result<ResourceHandle, Error>;

    /// Overwrite the routing rule set named `name`
    async fn replace_routing_rule(
        &self,
        name: &str,
        manifest: &Ingress,
    ) -> Result<ResourceHandle, Error>;
}

// =============================================================================
// kube-rs implementation
// =============================================================================

/// [`ClusterClient`] over a kube-rs [`Client`]
///
/// Manifests are submitted as `DynamicObject`s so the exact serialized shape of
/// the berth manifest types is what reaches the API server.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
    namespace: String,
}

impl KubeClusterClient {
    /// Wrap an already authenticated client, scoped to `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Authenticate from in-cluster settings and scope to their namespace
    pub async fn connect(settings: &ClusterSettings) -> Result<Self, Error> {
        let client = settings.connect().await?;
        Ok(Self::new(client, settings.namespace.clone()))
    }

    fn api(&self, ar: &ApiResource) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), &self.namespace, ar)
    }

    async fn create<T: Serialize + Sync>(
        &self,
        ar: &ApiResource,
        operation: Operation,
        name: &str,
        manifest: &T,
    ) -> Result<ResourceHandle, Error> {
        let obj = to_dynamic(ar, name, manifest)?;
        let created = self
            .api(ar)
            .create(&PostParams::default(), &obj)
            .await
            .map_err(|e| Error::from_kube(operation, name, e))?;

        debug!(kind = %ar.kind, name = %name, namespace = %self.namespace, "created");
        Ok(handle_for(ar, name, created))
    }

    async fn delete(&self, ar: &ApiResource, operation: Operation, name: &str) -> Result<(), Error> {
        self.api(ar)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::from_kube(operation, name, e))?;

        debug!(kind = %ar.kind, name = %name, namespace = %self.namespace, "deleted");
        Ok(())
    }
}

fn deployment_resource() -> ApiResource {
    Deployment::api_resource()
}

fn service_resource() -> ApiResource {
    Service::api_resource()
}

fn ingress_resource() -> ApiResource {
    Ingress::api_resource()
}

/// Convert a berth manifest into a `DynamicObject` for `ar`
fn to_dynamic<T: Serialize>(
    ar: &ApiResource,
    name: &str,
    manifest: &T,
) -> Result<DynamicObject, Error> {
    let value = serde_json::to_value(manifest).map_err(|e| {
        Error::serialization_for_kind(&ar.kind, format!("failed to serialize {}: {}", name, e))
    })?;
    serde_json::from_value(value).map_err(|e| {
        Error::serialization_for_kind(&ar.kind, format!("failed to convert {}: {}", name, e))
    })
}

fn handle_for(ar: &ApiResource, name: &str, created: DynamicObject) -> ResourceHandle {
    let handle = ResourceHandle::new(&ar.kind, created.metadata.name.as_deref().unwrap_or(name));
    match created.metadata.uid {
        Some(uid) => handle.with_uid(uid),
        None => handle,
    }
}

/// Decode a listed object, leaving the manifest empty if its shape is foreign
fn routing_entry(obj: DynamicObject) -> RoutingRuleEntry {
    let name = obj.metadata.name.clone().unwrap_or_default();
    let manifest = match serde_json::to_value(&obj).and_then(serde_json::from_value::<Ingress>) {
        Ok(ingress) => Some(ingress),
        Err(e) => {
            warn!(ingress = %name, error = %e, "could not decode live ingress");
            None
        }
    };
    RoutingRuleEntry { name, manifest }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    fn namespace(&self) -> String {
        self.namespace.clone()
    }

    async fn create_workload(&self, manifest: &Deployment) -> Result<ResourceHandle, Error> {
        let name = manifest.metadata.name.as_str();
        self.create(&deployment_resource(), Operation::CreateWorkload, name, manifest)
            .await
    }

    async fn delete_workload(&self, name: &str) -> Result<(), Error> {
        self.delete(&deployment_resource(), Operation::DeleteWorkload, name)
            .await
    }

    async fn create_network_service(&self, manifest: &Service) -> Result<ResourceHandle, Error> {
        let name = manifest.metadata.name.as_str();
        self.create(&service_resource(), Operation::CreateNetworkService, name, manifest)
            .await
    }

    async fn delete_network_service(&self, name: &str) -> Result<(), Error> {
        self.delete(&service_resource(), Operation::DeleteNetworkService, name)
            .await
    }

    async fn list_routing_rules(&self) -> Result<Vec<RoutingRuleEntry>, Error> {
        let list = self
            .api(&ingress_resource())
            .list(&ListParams::default())
            .await
            .map_err(|e| Error::from_routing_query(&self.namespace, e))?;

        Ok(list.items.into_iter().map(routing_entry).collect())
    }

    async fn create_routing_rule(&self, manifest: &Ingress) -> Result<ResourceHandle, Error> {
        let name = manifest.metadata.name.as_str();
        self.create(&ingress_resource(), Operation::CreateRoutingRule, name, manifest)
            .await
    }

    async fn replace_routing_rule(
        &self,
        name: &str,
        manifest: &Ingress,
    ) -> Result<ResourceHandle, Error> {
        let ar = ingress_resource();
        let obj = to_dynamic(&ar, name, manifest)?;
        let replaced = self
            .api(&ar)
            .replace(name, &PostParams::default(), &obj)
            .await
            .map_err(|e| Error::from_kube(Operation::ReplaceRoutingRule, name, e))?;

        debug!(kind = %ar.kind, name = %name, namespace = %self.namespace, "replaced");
        Ok(handle_for(&ar, name, replaced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::ingress::IngressPathBuilder;
    use crate::request::{IngressRuleSet, ServiceRequest};
    use crate::workload::ServiceSpecBuilder;

    // =========================================================================
    // Story: Manifest types address the same resources as k8s-openapi
    // =========================================================================

    #[test]
    fn manifest_resources_match_native_kinds() {
        use k8s_openapi::api::apps::v1::Deployment as NativeDeployment;
        use k8s_openapi::api::core::v1::Service as NativeService;
        use k8s_openapi::api::networking::v1::Ingress as NativeIngress;

        for (ours, native) in [
            (
                deployment_resource(),
                ApiResource::erase::<NativeDeployment>(&()),
            ),
            (service_resource(), ApiResource::erase::<NativeService>(&())),
            (ingress_resource(), ApiResource::erase::<NativeIngress>(&())),
        ] {
            assert_eq!(ours.group, native.group);
            assert_eq!(ours.version, native.version);
            assert_eq!(ours.api_version, native.api_version);
            assert_eq!(ours.kind, native.kind);
            assert_eq!(ours.plural, native.plural);
        }
    }

    // =========================================================================
    // Story: Manifests convert to dynamic objects without loss
    // =========================================================================

    #[test]
    fn deployment_converts_to_dynamic_object() {
        let request = ServiceRequest::new("svc1", "img:1").with_replicas(2);
        let deployment = ServiceSpecBuilder::default().build_deployment(&request);
        let obj = to_dynamic(&deployment_resource(), "svc1", &deployment).unwrap();

        assert_eq!(obj.metadata.name.as_deref(), Some("svc1"));
        assert_eq!(obj.metadata.namespace.as_deref(), Some("default"));
        let types = obj.types.as_ref().expect("type meta");
        assert_eq!(types.api_version, "apps/v1");
        assert_eq!(types.kind, "Deployment");
        assert_eq!(obj.data["spec"]["replicas"], 2);
    }

    #[test]
    fn created_object_yields_handle_with_uid() {
        let created: DynamicObject = serde_json::from_value(serde_json::json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {"name": "svc1", "uid": "1234"}
        }))
        .unwrap();
        let handle = handle_for(&service_resource(), "svc1", created);
        assert_eq!(handle, ResourceHandle::new("Service", "svc1").with_uid("1234"));
        assert_eq!(handle.to_string(), "Service/svc1");
    }

    // =========================================================================
    // Story: Listed rule sets decode leniently
    // =========================================================================

    #[test]
    fn listed_ingress_decodes_into_entry() {
        let ingress = IngressPathBuilder::build(
            &IngressRuleSet::new("ing1").with_path("/api", "svc1", 8080),
            "default",
            None,
        );
        let obj = to_dynamic(&ingress_resource(), "ing1", &ingress).unwrap();
        let entry = routing_entry(obj);

        assert_eq!(entry.name, "ing1");
        assert_eq!(entry.manifest, Some(ingress));
    }

    #[test]
    fn undecodable_ingress_keeps_name_only() {
        let obj: DynamicObject = serde_json::from_value(serde_json::json!({
            "metadata": {"name": "weird"},
            "spec": {"rules": "not-a-list"}
        }))
        .unwrap();
        let entry = routing_entry(obj);
        assert_eq!(entry.name, "weird");
        assert!(entry.manifest.is_none());
    }
}
