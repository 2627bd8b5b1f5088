//! The container manager facade
//!
//! [`ContainerManager`] is what callers use: it validates a request, builds
//! the manifests, and drives the [`ClusterClient`] verbs in order, applying
//! the configured [`RetryPolicy`] to each verb.
//!
//! `create_service` is a short saga. The network-service is created first; if
//! the workload then fails, the network-service is deleted again before the
//! error is returned. Only when that compensating delete also fails does the
//! caller see [`Error::PartiallyCreated`].

use std::sync::Arc;

use berth_common::{Operation, RetryPolicy};
use tracing::{debug, info, instrument, warn};

use crate::client::{ClusterClient, ResourceHandle};
use crate::ingress::{plan_update, IngressChange, IngressPathBuilder, IngressUpdateMode};
use crate::request::{ContainerService, IngressRuleSet, ServiceRequest};
use crate::workload::{ServiceSpecBuilder, DEFAULT_GPU_RESOURCE};
use crate::Error;

/// Settings for a [`ContainerManager`], passed explicitly at construction
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Which verbs are retried, and how
    pub retry: RetryPolicy,
    /// Extended resource name GPUs are requested under
    pub gpu_resource: String,
    /// How an existing routing rule set is updated
    pub ingress_mode: IngressUpdateMode,
    /// Ingress class written into generated rule sets
    pub ingress_class: Option<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            gpu_resource: DEFAULT_GPU_RESOURCE.to_string(),
            ingress_mode: IngressUpdateMode::default(),
            ingress_class: None,
        }
    }
}

/// Creates, destroys, and routes to container services
pub struct ContainerManager {
    client: Arc<dyn ClusterClient>,
    config: ManagerConfig,
    builder: ServiceSpecBuilder,
}

impl ContainerManager {
    /// Create a manager issuing calls through `client`
    ///
    /// Manifests are stamped with the client's namespace, so the object
    /// metadata always matches the namespace the request is sent to.
    pub fn new(client: Arc<dyn ClusterClient>, config: ManagerConfig) -> Self {
        let builder =
            ServiceSpecBuilder::new(client.namespace()).with_gpu_resource(&config.gpu_resource);
        Self {
            client,
            config,
            builder,
        }
    }

    /// Namespace every resource is created in
    pub fn namespace(&self) -> &str {
        self.builder.namespace()
    }

    /// The settings this manager was built with
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Run `request` as a service: network-service first (if published), then
    /// the workload.
    #[instrument(
        skip(self, request),
        fields(service = %request.service_name, namespace = %self.namespace())
    )]
    pub async fn create_service(&self, request: &ServiceRequest) -> Result<ContainerService, Error> {
        let workloads = self.builder.build(request)?;
        debug!(exposed = workloads.is_exposed(), "manifests built");
        let name = request.service_name.as_str();
        let client = &self.client;
        let retry = &self.config.retry;

        let mut exposed: Option<ResourceHandle> = None;
        if let Some(service) = &workloads.service {
            let handle = retry
                .run(Operation::CreateNetworkService, name, move || {
                    client.create_network_service(service)
                })
                .await?;
            info!(resource = %handle, "network-service created");
            exposed = Some(handle);
        }

        let deployment = &workloads.deployment;
        match retry
            .run(Operation::CreateWorkload, name, move || {
                client.create_workload(deployment)
            })
            .await
        {
            Ok(handle) => {
                info!(
                    resource = %handle,
                    replicas = request.replica_count,
                    gpus = request.gpu_count,
                    "workload created"
                );
            }
            Err(cause) => return Err(self.compensate(name, exposed, cause).await),
        }

        Ok(ContainerService::from_request(request))
    }

    /// Undo the network-service after the workload failed.
    ///
    /// Returns the error the caller should see.
    async fn compensate(&self, name: &str, exposed: Option<ResourceHandle>, cause: Error) -> Error {
        let Some(handle) = exposed else {
            return cause;
        };

        warn!(resource = %handle, error = %cause, "workload creation failed, removing network-service");
        let client = &self.client;
        let result = self
            .config
            .retry
            .run(Operation::DeleteNetworkService, name, move || {
                client.delete_network_service(name)
            })
            .await;

        match result {
            Ok(()) => cause,
            Err(e) if e.is_not_found() => cause,
            Err(compensation) => {
                warn!(resource = %handle, error = %compensation, "compensating delete failed");
                Error::PartiallyCreated {
                    service: name.to_string(),
                    created: vec![handle.to_string()],
                    cause: Box::new(cause),
                    compensation: Box::new(compensation),
                }
            }
        }
    }

    /// Delete the workload, then the network-service.
    ///
    /// Resources that are already gone count as deleted. Any other failure
    /// stops the sequence and is returned; nothing is rolled back.
    #[instrument(
        skip(self, service),
        fields(service = %service.id, namespace = %self.namespace())
    )]
    pub async fn destroy_service(&self, service: &ContainerService) -> Result<(), Error> {
        let name = service.id.as_str();
        let client = &self.client;
        let retry = &self.config.retry;

        match retry
            .run(Operation::DeleteWorkload, name, move || {
                client.delete_workload(name)
            })
            .await
        {
            Ok(()) => info!("workload deleted"),
            Err(e) if e.is_not_found() => warn!("workload already absent"),
            Err(e) => return Err(e),
        }

        match retry
            .run(Operation::DeleteNetworkService, name, move || {
                client.delete_network_service(name)
            })
            .await
        {
            Ok(()) => info!("network-service deleted"),
            Err(e) if e.is_not_found() => debug!("no network-service to delete"),
            Err(e) => return Err(e),
        }

        Ok(())
    }

    /// Make the live rule set under `rule_set.ingress_name` match `rule_set`.
    ///
    /// The live list is read first and never retried; its answer decides
    /// between create and replace.
    #[instrument(
        skip(self, rule_set),
        fields(ingress = %rule_set.ingress_name, namespace = %self.namespace())
    )]
    pub async fn update_ingress(&self, rule_set: &IngressRuleSet) -> Result<IngressChange, Error> {
        rule_set.validate()?;

        let desired = IngressPathBuilder::build(
            rule_set,
            self.namespace(),
            self.config.ingress_class.as_deref(),
        );

        let live = self.client.list_routing_rules().await?;
        debug!(live = live.len(), "listed routing rules");

        let plan = plan_update(&live, desired, self.config.ingress_mode);
        let name = rule_set.ingress_name.as_str();
        let manifest = &plan.manifest;
        let client = &self.client;
        let retry = &self.config.retry;

        let handle = match plan.change {
            IngressChange::Created => {
                retry
                    .run(Operation::CreateRoutingRule, name, move || {
                        client.create_routing_rule(manifest)
                    })
                    .await?
            }
            IngressChange::Replaced => {
                retry
                    .run(Operation::ReplaceRoutingRule, name, move || {
                        client.replace_routing_rule(name, manifest)
                    })
                    .await?
            }
        };

        info!(
            resource = %handle,
            change = %plan.change,
            paths = manifest.paths().count(),
            mode = %self.config.ingress_mode,
            "routing rules updated"
        );
        Ok(plan.change)
    }
}
