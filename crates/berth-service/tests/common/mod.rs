//! In-memory control plane for driving the manager without a cluster
//!
//! Stores submitted manifests by name, records every verb in call order,
//! and answers with the same status codes the API server would: 409 for a
//! duplicate create, 404 for a delete or replace of a missing object.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use berth_common::Operation;
use berth_service::client::{ClusterClient, ResourceHandle};
use berth_service::ingress::{Ingress, RoutingRuleEntry};
use berth_service::workload::{Deployment, Service};
use berth_service::{ContainerManager, Error, ManagerConfig};

#[derive(Default)]
struct State {
    deployments: BTreeMap<String, Deployment>,
    services: BTreeMap<String, Service>,
    ingresses: BTreeMap<String, Ingress>,
    calls: Vec<String>,
    workload_failures: u32,
    list_status: Option<u16>,
    list_unreachable: bool,
}

/// Recording, in-memory [`ClusterClient`]
#[derive(Clone)]
pub struct InMemoryCluster {
    namespace: String,
    state: Arc<Mutex<State>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::in_namespace("default")
    }

    pub fn in_namespace(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Manager over this cluster with the given config
    pub fn manager(&self, config: ManagerConfig) -> ContainerManager {
        ContainerManager::new(Arc::new(self.clone()), config)
    }

    /// Fail the next `n` workload creates with a 503
    pub fn fail_workload_creates(&self, n: u32) {
        self.state().workload_failures = n;
    }

    /// Answer every routing rule listing with a non-success status
    pub fn fail_listing_with_status(&self, code: u16) {
        self.state().list_status = Some(code);
    }

    /// Fail every routing rule listing before any answer arrives
    pub fn fail_listing_unreachable(&self) {
        self.state().list_unreachable = true;
    }

    /// Seed a routing rule set as if another tool created it
    pub fn seed_ingress(&self, ingress: Ingress) {
        self.state()
            .ingresses
            .insert(ingress.metadata.name.clone(), ingress);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn deployment(&self, name: &str) -> Option<Deployment> {
        self.state().deployments.get(name).cloned()
    }

    pub fn service(&self, name: &str) -> Option<Service> {
        self.state().services.get(name).cloned()
    }

    pub fn ingress(&self, name: &str) -> Option<Ingress> {
        self.state().ingresses.get(name).cloned()
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state();
        state.deployments.is_empty() && state.services.is_empty()
    }
}

fn insert_new<T: Clone>(
    map: &mut BTreeMap<String, T>,
    operation: Operation,
    kind: &str,
    name: &str,
    manifest: &T,
) -> Result<ResourceHandle, Error> {
    if map.contains_key(name) {
        return Err(Error::remote_api_status(operation, name, 409, "already exists"));
    }
    map.insert(name.to_string(), manifest.clone());
    Ok(ResourceHandle::new(kind, name))
}

fn remove_existing<T>(
    map: &mut BTreeMap<String, T>,
    operation: Operation,
    name: &str,
) -> Result<(), Error> {
    match map.remove(name) {
        Some(_) => Ok(()),
        None => Err(Error::remote_api_status(operation, name, 404, "not found")),
    }
}

#[async_trait]
impl ClusterClient for InMemoryCluster {
    fn namespace(&self) -> String {
        self.namespace.clone()
    }

    async fn create_workload(&self, manifest: &Deployment) -> Result<ResourceHandle, Error> {
        let mut state = self.state();
        let name = manifest.metadata.name.clone();
        state.calls.push(format!("create_workload {}", name));
        if state.workload_failures > 0 {
            state.workload_failures -= 1;
            return Err(Error::remote_api_status(
                Operation::CreateWorkload,
                name,
                503,
                "etcd unavailable",
            ));
        }
        insert_new(
            &mut state.deployments,
            Operation::CreateWorkload,
            "Deployment",
            &name,
            manifest,
        )
    }

    async fn delete_workload(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push(format!("delete_workload {}", name));
        remove_existing(&mut state.deployments, Operation::DeleteWorkload, name)
    }

    async fn create_network_service(&self, manifest: &Service) -> Result<ResourceHandle, Error> {
        let mut state = self.state();
        let name = manifest.metadata.name.clone();
        state.calls.push(format!("create_network_service {}", name));
        insert_new(
            &mut state.services,
            Operation::CreateNetworkService,
            "Service",
            &name,
            manifest,
        )
    }

    async fn delete_network_service(&self, name: &str) -> Result<(), Error> {
        let mut state = self.state();
        state.calls.push(format!("delete_network_service {}", name));
        remove_existing(&mut state.services, Operation::DeleteNetworkService, name)
    }

    async fn list_routing_rules(&self) -> Result<Vec<RoutingRuleEntry>, Error> {
        let mut state = self.state();
        state.calls.push("list_routing_rules".to_string());
        if let Some(code) = state.list_status {
            return Err(Error::ServiceRequest {
                namespace: self.namespace.clone(),
                code,
                message: "listing refused".to_string(),
            });
        }
        if state.list_unreachable {
            return Err(Error::RoutingQuery {
                namespace: self.namespace.clone(),
                message: "connection refused".to_string(),
            });
        }
        Ok(state
            .ingresses
            .iter()
            .map(|(name, ingress)| RoutingRuleEntry {
                name: name.clone(),
                manifest: Some(ingress.clone()),
            })
            .collect())
    }

    async fn create_routing_rule(&self, manifest: &Ingress) -> Result<ResourceHandle, Error> {
        let mut state = self.state();
        let name = manifest.metadata.name.clone();
        state.calls.push(format!("create_routing_rule {}", name));
        insert_new(
            &mut state.ingresses,
            Operation::CreateRoutingRule,
            "Ingress",
            &name,
            manifest,
        )
    }

    async fn replace_routing_rule(
        &self,
        name: &str,
        manifest: &Ingress,
    ) -> Result<ResourceHandle, Error> {
        let mut state = self.state();
        state.calls.push(format!("replace_routing_rule {}", name));
        match state.ingresses.get_mut(name) {
            Some(existing) => {
                *existing = manifest.clone();
                Ok(ResourceHandle::new("Ingress", name))
            }
            None => Err(Error::remote_api_status(
                Operation::ReplaceRoutingRule,
                name,
                404,
                "not found",
            )),
        }
    }
}
