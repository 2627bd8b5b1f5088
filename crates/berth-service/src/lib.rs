//! Container service orchestration for berth
//!
//! Turns an abstract "run this image as a long-lived service" request into
//! cluster resources and submits them to the control plane:
//!
//! - **Workload**: Builds the Deployment and, when a port is published, the NodePort Service
//! - **Ingress**: Builds the routing rule set and decides create vs replace
//! - **Client**: Resource verbs against the control plane, behind a mockable trait
//! - **Manager**: The `create_service` / `destroy_service` / `update_ingress` facade

pub mod client;
pub mod ingress;
pub mod manager;
pub mod request;
pub mod workload;

pub use client::{ClusterClient, KubeClusterClient, ResourceHandle};
pub use ingress::{IngressChange, IngressPathBuilder, IngressUpdateMode, RoutingRuleEntry};
pub use manager::{ContainerManager, ManagerConfig};
pub use request::{
    ContainerService, HostMount, IngressRuleSet, PathRule, PublishPort, ServiceInfo,
    ServiceRequest,
};
pub use workload::{GeneratedWorkloads, ServiceSpecBuilder};

pub use berth_common::Error;
