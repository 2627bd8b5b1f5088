//! Stories about creating and destroying container services end to end
//!
//! Each story drives the public `ContainerManager` against the in-memory
//! control plane in `common` and checks what was submitted and in what order.

mod common;

use std::time::Duration;

use berth_common::{Operation, RetryConfig, RetryPolicy};
use berth_service::{ContainerService, Error, ManagerConfig, ServiceRequest};
use common::InMemoryCluster;

// =============================================================================
// Story: Scenario A, a headless service
// =============================================================================

#[tokio::test]
async fn headless_service_creates_only_the_workload() {
    let cluster = InMemoryCluster::new();
    let manager = cluster.manager(ManagerConfig::default());

    let request = ServiceRequest::new("svc1", "img:1").with_replicas(2);
    let service = manager.create_service(&request).await.unwrap();

    assert_eq!(cluster.calls(), vec!["create_workload svc1"]);
    assert_eq!(service.exposed_port, None);

    let deployment = cluster.deployment("svc1").unwrap();
    assert_eq!(deployment.spec.replicas, 2);
    assert!(deployment.spec.template.spec.volumes.is_empty());
    assert!(deployment.spec.template.spec.containers[0].resources.is_none());
    assert!(cluster.service("svc1").is_none());
}

// =============================================================================
// Story: Scenario B, a published service
// =============================================================================

#[tokio::test]
async fn published_service_creates_node_port_then_workload() {
    let cluster = InMemoryCluster::new();
    let manager = cluster.manager(ManagerConfig::default());

    let request = ServiceRequest::new("svc1", "img:1").with_publish_port(30080, 8080);
    let service = manager.create_service(&request).await.unwrap();

    assert_eq!(
        cluster.calls(),
        vec!["create_network_service svc1", "create_workload svc1"]
    );
    assert_eq!(service.exposed_port, Some(30080));

    let svc = cluster.service("svc1").unwrap();
    let json = serde_json::to_value(&svc).unwrap();
    assert_eq!(json["spec"]["type"], "NodePort");
    assert_eq!(
        json["spec"]["ports"],
        serde_json::json!([{"port": 8080, "targetPort": 8080, "nodePort": 30080}])
    );
    assert_eq!(json["spec"]["selector"], serde_json::json!({"name": "svc1"}));
}

#[tokio::test]
async fn manifests_follow_the_client_namespace() {
    let cluster = InMemoryCluster::in_namespace("ml");
    let manager = cluster.manager(ManagerConfig::default());

    let request = ServiceRequest::new("svc1", "img:1").with_publish_port(30080, 8080);
    manager.create_service(&request).await.unwrap();

    assert_eq!(manager.namespace(), "ml");
    assert_eq!(cluster.deployment("svc1").unwrap().metadata.namespace, "ml");
    assert_eq!(cluster.service("svc1").unwrap().metadata.namespace, "ml");
}

// =============================================================================
// Story: Mounts map one-to-one onto generated volumes
// =============================================================================

#[tokio::test]
async fn every_mount_yields_one_named_volume() {
    let cluster = InMemoryCluster::new();
    let manager = cluster.manager(ManagerConfig::default());

    let mounts = [
        ("/data/raw", "/in"),
        ("/data/out", "/out"),
        ("/models", "/models"),
        ("/tmp/cache", "/cache"),
    ];
    let request = mounts
        .iter()
        .fold(ServiceRequest::new("trainer", "img:1"), |req, (host, container)| {
            req.with_mount(*host, *container)
        });
    manager.create_service(&request).await.unwrap();

    let deployment = cluster.deployment("trainer").unwrap();
    let pod = &deployment.spec.template.spec;
    let container_mounts = &pod.containers[0].volume_mounts;
    assert_eq!(pod.volumes.len(), mounts.len());
    assert_eq!(container_mounts.len(), mounts.len());

    for (i, (host, container)) in mounts.iter().enumerate() {
        let name = format!("v{}", i);
        assert_eq!(pod.volumes[i].name, name);
        assert_eq!(pod.volumes[i].host_path.path, *host);
        assert_eq!(container_mounts[i].name, name);
        assert_eq!(container_mounts[i].mount_path, *container);
    }
}

// =============================================================================
// Story: Transient workload failures are ridden out
// =============================================================================

#[tokio::test(start_paused = true)]
async fn transient_workload_failures_are_retried() {
    let cluster = InMemoryCluster::new();
    cluster.fail_workload_creates(3);
    let manager = cluster.manager(ManagerConfig::default());

    let start = tokio::time::Instant::now();
    manager
        .create_service(&ServiceRequest::new("svc1", "img:1"))
        .await
        .unwrap();

    let attempts = cluster
        .calls()
        .iter()
        .filter(|c| c.starts_with("create_workload"))
        .count();
    assert_eq!(attempts, 4);
    assert!(start.elapsed() >= Duration::from_secs(3));
    assert!(cluster.deployment("svc1").is_some());
}

#[tokio::test(start_paused = true)]
async fn exhausted_workload_rolls_back_the_network_service() {
    let cluster = InMemoryCluster::new();
    cluster.fail_workload_creates(100);
    let manager = cluster.manager(ManagerConfig::default());

    let request = ServiceRequest::new("svc1", "img:1").with_publish_port(30080, 8080);
    let err = manager.create_service(&request).await.unwrap_err();

    let calls = cluster.calls();
    assert_eq!(calls.first().map(String::as_str), Some("create_network_service svc1"));
    assert_eq!(
        calls.iter().filter(|c| c.starts_with("create_workload")).count(),
        6
    );
    assert_eq!(calls.last().map(String::as_str), Some("delete_network_service svc1"));

    assert!(matches!(
        err,
        Error::RemoteApi {
            operation: Operation::CreateWorkload,
            ..
        }
    ));
    assert!(cluster.is_empty());
}

#[tokio::test(start_paused = true)]
async fn custom_budget_bounds_attempts() {
    let cluster = InMemoryCluster::new();
    cluster.fail_workload_creates(100);
    let config = ManagerConfig {
        retry: RetryPolicy::default().with_config(RetryConfig {
            max_retries: 2,
            wait: Duration::from_millis(250),
        }),
        ..Default::default()
    };
    let manager = cluster.manager(config);

    let start = tokio::time::Instant::now();
    assert!(manager
        .create_service(&ServiceRequest::new("svc1", "img:1"))
        .await
        .is_err());

    assert_eq!(cluster.calls().len(), 3);
    assert!(start.elapsed() >= Duration::from_millis(500));
    assert!(start.elapsed() < Duration::from_millis(750));
}

// =============================================================================
// Story: Destroy tears down the pair and is safe to repeat
// =============================================================================

#[tokio::test]
async fn destroy_removes_workload_then_network_service() {
    let cluster = InMemoryCluster::new();
    let manager = cluster.manager(ManagerConfig::default());

    let request = ServiceRequest::new("svc1", "img:1").with_publish_port(30080, 8080);
    let service = manager.create_service(&request).await.unwrap();
    manager.destroy_service(&service).await.unwrap();

    let calls = cluster.calls();
    assert_eq!(
        &calls[2..],
        &["delete_workload svc1".to_string(), "delete_network_service svc1".to_string()]
    );
    assert!(cluster.is_empty());
}

#[tokio::test]
async fn destroy_twice_is_harmless() {
    let cluster = InMemoryCluster::new();
    let manager = cluster.manager(ManagerConfig::default());

    let service = manager
        .create_service(&ServiceRequest::new("svc1", "img:1"))
        .await
        .unwrap();
    manager.destroy_service(&service).await.unwrap();
    manager.destroy_service(&service).await.unwrap();
    manager
        .destroy_service(&ContainerService::named("never-created"))
        .await
        .unwrap();
}

#[tokio::test]
async fn creating_an_existing_service_conflicts() {
    let cluster = InMemoryCluster::new();
    let manager = cluster.manager(ManagerConfig {
        retry: RetryPolicy::disabled(),
        ..Default::default()
    });

    let request = ServiceRequest::new("svc1", "img:1");
    manager.create_service(&request).await.unwrap();
    let err = manager.create_service(&request).await.unwrap_err();

    match err {
        Error::RemoteApi { code, .. } => assert_eq!(code, Some(409)),
        other => panic!("Expected RemoteApi variant, got {:?}", other),
    }
}
