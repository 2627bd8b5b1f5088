//! Stories about reconciling routing rule sets against the live cluster

mod common;

use berth_common::kube_utils::ObjectMeta;
use berth_service::ingress::IngressPathBuilder;
use berth_service::{
    Error, IngressChange, IngressRuleSet, IngressUpdateMode, ManagerConfig,
};
use common::InMemoryCluster;

fn live_paths(cluster: &InMemoryCluster, name: &str) -> Vec<(String, String)> {
    cluster
        .ingress(name)
        .unwrap()
        .paths()
        .map(|p| {
            let backend = p.backend.service.as_ref().unwrap();
            (p.path.clone().unwrap_or_default(), backend.name.clone())
        })
        .collect()
}

fn pair(path: &str, backend: &str) -> (String, String) {
    (path.to_string(), backend.to_string())
}

// =============================================================================
// Story: Scenario C, create then replace
// =============================================================================

#[tokio::test]
async fn first_update_creates_second_replaces() {
    let cluster = InMemoryCluster::new();
    let manager = cluster.manager(ManagerConfig::default());
    let rules = IngressRuleSet::new("ing1").with_path("/api", "svc1", 8080);

    assert_eq!(
        manager.update_ingress(&rules).await.unwrap(),
        IngressChange::Created
    );
    assert_eq!(
        manager.update_ingress(&rules).await.unwrap(),
        IngressChange::Replaced
    );

    assert_eq!(
        cluster.calls(),
        vec![
            "list_routing_rules",
            "create_routing_rule ing1",
            "list_routing_rules",
            "replace_routing_rule ing1",
        ]
    );
}

#[tokio::test]
async fn repeated_identical_updates_are_idempotent() {
    let cluster = InMemoryCluster::new();
    let manager = cluster.manager(ManagerConfig::default());
    let rules = IngressRuleSet::new("ing1")
        .with_path("/api", "svc1", 8080)
        .with_path("/", "web", 80);

    manager.update_ingress(&rules).await.unwrap();
    let first = cluster.ingress("ing1").unwrap();
    manager.update_ingress(&rules).await.unwrap();
    let second = cluster.ingress("ing1").unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn dotted_rule_set_name_is_replaced_in_place() {
    let cluster = InMemoryCluster::new();
    cluster.seed_ingress(IngressPathBuilder::build(
        &IngressRuleSet::new("api.example").with_path("/", "legacy", 80),
        "default",
        None,
    ));
    let manager = cluster.manager(ManagerConfig::default());

    let change = manager
        .update_ingress(&IngressRuleSet::new("api.example").with_path("/", "web", 80))
        .await
        .unwrap();

    assert_eq!(change, IngressChange::Replaced);
    assert_eq!(live_paths(&cluster, "api.example"), vec![pair("/", "web")]);
}

#[tokio::test]
async fn replace_drops_paths_not_in_the_new_set() {
    let cluster = InMemoryCluster::new();
    let manager = cluster.manager(ManagerConfig::default());

    manager
        .update_ingress(
            &IngressRuleSet::new("ing1")
                .with_path("/api", "svc1", 8080)
                .with_path("/old", "legacy", 80),
        )
        .await
        .unwrap();
    manager
        .update_ingress(&IngressRuleSet::new("ing1").with_path("/api", "svc2", 8080))
        .await
        .unwrap();

    assert_eq!(live_paths(&cluster, "ing1"), vec![pair("/api", "svc2")]);
}

// =============================================================================
// Story: Merge mode preserves paths owned by other tenants
// =============================================================================

#[tokio::test]
async fn merge_mode_keeps_foreign_paths() {
    let cluster = InMemoryCluster::new();
    cluster.seed_ingress(IngressPathBuilder::build(
        &IngressRuleSet::new("shared")
            .with_path("/team-a", "svc-a", 80)
            .with_path("/api", "stale", 80),
        "default",
        None,
    ));
    let manager = cluster.manager(ManagerConfig {
        ingress_mode: IngressUpdateMode::MergeByPath,
        ..Default::default()
    });

    let change = manager
        .update_ingress(&IngressRuleSet::new("shared").with_path("/api", "svc1", 8080))
        .await
        .unwrap();

    assert_eq!(change, IngressChange::Replaced);
    assert_eq!(
        live_paths(&cluster, "shared"),
        vec![pair("/api", "svc1"), pair("/team-a", "svc-a")]
    );
}

#[tokio::test]
async fn unrelated_rule_sets_are_untouched() {
    let cluster = InMemoryCluster::new();
    let mut other = IngressPathBuilder::build(
        &IngressRuleSet::new("other").with_path("/x", "svc-x", 80),
        "default",
        None,
    );
    other.metadata = ObjectMeta::new("other", "default").with_label("team", "x");
    cluster.seed_ingress(other.clone());
    let manager = cluster.manager(ManagerConfig::default());

    manager
        .update_ingress(&IngressRuleSet::new("ing1").with_path("/", "web", 80))
        .await
        .unwrap();

    assert_eq!(cluster.ingress("other"), Some(other));
}

// =============================================================================
// Story: A failed listing issues no write
// =============================================================================

#[tokio::test]
async fn refused_listing_fails_without_writing() {
    let cluster = InMemoryCluster::new();
    cluster.fail_listing_with_status(500);
    let manager = cluster.manager(ManagerConfig::default());

    let err = manager
        .update_ingress(&IngressRuleSet::new("ing1").with_path("/", "web", 80))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ServiceRequest { code: 500, .. }));
    assert_eq!(cluster.calls(), vec!["list_routing_rules"]);
    assert!(cluster.ingress("ing1").is_none());
}

#[tokio::test]
async fn unreachable_listing_fails_without_writing() {
    let cluster = InMemoryCluster::new();
    cluster.fail_listing_unreachable();
    let manager = cluster.manager(ManagerConfig::default());

    let err = manager
        .update_ingress(&IngressRuleSet::new("ing1").with_path("/", "web", 80))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::RoutingQuery { .. }));
    assert_eq!(cluster.calls(), vec!["list_routing_rules"]);
}
