//! Contract tests for ClusterClient.
//!
//! These tests verify the behavioral contract of the cluster trait using the
//! in-memory fake. Any conforming implementation must pass these.

use std::collections::BTreeMap;
use std::path::PathBuf;

use kubegrade_cluster::fakes::{pending_pod, ready_pod, FakeCluster};
use kubegrade_cluster::*;

fn document(kind: ResourceKind, name: &str, yaml_body: &str) -> ResourceDocument {
    ResourceDocument {
        kind,
        api_version: Some("v1".to_string()),
        name: name.to_string(),
        namespace: "default".to_string(),
        body: serde_yaml::from_str(yaml_body).unwrap(),
        source: DocumentSource {
            path: PathBuf::from("manifests.yaml"),
            index: 0,
        },
    }
}

fn config_map(value: &str) -> ResourceDocument {
    document(
        ResourceKind::ConfigMap,
        "app-config",
        &format!("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: app-config\ndata:\n  LOG_LEVEL: {value}\n"),
    )
}

fn selector(app: &str) -> LabelSelector {
    LabelSelector::new(BTreeMap::from([("app".to_string(), app.to_string())]))
}

// ===========================================================================
// apply
// ===========================================================================

#[tokio::test]
async fn apply_creates_then_is_idempotent() {
    let cluster = FakeCluster::new();
    let doc = config_map("INFO");

    let first = cluster.apply(&doc).await.unwrap();
    let second = cluster.apply(&doc).await.unwrap();

    assert_eq!(first.action, ApplyAction::Created);
    assert_eq!(second.action, ApplyAction::Unchanged);
    assert_eq!(second.reference, doc.reference());
}

#[tokio::test]
async fn apply_changed_document_is_configured() {
    let cluster = FakeCluster::new();
    cluster.apply(&config_map("INFO")).await.unwrap();
    let applied = cluster.apply(&config_map("DEBUG")).await.unwrap();

    assert_eq!(applied.action, ApplyAction::Configured);
}

#[tokio::test]
async fn apply_rejected_document_is_not_retryable() {
    let cluster = FakeCluster::new().reject("app-config", "data must be a map");
    let err = cluster.apply(&config_map("INFO")).await.unwrap_err();

    assert!(matches!(err, ClusterError::Invalid { .. }));
    assert!(!err.is_retryable());
    assert!(cluster.applied().is_empty());
}

#[tokio::test]
async fn apply_transient_failures_clear_after_scripted_count() {
    let cluster = FakeCluster::new()
        .fail_next_applies(ClusterError::Connectivity("connection refused".to_string()), 2);
    let doc = config_map("INFO");

    assert!(cluster.apply(&doc).await.unwrap_err().is_retryable());
    assert!(cluster.apply(&doc).await.unwrap_err().is_retryable());
    assert_eq!(cluster.apply(&doc).await.unwrap().action, ApplyAction::Created);
}

// ===========================================================================
// get / delete
// ===========================================================================

#[tokio::test]
async fn get_returns_applied_body() {
    let cluster = FakeCluster::new();
    cluster.apply(&config_map("INFO")).await.unwrap();

    let state = cluster
        .get(&ResourceKind::ConfigMap, "default", "app-config")
        .await
        .unwrap();
    assert_eq!(state.body["data"]["LOG_LEVEL"], "INFO");
    assert_eq!(state.body["metadata"]["namespace"], "default");
}

#[tokio::test]
async fn get_missing_is_not_found() {
    let cluster = FakeCluster::new();
    let err = cluster
        .get(&ResourceKind::Service, "default", "web")
        .await
        .unwrap_err();

    assert!(matches!(err, ClusterError::NotFound(_)));
}

#[tokio::test]
async fn delete_removes_and_second_delete_is_not_found() {
    let cluster = FakeCluster::new();
    let doc = config_map("INFO");
    cluster.apply(&doc).await.unwrap();

    cluster
        .delete(&ResourceKind::ConfigMap, "default", "app-config")
        .await
        .unwrap();
    assert!(!cluster.contains(&doc.reference()));

    let err = cluster
        .delete(&ResourceKind::ConfigMap, "default", "app-config")
        .await
        .unwrap_err();
    assert!(matches!(err, ClusterError::NotFound(_)));
}

// ===========================================================================
// list_pods
// ===========================================================================

#[tokio::test]
async fn list_pods_filters_by_selector() {
    let cluster = FakeCluster::new().with_pod_frames(vec![vec![
        ready_pod("web-1", &[("app", "web")]),
        ready_pod("db-1", &[("app", "db")]),
    ]]);

    let pods = cluster.list_pods("default", &selector("web")).await.unwrap();
    assert_eq!(pods.len(), 1);
    assert_eq!(pods[0].name, "web-1");
}

#[tokio::test]
async fn list_pods_replays_frames_and_repeats_last() {
    let cluster = FakeCluster::new().with_pod_frames(vec![
        vec![pending_pod("web-1", &[("app", "web")])],
        vec![ready_pod("web-1", &[("app", "web")])],
    ]);

    let first = cluster.list_pods("default", &selector("web")).await.unwrap();
    let second = cluster.list_pods("default", &selector("web")).await.unwrap();
    let third = cluster.list_pods("default", &selector("web")).await.unwrap();

    assert!(!first[0].ready);
    assert!(second[0].ready);
    assert!(third[0].ready);
    assert_eq!(cluster.list_calls(), 3);
}

#[tokio::test]
async fn list_pods_failure_is_surfaced() {
    let cluster =
        FakeCluster::new().fail_list_pods(ClusterError::Connectivity("EOF".to_string()));
    let err = cluster
        .list_pods("default", &selector("web"))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
}
