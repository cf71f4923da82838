//! End-to-end reconciliation scenarios: a real Git working tree, a fake
//! cluster, and the in-memory store, driven pass by pass.

mod common;

use std::time::Duration;

use common::{deployment_manifest, live_deployment, Harness};
use driftguard::db::drift_repo;
use driftguard::model::{ChangeType, DriftStatus, Severity};

const APP_ID: &str = "Deployment:prod:app";

#[tokio::test]
async fn test_first_observation_without_drift() {
    let harness = Harness::new(&["prod"], &["deployments"]).await;
    harness
        .origin
        .commit_file("apps/app.yaml", &deployment_manifest("prod", "app", 2, "nginx:1.23"));
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![live_deployment("prod", "app", 2, "nginx:1.23")],
    );

    harness.controller.run_analysis_pass().await;

    let record = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .expect("record created on first observation");
    assert_eq!(record.drift_status, DriftStatus::None);
    assert!(!record.drift_detected);
    assert!(record.drift_details.is_empty());
    assert!(record.first_detected.is_none());
    assert!(record.resolved_at.is_none());
    assert!(record.desired_state.is_some());
    assert!(record
        .last_known_good_hash
        .as_deref()
        .unwrap()
        .starts_with("sha256:"));
}

#[tokio::test]
async fn test_full_drift_lifecycle() {
    let harness = Harness::new(&["prod"], &["deployments"]).await;
    harness
        .origin
        .commit_file("apps/app.yaml", &deployment_manifest("prod", "app", 2, "nginx:1.23"));

    // Scenario 1: live matches Git.
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![live_deployment("prod", "app", 2, "nginx:1.23")],
    );
    harness.controller.run_analysis_pass().await;

    // Scenario 2: scale-up induces drift; 3 vs declared 2 is a 50% delta.
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![live_deployment("prod", "app", 3, "nginx:1.23")],
    );
    harness.controller.run_analysis_pass().await;

    let record = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();
    assert_eq!(record.drift_status, DriftStatus::Active);
    assert!(record.drift_detected);
    assert_eq!(record.drift_details.len(), 1);
    let change = &record.drift_details[0];
    assert_eq!(change.field, "spec.replicas");
    assert_eq!(change.from, serde_json::json!(3));
    assert_eq!(change.to, serde_json::json!(2));
    assert_eq!(change.change_type, ChangeType::Scaling);
    assert_eq!(change.severity, Severity::High);
    let t1 = record.first_detected.expect("episode start stamped");

    // Scenario 3: drift persists and the image also diverges.
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![live_deployment("prod", "app", 3, "nginx:1.24")],
    );
    harness.controller.run_analysis_pass().await;

    let record = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();
    assert_eq!(record.drift_status, DriftStatus::Active);
    assert_eq!(record.first_detected, Some(t1));
    assert_eq!(record.drift_details.len(), 2);
    // Desired-tree order: replicas before the nested image field.
    assert_eq!(record.drift_details[0].field, "spec.replicas");
    assert_eq!(
        record.drift_details[1].field,
        "spec.template.spec.containers[0].image"
    );
    assert_eq!(record.drift_details[1].change_type, ChangeType::VersionChange);
    assert_eq!(record.drift_details[1].severity, Severity::High);

    // Scenario 4: live reverts; drift resolves.
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![live_deployment("prod", "app", 2, "nginx:1.23")],
    );
    harness.controller.run_analysis_pass().await;

    let record = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();
    assert_eq!(record.drift_status, DriftStatus::Resolved);
    assert!(!record.drift_detected);
    assert_eq!(record.first_detected, Some(t1));
    let t2 = record.resolved_at.expect("resolution stamped");
    assert!(t2 > t1);
    assert_eq!(
        record.resolution_message.as_deref(),
        Some("Drift resolved. Configuration now matches Git.")
    );
    // The episode's change list survives resolution.
    assert_eq!(record.drift_details.len(), 2);

    // Scenario 5: drift re-enters; a new episode begins.
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![live_deployment("prod", "app", 4, "nginx:1.23")],
    );
    harness.controller.run_analysis_pass().await;

    let record = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();
    assert_eq!(record.drift_status, DriftStatus::Active);
    let t3 = record.first_detected.unwrap();
    assert!(t3 > t1);
    // The previous resolution remains recorded history.
    assert_eq!(record.resolved_at, Some(t2));
}

#[tokio::test]
async fn test_undeclared_resource_is_not_drift() {
    let harness = Harness::new(&["prod"], &["configmaps"]).await;
    harness.cluster.set_resources(
        "prod",
        "configmaps",
        vec![serde_json::json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "cluster-defaults", "namespace": "prod"},
            "data": {"injected": "true"}
        })],
    );

    harness.controller.run_analysis_pass().await;

    let record = drift_repo::find_by_resource_id(&harness.db, "ConfigMap:prod:cluster-defaults")
        .unwrap()
        .unwrap();
    assert_eq!(record.drift_status, DriftStatus::None);
    assert!(!record.drift_detected);
    assert!(record.desired_state.is_none());
    assert!(record.last_known_good_hash.is_none());
    assert!(record.live_state.get("data").is_some());
}

#[tokio::test]
async fn test_rerun_without_changes_only_touches_last_updated() {
    let harness = Harness::new(&["prod"], &["deployments"]).await;
    harness
        .origin
        .commit_file("apps/app.yaml", &deployment_manifest("prod", "app", 2, "nginx:1.23"));
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![live_deployment("prod", "app", 2, "nginx:1.23")],
    );

    harness.controller.run_analysis_pass().await;
    let first = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    harness.controller.run_analysis_pass().await;
    let second = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.drift_status, first.drift_status);
    assert_eq!(second.drift_details, first.drift_details);
    assert_eq!(second.last_known_good_hash, first.last_known_good_hash);
    assert_eq!(second.first_detected, first.first_detected);
    assert_eq!(second.resolved_at, first.resolved_at);
    assert!(second.last_updated > first.last_updated);
}

#[tokio::test]
async fn test_git_side_change_is_picked_up_by_next_pass() {
    let harness = Harness::new(&["prod"], &["deployments"]).await;
    harness
        .origin
        .commit_file("apps/app.yaml", &deployment_manifest("prod", "app", 2, "nginx:1.23"));
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![live_deployment("prod", "app", 2, "nginx:1.23")],
    );

    harness.controller.run_analysis_pass().await;
    let record = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();
    assert_eq!(record.drift_status, DriftStatus::None);

    // Git now declares 5 replicas; the unchanged live state of 2 drifts.
    harness
        .origin
        .commit_file("apps/app.yaml", &deployment_manifest("prod", "app", 5, "nginx:1.23"));
    harness.controller.run_analysis_pass().await;

    let record = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();
    assert_eq!(record.drift_status, DriftStatus::Active);
    assert_eq!(record.drift_details[0].from, serde_json::json!(2));
    assert_eq!(record.drift_details[0].to, serde_json::json!(5));
    // |2 - 5| / 5 = 60%.
    assert_eq!(record.drift_details[0].severity, Severity::High);
}

#[tokio::test]
async fn test_malformed_live_resource_is_skipped() {
    let harness = Harness::new(&["prod"], &["deployments"]).await;
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![
            serde_json::json!({"apiVersion": "apps/v1", "kind": "Deployment"}),
            serde_json::json!({"apiVersion": "apps/v1", "kind": "Deployment", "metadata": {}}),
            live_deployment("prod", "valid", 1, "nginx:1.23"),
        ],
    );

    harness.controller.run_analysis_pass().await;

    let (_, total) = drift_repo::query(&harness.db, &Default::default()).unwrap();
    assert_eq!(total, 1);
    assert!(drift_repo::find_by_resource_id(&harness.db, "Deployment:prod:valid")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_listing_failure_skips_pair_but_continues_pass() {
    let harness = Harness::new(&["prod", "staging"], &["deployments"]).await;
    harness.cluster.fail_listing("prod", "deployments");
    harness.cluster.set_resources(
        "staging",
        "deployments",
        vec![live_deployment("staging", "web", 1, "nginx:1.23")],
    );

    harness.controller.run_analysis_pass().await;

    // The failing pair produced nothing, the healthy pair was evaluated.
    assert!(drift_repo::find_by_resource_id(&harness.db, "Deployment:staging:web")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_empty_namespace_config_uses_cluster_enumeration() {
    // No namespaces configured: the pass asks the cluster instead.
    let harness = Harness::new(&[], &["deployments"]).await;
    harness.cluster.set_namespaces(&["discovered"]);
    harness.cluster.set_resources(
        "discovered",
        "deployments",
        vec![live_deployment("discovered", "app", 1, "nginx:1.23")],
    );

    harness.controller.run_analysis_pass().await;

    assert!(
        drift_repo::find_by_resource_id(&harness.db, "Deployment:discovered:app")
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_unknown_kind_token_passes_through() {
    let harness = Harness::new(&["prod"], &["widgets"]).await;
    harness.cluster.set_resources(
        "prod",
        "widgets",
        vec![serde_json::json!({
            "apiVersion": "example.com/v1",
            "kind": "widgets",
            "metadata": {"name": "w1", "namespace": "prod"}
        })],
    );

    harness.controller.run_analysis_pass().await;

    // The token is not in the normalisation table, so the identity uses it
    // verbatim.
    assert!(drift_repo::find_by_resource_id(&harness.db, "widgets:prod:w1")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_start_trigger_stop() {
    let harness = Harness::new(&["prod"], &["deployments"]).await;
    harness
        .origin
        .commit_file("apps/app.yaml", &deployment_manifest("prod", "app", 2, "nginx:1.23"));
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![live_deployment("prod", "app", 2, "nginx:1.23")],
    );

    harness.controller.clone().start().await.unwrap();
    // Starting twice is a warning, not an error.
    harness.controller.clone().start().await.unwrap();

    harness.controller.trigger_manual_analysis();

    // Wait for the triggered pass to land a record.
    let mut found = false;
    for _ in 0..100 {
        if drift_repo::find_by_resource_id(&harness.db, APP_ID)
            .unwrap()
            .is_some()
        {
            found = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(found, "triggered pass did not produce a record");

    harness.controller.stop().await;
    // Stopping twice is a warning, not an error.
    harness.controller.stop().await;

    // No further writes after stop.
    let before = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let after = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();
    assert_eq!(before.last_updated, after.last_updated);
}

#[tokio::test]
async fn test_resource_removed_from_git_resolves_like_match() {
    // A resource whose manifest disappears from Git becomes undeclared:
    // no longer drifted, so an active episode resolves.
    let harness = Harness::new(&["prod"], &["deployments"]).await;
    harness
        .origin
        .commit_file("apps/app.yaml", &deployment_manifest("prod", "app", 2, "nginx:1.23"));
    harness.cluster.set_resources(
        "prod",
        "deployments",
        vec![live_deployment("prod", "app", 3, "nginx:1.23")],
    );

    harness.controller.run_analysis_pass().await;
    let record = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();
    assert_eq!(record.drift_status, DriftStatus::Active);

    harness.origin.remove_file("apps/app.yaml");
    harness.controller.run_analysis_pass().await;

    let record = drift_repo::find_by_resource_id(&harness.db, APP_ID)
        .unwrap()
        .unwrap();
    assert_eq!(record.drift_status, DriftStatus::Resolved);
    assert!(record.desired_state.is_none());
    assert!(record.last_known_good_hash.is_none());
}
