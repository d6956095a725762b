//! End-to-end reconciliation tests against the in-memory fake cluster.
//!
//! These drive the public engine API the way an orchestrator would: build a
//! desired topology, hand over a channel, and inspect what went over it.

use std::time::Duration;

use shoal_core::{ReplicaSetPatch, ShoalError, Warnings};
use shoal_engine::{reconcile, run, ReconcileConfig};
use shoal_testing::{desired_instance, desired_replicaset, desired_topology, FakeCluster};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

#[tokio::test]
async fn test_bootstrap_joins_in_priority_order_without_second_batch() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_unjoined("leader", "leader:3301")
        .with_unjoined("replica", "replica:3301");
    let desired = desired_topology(
        vec![desired_instance("leader"), desired_instance("replica")],
        vec![desired_replicaset("r1", &["leader", "replica"])],
    );
    let mut warnings = Warnings::new();

    let changed = reconcile(
        &mut cluster,
        &desired,
        &ReconcileConfig::default(),
        &mut warnings,
    )
    .await
    .unwrap();

    assert!(changed);
    assert!(warnings.is_empty());

    // One create patch joining in priority order; the second batch has
    // nothing to do because the join order already encodes the priority.
    assert_eq!(cluster.count_calls("edit_topology"), 1);
    assert_eq!(cluster.patches.len(), 1);
    match &cluster.patches[0].replicasets[0] {
        ReplicaSetPatch::Create { alias, join, .. } => {
            assert_eq!(alias, "r1");
            assert_eq!(join, &["leader:3301", "replica:3301"]);
        }
        other => panic!("expected a create patch, got {:?}", other),
    }
    assert_eq!(cluster.members_of("r1"), ["leader", "replica"]);
    assert_eq!(cluster.leader_of("r1").as_deref(), Some("leader"));

    // The batch was followed by a convergence wait.
    assert!(cluster.count_calls("is_healthy") >= 1);
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_unjoined("a", "a:3301")
        .with_unjoined("b", "b:3301");
    let desired = desired_topology(
        vec![desired_instance("a"), desired_instance("b")],
        vec![desired_replicaset("r1", &["a", "b"])],
    );
    let config = ReconcileConfig::default();

    let mut warnings = Warnings::new();
    let changed = reconcile(&mut cluster, &desired, &config, &mut warnings)
        .await
        .unwrap();
    assert!(changed);
    let edits_after_first = cluster.count_calls("edit_topology");

    let mut warnings = Warnings::new();
    let changed = reconcile(&mut cluster, &desired, &config, &mut warnings)
        .await
        .unwrap();
    assert!(!changed);
    assert!(warnings.is_empty());
    assert_eq!(cluster.count_calls("edit_topology"), edits_after_first);
}

#[tokio::test]
async fn test_added_member_joins_then_gets_priority() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_joined_replicaset("r2", &[("a", "a:3301"), ("b", "b:3301")])
        .with_unjoined("c", "c:3301");
    let mut r2 = desired_replicaset("r2", &["a", "b", "c"]);
    r2.failover_priority = Some(vec!["c".into(), "a".into(), "b".into()]);
    let desired = desired_topology(
        vec![
            desired_instance("a"),
            desired_instance("b"),
            desired_instance("c"),
        ],
        vec![r2],
    );
    let mut warnings = Warnings::new();

    let changed = reconcile(
        &mut cluster,
        &desired,
        &ReconcileConfig::default(),
        &mut warnings,
    )
    .await
    .unwrap();
    assert!(changed);

    // First batch joins c, second batch rewrites the priority in uuids.
    assert_eq!(cluster.patches.len(), 2);
    match &cluster.patches[0].replicasets[0] {
        ReplicaSetPatch::Edit {
            join,
            failover_priority,
            ..
        } => {
            assert_eq!(join, &["c:3301"]);
            assert!(failover_priority.is_none());
        }
        other => panic!("expected an edit patch, got {:?}", other),
    }
    let (a, b, c) = (
        cluster.server_uuid("a").unwrap(),
        cluster.server_uuid("b").unwrap(),
        cluster.server_uuid("c").unwrap(),
    );
    match &cluster.patches[1].replicasets[0] {
        ReplicaSetPatch::Edit {
            failover_priority: Some(order),
            join,
            ..
        } => {
            assert_eq!(order, &[c, a, b]);
            assert!(join.is_empty());
        }
        other => panic!("expected a priority patch, got {:?}", other),
    }
    assert_eq!(cluster.members_of("r2"), ["c", "a", "b"]);
}

#[tokio::test]
async fn test_zone_of_a_joined_instance_is_configured_in_the_second_batch() {
    init_tracing();

    // The instance only obtains a uuid through the first batch's join, so
    // its zone cannot be patched before the second batch.
    let mut cluster = FakeCluster::new().with_unjoined("a", "a:3301");
    let mut zoned = desired_instance("a");
    zoned.zone = Some("z-1".into());
    let desired = desired_topology(vec![zoned], vec![desired_replicaset("r1", &["a"])]);
    let mut warnings = Warnings::new();

    let changed = reconcile(
        &mut cluster,
        &desired,
        &ReconcileConfig::default(),
        &mut warnings,
    )
    .await
    .unwrap();

    assert!(changed);
    assert_eq!(cluster.patches.len(), 2);
    assert!(cluster.patches[0].servers.is_empty());
    let server_patch = &cluster.patches[1].servers[0];
    assert_eq!(server_patch.zone.as_deref(), Some("z-1"));
    assert_eq!(Some(server_patch.uuid), cluster.server_uuid("a"));

    // The zone is settled now; a second run has nothing left to do.
    let mut warnings = Warnings::new();
    let changed = reconcile(
        &mut cluster,
        &desired,
        &ReconcileConfig::default(),
        &mut warnings,
    )
    .await
    .unwrap();
    assert!(!changed);
}

#[tokio::test]
async fn test_unchanged_topology_sends_nothing() {
    init_tracing();

    let mut cluster =
        FakeCluster::new().with_joined_replicaset("r1", &[("a", "a:3301"), ("b", "b:3301")]);
    let desired = desired_topology(
        vec![desired_instance("a"), desired_instance("b")],
        vec![desired_replicaset("r1", &["a", "b"])],
    );
    let mut warnings = Warnings::new();

    let changed = reconcile(
        &mut cluster,
        &desired,
        &ReconcileConfig::default(),
        &mut warnings,
    )
    .await
    .unwrap();

    assert!(!changed);
    assert_eq!(cluster.count_calls("edit_topology"), 0);
    assert_eq!(cluster.count_calls("is_healthy"), 0);
}

#[tokio::test]
async fn test_expelled_instance_is_removed() {
    init_tracing();

    let mut cluster =
        FakeCluster::new().with_joined_replicaset("r1", &[("a", "a:3301"), ("b", "b:3301")]);
    let mut expelled = desired_instance("b");
    expelled.expelled = true;
    let desired = desired_topology(
        vec![desired_instance("a"), expelled],
        vec![desired_replicaset("r1", &["a"])],
    );
    let mut warnings = Warnings::new();

    let changed = reconcile(
        &mut cluster,
        &desired,
        &ReconcileConfig::default(),
        &mut warnings,
    )
    .await
    .unwrap();

    assert!(changed);
    assert_eq!(cluster.members_of("r1"), ["a"]);
    assert!(cluster.server_uuid("b").is_none());

    // Expelling an unknown instance is not an error and not a change.
    let mut warnings = Warnings::new();
    let changed = reconcile(
        &mut cluster,
        &desired,
        &ReconcileConfig::default(),
        &mut warnings,
    )
    .await
    .unwrap();
    assert!(!changed);
}

#[tokio::test]
async fn test_missing_instance_fails_hard_without_network_calls() {
    init_tracing();

    let mut cluster = FakeCluster::new().with_unjoined("a", "a:3301");
    let desired = desired_topology(
        vec![desired_instance("a")],
        vec![desired_replicaset("r1", &["a", "ghost"])],
    );
    let mut warnings = Warnings::new();

    let err = reconcile(
        &mut cluster,
        &desired,
        &ReconcileConfig::default(),
        &mut warnings,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ShoalError::Validation { .. }));
    assert!(err.to_string().contains("ghost"));
    assert_eq!(cluster.count_calls("edit_topology"), 0);
}

#[tokio::test]
async fn test_missing_instance_soft_mode_skips_and_warns() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_unjoined("a", "a:3301")
        .with_unjoined("b", "b:3301");
    let desired = desired_topology(
        vec![desired_instance("a"), desired_instance("b")],
        vec![
            desired_replicaset("r1", &["a", "ghost"]),
            desired_replicaset("r2", &["b"]),
        ],
    );
    let config = ReconcileConfig::default().with_allow_missing_instances(true);
    let mut warnings = Warnings::new();

    let changed = reconcile(&mut cluster, &desired, &config, &mut warnings)
        .await
        .unwrap();

    // r1 was skipped, r2 still reconciled.
    assert!(changed);
    assert_eq!(cluster.members_of("r2"), ["b"]);
    assert!(cluster.members_of("r1").is_empty());
    assert_eq!(warnings.len(), 1);
    assert!(warnings.as_slice()[0].contains("ghost"));
}

#[tokio::test]
async fn test_remote_error_carries_the_batch_purpose() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_unjoined("a", "a:3301")
        .with_edit_failure("Replicaset r1 is locked");
    let desired = desired_topology(
        vec![desired_instance("a")],
        vec![desired_replicaset("r1", &["a"])],
    );
    let mut warnings = Warnings::new();

    let err = reconcile(
        &mut cluster,
        &desired,
        &ReconcileConfig::default(),
        &mut warnings,
    )
    .await
    .unwrap_err();

    assert_eq!(
        err.to_string(),
        "RPC error: apply structural topology changes: Replicaset r1 is locked"
    );
}

#[tokio::test]
async fn test_convergence_timeout_is_fatal_but_retryable() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_unjoined("a", "a:3301")
        .with_healthy_after(usize::MAX);
    let desired = desired_topology(
        vec![desired_instance("a")],
        vec![desired_replicaset("r1", &["a"])],
    );
    let config = ReconcileConfig::default()
        .with_convergence_timeout(Duration::from_millis(30))
        .with_health_poll_interval(Duration::from_millis(5));
    let mut warnings = Warnings::new();

    let err = reconcile(&mut cluster, &desired, &config, &mut warnings)
        .await
        .unwrap_err();

    assert!(matches!(err, ShoalError::ConvergenceTimeout { .. }));
    assert!(err.is_retryable());
    // The structural batch went out; the priority batch never did.
    assert_eq!(cluster.count_calls("edit_topology"), 1);
}

#[tokio::test]
async fn test_report_keeps_warnings_on_failure() {
    init_tracing();

    // Soft mode lets r2's missing member warn, then the edit failure kills
    // the run; the warning must survive in the report.
    let mut cluster = FakeCluster::new()
        .with_unjoined("a", "a:3301")
        .with_edit_failure("storage is down");
    let desired = desired_topology(
        vec![desired_instance("a")],
        vec![
            desired_replicaset("r1", &["a"]),
            desired_replicaset("r2", &["ghost"]),
        ],
    );
    let config = ReconcileConfig::default().with_allow_missing_instances(true);

    let report = run(&mut cluster, &desired, &config).await;
    assert!(!report.changed);
    assert!(report.error.as_deref().unwrap_or("").contains("storage is down"));
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].contains("ghost"));
}
