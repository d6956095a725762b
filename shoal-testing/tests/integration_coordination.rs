//! Coordinator election, disabled-instance voting, leader promotion, and
//! failover parameter management against the in-memory fake cluster.

use std::collections::{BTreeMap, BTreeSet};

use shoal_core::{
    FailoverMode, FailoverParams, FailoverParamsPatch, PromoteOpts, ShoalError, Warnings,
};
use shoal_engine::read_topology;
use shoal_leader::{
    configure_failover, detect_disabled, elect_control_instance, promote_leaders, InstanceReport,
    PromoteTarget,
};
use shoal_testing::{desired_instance, desired_replicaset, desired_topology, member, FakeCluster};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

fn uuid_str(n: u128) -> String {
    uuid::Uuid::from_u128(n).to_string()
}

#[tokio::test]
async fn test_elector_picks_lowest_twophase_version_regardless_of_order() {
    init_tracing();

    let inventory = desired_topology(
        vec![desired_instance("a"), desired_instance("b")],
        Vec::new(),
    );
    let a = member("a:3301", "alive", Some("a"), Some(&uuid_str(1)));
    let b = member("b:3301", "alive", Some("b"), Some(&uuid_str(2)));

    for members in [vec![a.clone(), b.clone()], vec![b.clone(), a.clone()]] {
        let mut cluster = FakeCluster::new()
            .with_twophase_version("a:3301", 3)
            .with_twophase_version("b:3301", 1);
        let mut warnings = Warnings::new();
        let control = elect_control_instance(&mut cluster, &members, &inventory, &mut warnings)
            .await
            .unwrap();
        assert_eq!(control.alias, "b");
        assert_eq!(control.uri, "b:3301");
    }
}

#[tokio::test]
async fn test_elector_breaks_version_ties_lexicographically() {
    init_tracing();

    let inventory = desired_topology(
        vec![desired_instance("a"), desired_instance("b")],
        Vec::new(),
    );
    let members = vec![
        member("b:3301", "alive", Some("b"), Some(&uuid_str(2))),
        member("a:3301", "alive", Some("a"), Some(&uuid_str(1))),
    ];
    let mut cluster = FakeCluster::new()
        .with_twophase_version("a:3301", 2)
        .with_twophase_version("b:3301", 2);
    let mut warnings = Warnings::new();

    let control = elect_control_instance(&mut cluster, &members, &inventory, &mut warnings)
        .await
        .unwrap();
    assert_eq!(control.alias, "a");
}

#[tokio::test]
async fn test_elector_skips_payloadless_members_with_a_warning() {
    init_tracing();

    let inventory = desired_topology(
        vec![desired_instance("a"), desired_instance("b")],
        Vec::new(),
    );
    let mut silent = member("a:3301", "alive", None, None);
    silent.payload = None;
    let members = vec![
        silent,
        member("b:3301", "alive", Some("b"), Some(&uuid_str(2))),
    ];
    let mut cluster = FakeCluster::new().with_twophase_version("b:3301", 1);
    let mut warnings = Warnings::new();

    let control = elect_control_instance(&mut cluster, &members, &inventory, &mut warnings)
        .await
        .unwrap();
    assert_eq!(control.alias, "b");
    assert_eq!(warnings.len(), 1);
    assert!(warnings.as_slice()[0].contains("a:3301"));
}

#[tokio::test]
async fn test_elector_rejects_uuid_without_alias() {
    init_tracing();

    let inventory = desired_topology(vec![desired_instance("a")], Vec::new());
    let members = vec![member("a:3301", "alive", None, Some(&uuid_str(1)))];
    let mut cluster = FakeCluster::new();
    let mut warnings = Warnings::new();

    let err = elect_control_instance(&mut cluster, &members, &inventory, &mut warnings)
        .await
        .unwrap_err();
    assert!(matches!(err, ShoalError::Validation { .. }));
    assert!(err.to_string().contains("no alias"));
}

#[tokio::test]
async fn test_elector_rejects_members_outside_the_inventory() {
    init_tracing();

    let inventory = desired_topology(vec![desired_instance("a")], Vec::new());
    let members = vec![member("x:3301", "alive", Some("x"), None)];
    let mut cluster = FakeCluster::new();
    let mut warnings = Warnings::new();

    let err = elect_control_instance(&mut cluster, &members, &inventory, &mut warnings)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("x is not in the inventory"));
}

#[tokio::test]
async fn test_elector_prefers_replicaset_members_among_unjoined() {
    init_tracing();

    // Lexicographic order alone would pick a-solo; replica-set membership
    // must win first.
    let mut solo = desired_instance("a-solo");
    solo.replicaset = None;
    let mut grouped = desired_instance("z-grouped");
    grouped.replicaset = Some("r1".into());
    let inventory = desired_topology(vec![solo, grouped], Vec::new());

    let members = vec![
        member("a-solo:3301", "alive", Some("a-solo"), None),
        member("z-grouped:3301", "alive", Some("z-grouped"), None),
    ];
    let mut cluster = FakeCluster::new();
    let mut warnings = Warnings::new();

    let control = elect_control_instance(&mut cluster, &members, &inventory, &mut warnings)
        .await
        .unwrap();
    assert_eq!(control.alias, "z-grouped");
    assert_eq!(control.uuid, None);
    // Unjoined candidates never get their protocol version queried.
    assert_eq!(cluster.count_calls("get_twophase_version"), 0);
}

#[tokio::test]
async fn test_elector_fails_without_any_live_candidate() {
    init_tracing();

    let inventory = desired_topology(vec![desired_instance("a")], Vec::new());
    let members = vec![member("a:3301", "dead", Some("a"), Some(&uuid_str(1)))];
    let mut cluster = FakeCluster::new();
    let mut warnings = Warnings::new();

    let err = elect_control_instance(&mut cluster, &members, &inventory, &mut warnings)
        .await
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("No alive instance to act as coordinator"));
}

#[tokio::test]
async fn test_disabled_voting_over_observed_reports() {
    init_tracing();

    let mut cluster = FakeCluster::new().with_joined_replicaset(
        "r1",
        &[("a", "a:3301"), ("b", "b:3301"), ("c", "c:3301"), ("x", "x:3301")],
    );
    cluster.set_report("a", &["x"], 7);
    cluster.set_report("b", &["x"], 7);
    cluster.set_report("c", &["x"], 7);
    cluster.set_report("x", &[], 7);

    let observed = read_topology(&mut cluster).await.unwrap();
    let reports: BTreeMap<String, InstanceReport> = observed
        .instances
        .iter()
        .map(|(name, instance)| {
            (
                name.clone(),
                InstanceReport {
                    known_disabled: instance.known_disabled.clone(),
                    topology_checksum: instance.topology_checksum,
                },
            )
        })
        .collect();

    let inventory = desired_topology(
        vec![
            desired_instance("a"),
            desired_instance("b"),
            desired_instance("c"),
            desired_instance("x"),
        ],
        Vec::new(),
    );
    let mut warnings = Warnings::new();
    let sets = detect_disabled(&reports, &inventory, &mut warnings).unwrap();

    // 3 of 4 voters disable x: majority, but short of full agreement.
    assert_eq!(sets.cluster, vec!["x".to_string()]);
    assert_eq!(warnings.len(), 1);
}

#[tokio::test]
async fn test_explicit_promotion_changes_the_leader() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_joined_replicaset("r1", &[("a", "a:3301"), ("b", "b:3301")])
        .with_failover(FailoverParams {
            mode: FailoverMode::Stateful,
            state_provider: Some("stateboard".into()),
        });
    let desired = desired_topology(
        vec![desired_instance("a"), desired_instance("b")],
        vec![desired_replicaset("r1", &["a", "b"])],
    );
    let observed = read_topology(&mut cluster).await.unwrap();
    let target = PromoteTarget::Explicit(BTreeMap::from([("r1".to_string(), "b".to_string())]));
    let mut warnings = Warnings::new();

    let changed = promote_leaders(
        &mut cluster,
        &desired,
        &observed,
        &target,
        PromoteOpts::default(),
        &mut warnings,
    )
    .await
    .unwrap();

    assert!(changed);
    assert_eq!(cluster.leader_of("r1").as_deref(), Some("b"));
    assert_eq!(cluster.count_calls("failover_promote"), 1);

    // Promoting the same leader again is not a change.
    let observed = read_topology(&mut cluster).await.unwrap();
    let mut warnings = Warnings::new();
    let changed = promote_leaders(
        &mut cluster,
        &desired,
        &observed,
        &target,
        PromoteOpts::default(),
        &mut warnings,
    )
    .await
    .unwrap();
    assert!(!changed);
}

#[tokio::test]
async fn test_promotion_with_unknown_replicaset_makes_no_calls() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_joined_replicaset("r1", &[("a", "a:3301")])
        .with_failover(FailoverParams {
            mode: FailoverMode::Stateful,
            state_provider: None,
        });
    let desired = desired_topology(vec![desired_instance("a")], Vec::new());
    let observed = read_topology(&mut cluster).await.unwrap();
    let calls_before = cluster.calls.len();

    let target = PromoteTarget::Explicit(BTreeMap::from([("ghost".to_string(), "a".to_string())]));
    let mut warnings = Warnings::new();

    let err = promote_leaders(
        &mut cluster,
        &desired,
        &observed,
        &target,
        PromoteOpts::default(),
        &mut warnings,
    )
    .await
    .unwrap_err();

    assert!(matches!(err, ShoalError::Validation { .. }));
    assert!(err.to_string().contains("ghost"));
    assert_eq!(cluster.calls.len(), calls_before);
}

#[tokio::test]
async fn test_promotion_requires_stateful_failover() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_joined_replicaset("r1", &[("a", "a:3301"), ("b", "b:3301")])
        .with_failover(FailoverParams {
            mode: FailoverMode::Eventual,
            state_provider: None,
        });
    let desired = desired_topology(
        vec![desired_instance("a"), desired_instance("b")],
        Vec::new(),
    );
    let observed = read_topology(&mut cluster).await.unwrap();
    let target = PromoteTarget::Explicit(BTreeMap::from([("r1".to_string(), "b".to_string())]));
    let mut warnings = Warnings::new();

    let err = promote_leaders(
        &mut cluster,
        &desired,
        &observed,
        &target,
        PromoteOpts::default(),
        &mut warnings,
    )
    .await
    .unwrap_err();

    assert!(err.to_string().contains("stateful"));
    assert_eq!(cluster.count_calls("failover_promote"), 0);
}

#[tokio::test]
async fn test_derived_promotion_skips_disabled_and_respects_priority() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_joined_replicaset("r1", &[("a", "a:3301"), ("b", "b:3301"), ("c", "c:3301")])
        .with_failover(FailoverParams {
            mode: FailoverMode::Stateful,
            state_provider: None,
        });
    let desired = desired_topology(
        vec![
            desired_instance("a"),
            desired_instance("b"),
            desired_instance("c"),
        ],
        vec![desired_replicaset("r1", &["a", "b", "c"])],
    );
    let observed = read_topology(&mut cluster).await.unwrap();

    // a is cluster-disabled, so b (the next-lowest priority) wins.
    let target = PromoteTarget::Derived {
        candidates: vec!["a".into(), "b".into(), "c".into()],
        cluster_disabled: BTreeSet::from(["a".to_string()]),
    };
    let mut warnings = Warnings::new();

    let changed = promote_leaders(
        &mut cluster,
        &desired,
        &observed,
        &target,
        PromoteOpts::default(),
        &mut warnings,
    )
    .await
    .unwrap();

    assert!(changed);
    assert_eq!(cluster.leader_of("r1").as_deref(), Some("b"));
    assert!(warnings.is_empty());
}

#[tokio::test]
async fn test_derived_promotion_reports_dead_replicasets() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_joined_replicaset("r1", &[("a", "a:3301"), ("b", "b:3301")])
        .with_failover(FailoverParams {
            mode: FailoverMode::Stateful,
            state_provider: None,
        });
    cluster.set_status("a", "dead");
    cluster.set_status("b", "dead");
    let desired = desired_topology(
        vec![desired_instance("a"), desired_instance("b")],
        vec![desired_replicaset("r1", &["a", "b"])],
    );
    let observed = read_topology(&mut cluster).await.unwrap();

    let target = PromoteTarget::Derived {
        candidates: vec!["a".into(), "b".into()],
        cluster_disabled: BTreeSet::new(),
    };
    let mut warnings = Warnings::new();

    let changed = promote_leaders(
        &mut cluster,
        &desired,
        &observed,
        &target,
        PromoteOpts::default(),
        &mut warnings,
    )
    .await
    .unwrap();

    // Nothing to promote is not a failure, but the dead replica set is
    // surfaced.
    assert!(!changed);
    assert_eq!(warnings.len(), 1);
    assert!(warnings.as_slice()[0].contains("r1"));
    assert_eq!(cluster.count_calls("failover_promote"), 0);
}

#[tokio::test]
async fn test_derived_promotion_skips_inventory_disabled_and_stateboard() {
    init_tracing();

    let mut cluster = FakeCluster::new()
        .with_joined_replicaset("r1", &[("a", "a:3301"), ("b", "b:3301")])
        .with_failover(FailoverParams {
            mode: FailoverMode::Stateful,
            state_provider: None,
        });
    let mut a = desired_instance("a");
    a.disabled = true;
    let desired = desired_topology(
        vec![a, desired_instance("b")],
        vec![desired_replicaset("r1", &["a", "b"])],
    );
    let observed = read_topology(&mut cluster).await.unwrap();

    let target = PromoteTarget::Derived {
        candidates: vec!["a".into(), "b".into()],
        cluster_disabled: BTreeSet::new(),
    };
    let mut warnings = Warnings::new();

    let changed = promote_leaders(
        &mut cluster,
        &desired,
        &observed,
        &target,
        PromoteOpts::default(),
        &mut warnings,
    )
    .await
    .unwrap();

    assert!(changed);
    assert_eq!(cluster.leader_of("r1").as_deref(), Some("b"));
}

#[tokio::test]
async fn test_configure_failover_sends_only_changed_fields() {
    init_tracing();

    let mut cluster = FakeCluster::new().with_failover(FailoverParams {
        mode: FailoverMode::Disabled,
        state_provider: None,
    });

    let patch = FailoverParamsPatch {
        mode: Some(FailoverMode::Stateful),
        state_provider: Some("stateboard".into()),
    };
    let changed = configure_failover(&mut cluster, &patch).await.unwrap();
    assert!(changed);
    assert_eq!(cluster.count_calls("set_failover_params"), 1);

    // Re-applying the same parameters is a no-op without a set call.
    let changed = configure_failover(&mut cluster, &patch).await.unwrap();
    assert!(!changed);
    assert_eq!(cluster.count_calls("set_failover_params"), 1);

    // An empty patch never touches the channel at all.
    let calls_before = cluster.calls.len();
    let changed = configure_failover(&mut cluster, &FailoverParamsPatch::default())
        .await
        .unwrap();
    assert!(!changed);
    assert_eq!(cluster.calls.len(), calls_before);
}
