//! Fixture builders for desired topologies and membership views.

use shoal_core::{
    DesiredInstance, DesiredReplicaSet, DesiredTopology, MemberPayload, MemberRecord,
};

/// A plain desired instance advertising at `{name}:3301`.
pub fn desired_instance(name: &str) -> DesiredInstance {
    DesiredInstance {
        name: name.into(),
        uri: format!("{}:3301", name),
        zone: None,
        replicaset: None,
        expelled: false,
        disabled: false,
        stateboard: false,
    }
}

/// A storage replica set without explicit priority or weights.
pub fn desired_replicaset(alias: &str, members: &[&str]) -> DesiredReplicaSet {
    DesiredReplicaSet {
        alias: alias.into(),
        members: members.iter().map(|member| member.to_string()).collect(),
        failover_priority: None,
        roles: vec!["storage".into()],
        all_writable: None,
        weight: None,
        shard_group: None,
    }
}

pub fn desired_topology(
    instances: Vec<DesiredInstance>,
    replicasets: Vec<DesiredReplicaSet>,
) -> DesiredTopology {
    DesiredTopology::new(instances, replicasets).expect("valid fixture topology")
}

/// A gossip member carrying an identity payload.
pub fn member(uri: &str, status: &str, alias: Option<&str>, uuid: Option<&str>) -> MemberRecord {
    MemberRecord {
        uri: uri.into(),
        status: status.into(),
        payload: Some(MemberPayload {
            uuid: uuid.map(|uuid| uuid.to_string()),
            alias: alias.map(|alias| alias.to_string()),
        }),
    }
}
