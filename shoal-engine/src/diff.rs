//! Desired-vs-observed topology diffing.
//!
//! Mutations are computed as two ordered batches. Joining a server is the
//! only way it obtains a uuid, and failover priority can only be expressed
//! in uuids, so priority (and configuration of freshly joined servers) must
//! wait for the batch that performs the joins to be applied and settled.

use std::collections::BTreeSet;
use tracing::debug;
use uuid::Uuid;

use shoal_core::{
    DesiredReplicaSet, DesiredTopology, ObservedReplicaSet, ObservedTopology, ReplicaSetPatch,
    Result, ServerPatch, ShoalError, TopologyPatch, Warnings,
};

use crate::ReconcileConfig;

/// Computes the first, structural batch: replica-set creation and edits,
/// join lists, and server patches for instances that already hold a uuid.
pub fn structural_changes(
    desired: &DesiredTopology,
    observed: &ObservedTopology,
    config: &ReconcileConfig,
    warnings: &mut Warnings,
) -> Result<TopologyPatch> {
    let mut patch = TopologyPatch::default();
    for replicaset in desired.replicasets() {
        if let Some(change) = replicaset_change(replicaset, desired, observed, config, warnings)? {
            patch.push_replicaset(change);
        }
    }
    for server in server_patches(desired, observed) {
        patch.push_server(server);
    }
    Ok(patch)
}

/// Computes the second batch: failover-priority reordering, now that every
/// joined member has a uuid, plus server patches for instances joined by the
/// first batch (their uuid did not exist when the first batch was computed).
pub fn priority_changes(
    desired: &DesiredTopology,
    observed: &ObservedTopology,
    config: &ReconcileConfig,
    warnings: &mut Warnings,
) -> Result<TopologyPatch> {
    let mut patch = TopologyPatch::default();
    for replicaset in desired.replicasets() {
        let Some(obs) = observed.replicasets.get(&replicaset.alias) else {
            // Never created, e.g. skipped in soft mode.
            continue;
        };
        if let Some(order) = priority_order(replicaset, obs, desired, observed, config, warnings)? {
            patch.push_replicaset(ReplicaSetPatch::Edit {
                uuid: obs.uuid,
                roles: None,
                all_writable: None,
                weight: None,
                shard_group: None,
                failover_priority: Some(order),
                join: Vec::new(),
            });
        }
    }
    for server in server_patches(desired, observed) {
        patch.push_server(server);
    }
    Ok(patch)
}

fn replicaset_change(
    replicaset: &DesiredReplicaSet,
    desired: &DesiredTopology,
    observed: &ObservedTopology,
    config: &ReconcileConfig,
    warnings: &mut Warnings,
) -> Result<Option<ReplicaSetPatch>> {
    let existing = observed.replicasets.get(&replicaset.alias);

    // Names that need to be joined by this batch. For a new replica set the
    // join order is the failover priority followed by the remaining members,
    // so the initial ordering comes out right without a priority patch. For
    // an existing one the order cannot be influenced anyway.
    let join_names: Vec<&String> = match existing {
        None => replicaset
            .join_order()
            .into_iter()
            .filter(|name| observed.instance_uuid(name).is_none())
            .collect(),
        Some(obs) => replicaset
            .members
            .iter()
            .filter(|name| !obs.members.contains(*name))
            .collect(),
    };

    let mut join = Vec::with_capacity(join_names.len());
    for name in join_names {
        match desired.instance(name) {
            Some(instance) if instance.expelled => continue,
            Some(instance) => join.push(instance.uri.clone()),
            None => {
                if config.allow_missing_instances {
                    warnings.push(format!(
                        "Instance {} is not in the inventory, skipping replicaset {}",
                        name, replicaset.alias
                    ));
                    return Ok(None);
                }
                return Err(ShoalError::validation(format!(
                    "Instance {} is referenced by replicaset {} but is not in the inventory",
                    name, replicaset.alias
                )));
            }
        }
    }

    let change = match existing {
        None => {
            debug!("replicaset {} does not exist yet", replicaset.alias);
            ReplicaSetPatch::Create {
                alias: replicaset.alias.clone(),
                roles: Some(replicaset.roles.clone()),
                all_writable: replicaset.all_writable,
                weight: replicaset.weight,
                shard_group: replicaset.shard_group.clone(),
                join,
            }
        }
        Some(obs) => ReplicaSetPatch::Edit {
            uuid: obs.uuid,
            roles: changed_roles(&replicaset.roles, &obs.roles),
            all_writable: replicaset
                .all_writable
                .filter(|value| *value != obs.all_writable),
            weight: replicaset.weight.filter(|value| *value != obs.weight),
            shard_group: replicaset
                .shard_group
                .clone()
                .filter(|group| obs.shard_group.as_ref() != Some(group)),
            failover_priority: None,
            join,
        },
    };
    Ok(Some(change))
}

/// Role sets are compared order-independently; the full desired list is
/// patched when they differ.
fn changed_roles(desired: &[String], observed: &[String]) -> Option<Vec<String>> {
    let desired_set: BTreeSet<&String> = desired.iter().collect();
    let observed_set: BTreeSet<&String> = observed.iter().collect();
    if desired_set == observed_set {
        None
    } else {
        Some(desired.to_vec())
    }
}

/// Server patches for every desired instance the cluster already knows by
/// uuid. Expelled instances unknown to the cluster are skipped: there is
/// nothing left to remove. Stateboard entries never take part in the
/// topology.
fn server_patches(desired: &DesiredTopology, observed: &ObservedTopology) -> Vec<ServerPatch> {
    let mut patches = Vec::new();
    for instance in desired.instances() {
        if instance.stateboard {
            continue;
        }
        let Some(obs) = observed.instances.get(&instance.name) else {
            continue;
        };
        let Some(uuid) = obs.uuid else {
            continue;
        };
        if instance.expelled {
            patches.push(ServerPatch {
                uuid,
                zone: None,
                uri: None,
                expelled: true,
            });
            continue;
        }
        patches.push(ServerPatch {
            uuid,
            zone: instance
                .zone
                .clone()
                .filter(|zone| obs.zone.as_ref() != Some(zone)),
            uri: (obs.uri != instance.uri).then(|| instance.uri.clone()),
            expelled: false,
        });
    }
    patches
}

/// The full desired member ordering by uuid: explicit priority first, then
/// the remaining observed members as they are. `None` when the observed
/// order already matches.
fn priority_order(
    replicaset: &DesiredReplicaSet,
    obs: &ObservedReplicaSet,
    desired: &DesiredTopology,
    observed: &ObservedTopology,
    config: &ReconcileConfig,
    warnings: &mut Warnings,
) -> Result<Option<Vec<Uuid>>> {
    let mut names: Vec<&String> = Vec::new();
    for name in replicaset.priority() {
        if desired
            .instance(name)
            .map(|instance| instance.expelled)
            .unwrap_or(false)
        {
            continue;
        }
        if observed.instance_uuid(name).is_none() {
            if config.allow_missing_instances {
                warnings.push(format!(
                    "Instance {} isn't joined to the cluster, dropping it from the failover priority of replicaset {}",
                    name, replicaset.alias
                ));
                continue;
            }
            return Err(ShoalError::validation(format!(
                "Instance {} isn't joined to the cluster",
                name
            )));
        }
        if !names.contains(&name) {
            names.push(name);
        }
    }
    for name in &obs.members {
        if !names.contains(&name) {
            names.push(name);
        }
    }

    if names.iter().map(|name| name.as_str()).eq(obs.members.iter().map(|m| m.as_str())) {
        return Ok(None);
    }

    let mut order = Vec::with_capacity(names.len());
    for name in names {
        let uuid = observed.instance_uuid(name).ok_or_else(|| {
            ShoalError::validation(format!("Instance {} isn't joined to the cluster", name))
        })?;
        order.push(uuid);
    }
    Ok(Some(order))
}
