//! Leader promotion under stateful failover.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use uuid::Uuid;

use shoal_core::{
    AdminApi, DesiredTopology, FailoverMode, ObservedTopology, PromoteOpts, Result, ShoalError,
    Warnings,
};

/// How the set of leaders to promote is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromoteTarget {
    /// Explicit replica-set alias to leader alias map, validated against the
    /// observed topology before anything is sent.
    Explicit(BTreeMap<String, String>),
    /// Derive one leader per replica set from the candidate instances,
    /// skipping stateboards and disabled instances.
    Derived {
        candidates: Vec<String>,
        cluster_disabled: BTreeSet<String>,
    },
}

/// Changes which instance is the write leader of each affected replica set.
///
/// Requires stateful failover: any other mode has no external authority to
/// promote through. Validation of the target map happens before a single
/// call leaves the channel. Replica sets where no healthy candidate is left
/// are reported as warnings and do not fail the promotion on their own.
/// Returns whether any leader actually changed, decided by comparing the
/// leader snapshot from `observed` against a fresh read.
pub async fn promote_leaders<C: AdminApi + ?Sized>(
    chan: &mut C,
    desired: &DesiredTopology,
    observed: &ObservedTopology,
    target: &PromoteTarget,
    opts: PromoteOpts,
    warnings: &mut Warnings,
) -> Result<bool> {
    let leaders = match target {
        PromoteTarget::Explicit(map) => resolve_explicit(map, observed)?,
        PromoteTarget::Derived {
            candidates,
            cluster_disabled,
        } => derive_leaders(candidates, cluster_disabled, desired, observed, warnings),
    };

    let params = chan.get_failover_params().await?;
    if params.mode != FailoverMode::Stateful {
        return Err(ShoalError::validation(format!(
            "Leaders can only be promoted with stateful failover, current mode is {}",
            params.mode
        )));
    }

    if leaders.is_empty() {
        debug!("no leaders to promote");
        return Ok(false);
    }

    let before = observed.leaders();
    chan.failover_promote(&leaders, opts).await?;

    let replicasets = chan.get_replicasets().await?;
    let after = ObservedTopology::from_records(&[], &replicasets)?.leaders();
    let changed = before != after;
    info!("leader promotion finished, changed: {}", changed);
    Ok(changed)
}

fn resolve_explicit(
    map: &BTreeMap<String, String>,
    observed: &ObservedTopology,
) -> Result<BTreeMap<Uuid, Uuid>> {
    let mut leaders = BTreeMap::new();
    for (replicaset_alias, leader_alias) in map {
        let replicaset = observed.replicasets.get(replicaset_alias).ok_or_else(|| {
            ShoalError::validation(format!(
                "Replicaset {} is not in the cluster",
                replicaset_alias
            ))
        })?;
        if !replicaset.members.contains(leader_alias) {
            return Err(ShoalError::validation(format!(
                "Instance {} is not a member of replicaset {}",
                leader_alias, replicaset_alias
            )));
        }
        let uuid = observed.instance_uuid(leader_alias).ok_or_else(|| {
            ShoalError::validation(format!(
                "Instance {} isn't joined to the cluster",
                leader_alias
            ))
        })?;
        leaders.insert(replicaset.uuid, uuid);
    }
    Ok(leaders)
}

/// Keeps, per replica set, the healthy candidate with the lowest
/// failover-priority index. Replica sets whose candidates are all skipped or
/// unhealthy are collected as dead.
fn derive_leaders(
    candidates: &[String],
    cluster_disabled: &BTreeSet<String>,
    desired: &DesiredTopology,
    observed: &ObservedTopology,
    warnings: &mut Warnings,
) -> BTreeMap<Uuid, Uuid> {
    let mut best: BTreeMap<Uuid, (usize, Uuid)> = BTreeMap::new();
    let mut seen: BTreeMap<Uuid, String> = BTreeMap::new();

    for name in candidates {
        let Some(instance) = observed.instances.get(name) else {
            continue;
        };
        let Some(replicaset) = observed
            .replicasets
            .values()
            .find(|replicaset| replicaset.members.contains(name))
        else {
            continue;
        };
        seen.insert(replicaset.uuid, replicaset.alias.clone());

        let skip = desired
            .instance(name)
            .map(|inventory| inventory.stateboard || inventory.disabled)
            .unwrap_or(false);
        if skip || cluster_disabled.contains(name) {
            debug!("instance {} is disabled, not a leader candidate", name);
            continue;
        }
        if !instance.status.is_healthy() {
            continue;
        }
        let Some(uuid) = instance.uuid else {
            continue;
        };
        let priority = replicaset
            .members
            .iter()
            .position(|member| member == name)
            .unwrap_or(usize::MAX);
        match best.get(&replicaset.uuid) {
            Some((current, _)) if *current <= priority => {}
            _ => {
                best.insert(replicaset.uuid, (priority, uuid));
            }
        }
    }

    for (replicaset_uuid, alias) in &seen {
        if !best.contains_key(replicaset_uuid) {
            warnings.push(format!(
                "Replicaset {} has no healthy candidate to promote",
                alias
            ));
        }
    }

    best.into_iter()
        .map(|(replicaset_uuid, (_, leader_uuid))| (replicaset_uuid, leader_uuid))
        .collect()
}
