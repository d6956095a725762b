//! Cluster-wide disabled-instance agreement.
//!
//! Each node reports which peers it itself considers disabled, along with a
//! checksum of the topology config it runs. This module aggregates those
//! independent reports into one consensus disabled set, tolerating partial
//! disagreement, and flags the disagreement when full agreement was expected
//! but not reached. No RPC is involved; the reports are pre-collected.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use shoal_core::{DesiredTopology, Result, ShoalError, Warnings};

/// One node's self-reported view used for disabled-instance voting.
///
/// Both fields absent means the node has not started yet (or is a
/// stateboard) and carries no opinion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceReport {
    pub known_disabled: Option<BTreeSet<String>>,
    pub topology_checksum: Option<u32>,
}

impl InstanceReport {
    pub fn is_blank(&self) -> bool {
        self.known_disabled.is_none() && self.topology_checksum.is_none()
    }
}

/// The two disabled sets, both sorted: one voted by the cluster at runtime,
/// one declared statically in the inventory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisabledSets {
    pub cluster: Vec<String>,
    pub inventory: Vec<String>,
}

/// Aggregates per-node reports into a consensus disabled set.
///
/// A node may vote only when its topology checksum matches the checksum of
/// every peer it does not itself consider disabled; nodes out of sync are
/// excluded from voting but still counted. With no voters left and at least
/// one out-of-sync node there is no quorum to decide anything, which is
/// fatal. A name is cluster-wide disabled when at least half of the voters
/// say so (ties count as disabled). Any tally short of full agreement emits
/// a split-brain warning.
pub fn detect_disabled(
    reports: &BTreeMap<String, InstanceReport>,
    inventory: &DesiredTopology,
    warnings: &mut Warnings,
) -> Result<DisabledSets> {
    let active: BTreeMap<&str, &InstanceReport> = reports
        .iter()
        .filter(|(_, report)| !report.is_blank())
        .map(|(name, report)| (name.as_str(), report))
        .collect();

    let empty = BTreeSet::new();
    let mut voters: Vec<(&str, &BTreeSet<String>)> = Vec::new();
    let mut mismatched = 0usize;

    for (&name, report) in &active {
        let disabled = report.known_disabled.as_ref().unwrap_or(&empty);
        let in_sync = active.iter().all(|(&peer, peer_report)| {
            peer == name
                || disabled.contains(peer)
                || peer_report.topology_checksum == report.topology_checksum
        });
        if in_sync {
            voters.push((name, disabled));
        } else {
            mismatched += 1;
            debug!(
                "instance {} runs a different topology config, excluding it from voting",
                name
            );
        }
    }

    if voters.is_empty() && mismatched > 0 {
        return Err(ShoalError::validation(
            "All instances have different topology configs",
        ));
    }

    let healthy_count = voters.len();
    let mut votes: BTreeMap<&str, usize> = BTreeMap::new();
    for (_, disabled) in &voters {
        for name in disabled.iter() {
            *votes.entry(name.as_str()).or_default() += 1;
        }
    }

    let mut cluster = Vec::new();
    let mut split_brain = false;
    for (&name, &count) in &votes {
        if 2 * count >= healthy_count {
            cluster.push(name.to_string());
        }
        if count != healthy_count {
            split_brain = true;
        }
    }
    if split_brain {
        warnings.push(
            "Disabled instances are not agreed upon by all instances, the topology may be split",
        );
    }

    Ok(DisabledSets {
        cluster,
        inventory: inventory.inventory_disabled(),
    })
}
