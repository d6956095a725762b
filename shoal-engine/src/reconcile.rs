//! Two-batch reconciliation of a declared topology against a live cluster.

use tracing::info;

use shoal_core::{AdminApi, DesiredTopology, Result, Warnings};

use crate::apply::apply_patch;
use crate::converge::wait_healthy;
use crate::diff::{priority_changes, structural_changes};
use crate::reader::read_topology;
use crate::ReconcileConfig;

/// Flat result of a reconciliation run. Warnings are carried even when the
/// run failed.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileReport {
    pub changed: bool,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

/// Drives the observed cluster topology to the desired one.
///
/// Two strictly ordered batches: structural changes first (replica-set
/// creation and edits, joins, server patches for instances that already hold
/// a uuid), then failover priority and the configuration of freshly joined
/// instances. The second batch is only computed after the first has been
/// applied and the cluster has settled, because it references uuids that the
/// joins of the first batch bring into existence.
///
/// Returns whether anything was changed. The caller owns the warning
/// accumulator and keeps it on failure. Concurrent runs against the same
/// cluster are not safe; callers serialize them.
pub async fn reconcile<C: AdminApi + ?Sized>(
    chan: &mut C,
    desired: &DesiredTopology,
    config: &ReconcileConfig,
    warnings: &mut Warnings,
) -> Result<bool> {
    let mut observed = read_topology(chan).await?;
    let mut changed = false;

    let structural = structural_changes(desired, &observed, config, warnings)?;
    if apply_patch(
        chan,
        &structural,
        &mut observed,
        "apply structural topology changes",
    )
    .await?
    {
        wait_healthy(chan, config.health_poll_interval, config.convergence_timeout).await?;
        changed = true;
    }

    let priority = priority_changes(desired, &observed, config, warnings)?;
    if apply_patch(chan, &priority, &mut observed, "apply failover priority").await? {
        wait_healthy(chan, config.health_poll_interval, config.convergence_timeout).await?;
        changed = true;
    }

    info!("reconciliation finished, changed: {}", changed);
    Ok(changed)
}

/// Runs reconciliation and folds the outcome into a [`ReconcileReport`].
pub async fn run<C: AdminApi + ?Sized>(
    chan: &mut C,
    desired: &DesiredTopology,
    config: &ReconcileConfig,
) -> ReconcileReport {
    let mut warnings = Warnings::new();
    match reconcile(chan, desired, config, &mut warnings).await {
        Ok(changed) => ReconcileReport {
            changed,
            error: None,
            warnings: warnings.into_vec(),
        },
        Err(e) => ReconcileReport {
            changed: false,
            error: Some(e.to_string()),
            warnings: warnings.into_vec(),
        },
    }
}
