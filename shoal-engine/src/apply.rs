//! Batch submission and observed-state maintenance.

use tracing::{debug, info};

use shoal_core::{AdminApi, ObservedTopology, Result, TopologyPatch};

/// Submits one batch and folds the acknowledgement back into the local
/// observed view, saving a full re-read between batches.
///
/// Returns `false` without touching the channel when the batch is empty.
/// An RPC failure aborts with the remote error text wrapped in `purpose`.
/// Expelled instances leave the local view as soon as the patch succeeds.
pub async fn apply_patch<C: AdminApi + ?Sized>(
    chan: &mut C,
    patch: &TopologyPatch,
    observed: &mut ObservedTopology,
    purpose: &str,
) -> Result<bool> {
    if patch.is_empty() {
        debug!("{}: nothing to change", purpose);
        return Ok(false);
    }
    info!(
        "{}: {} replicaset and {} server mutations",
        purpose,
        patch.replicasets.len(),
        patch.servers.len()
    );

    let reply = chan
        .edit_topology(patch)
        .await
        .map_err(|e| e.in_context(purpose))?;

    observed.absorb(&reply)?;
    for uuid in patch.expelled_uuids() {
        observed.remove_instance_by_uuid(&uuid);
    }
    Ok(true)
}
