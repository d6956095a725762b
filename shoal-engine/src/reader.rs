//! Observed cluster state retrieval.

use tracing::debug;

use shoal_core::{AdminApi, ObservedTopology, Result};

/// Fetches and normalizes the observed topology from the coordinating node.
///
/// Instances and replica sets without an alias cannot be matched against
/// desired state and are dropped as unmanaged. An unbootstrapped cluster
/// (no replica sets yet) yields an empty topology rather than an error;
/// only a failing channel call is fatal.
pub async fn read_topology<C: AdminApi + ?Sized>(chan: &mut C) -> Result<ObservedTopology> {
    let servers = chan.get_servers().await?;
    let replicasets = chan.get_replicasets().await?;
    let topology = ObservedTopology::from_records(&servers, &replicasets)?;
    debug!(
        "observed {} instances across {} replicasets",
        topology.instances.len(),
        topology.replicasets.len()
    );
    Ok(topology)
}
