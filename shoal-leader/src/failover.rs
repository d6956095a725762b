//! Failover parameter management.

use tracing::{debug, info};

use shoal_core::{AdminApi, FailoverParamsPatch, Result};

/// Applies the specified failover parameters, sending only the fields that
/// actually differ from what the cluster reports. Returns whether anything
/// was changed.
pub async fn configure_failover<C: AdminApi + ?Sized>(
    chan: &mut C,
    desired: &FailoverParamsPatch,
) -> Result<bool> {
    if desired.is_noop() {
        return Ok(false);
    }
    let current = chan.get_failover_params().await?;
    let patch = FailoverParamsPatch {
        mode: desired.mode.filter(|mode| *mode != current.mode),
        state_provider: desired
            .state_provider
            .clone()
            .filter(|provider| current.state_provider.as_ref() != Some(provider)),
    };
    if patch.is_noop() {
        debug!("failover parameters already match");
        return Ok(false);
    }
    chan.set_failover_params(&patch).await?;
    info!("failover parameters updated");
    Ok(true)
}
