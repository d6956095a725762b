//! Bounded polling until a cluster-side condition holds.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

use shoal_core::{AdminApi, Result, ShoalError};

/// A condition polled by [`Poller`].
#[async_trait]
pub trait Probe: Send {
    /// One observation. `Ok(true)` stops the poll loop.
    async fn check(&mut self) -> Result<bool>;
}

/// Fixed-interval poll loop bounded by a wall-clock deadline.
///
/// A probe error counts as "condition not met yet": the channel is allowed
/// to be flaky between calls while the cluster settles, and the loop exists
/// precisely to ride that out. Only deadline expiry fails, with
/// [`ShoalError::ConvergenceTimeout`] so callers can tell it apart from RPC
/// failures.
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Poller {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Polls until the probe reports true or the deadline passes.
    pub async fn wait(&self, probe: &mut dyn Probe) -> Result<()> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match probe.check().await {
                Ok(true) => return Ok(()),
                Ok(false) => debug!("condition not met yet"),
                Err(e) => debug!("probe failed, retrying: {}", e),
            }
            if Instant::now() + self.interval > deadline {
                return Err(ShoalError::ConvergenceTimeout {
                    timeout: self.timeout,
                });
            }
            sleep(self.interval).await;
        }
    }
}

struct HealthProbe<'a, C: AdminApi + ?Sized> {
    chan: &'a mut C,
}

#[async_trait]
impl<'a, C: AdminApi + ?Sized> Probe for HealthProbe<'a, C> {
    async fn check(&mut self) -> Result<bool> {
        self.chan.is_healthy().await
    }
}

/// Blocks until the cluster reports itself healthy or the timeout elapses.
///
/// Waits only for the side effects of the just-applied batch to settle; the
/// batch itself is never re-submitted here.
pub async fn wait_healthy<C: AdminApi + ?Sized>(
    chan: &mut C,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    Poller::new(interval, timeout)
        .wait(&mut HealthProbe { chan })
        .await
}
