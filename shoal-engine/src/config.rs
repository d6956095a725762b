use std::time::Duration;

/// Tuning knobs for one reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Wall-clock budget for each convergence wait
    pub convergence_timeout: Duration,
    /// Interval between cluster health probes
    pub health_poll_interval: Duration,
    /// Skip replica sets referencing instances missing from the inventory
    /// (with a warning) instead of failing the run
    pub allow_missing_instances: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            convergence_timeout: Duration::from_secs(60),
            health_poll_interval: Duration::from_millis(500),
            allow_missing_instances: false,
        }
    }
}

impl ReconcileConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_convergence_timeout(mut self, timeout: Duration) -> Self {
        self.convergence_timeout = timeout;
        self
    }

    pub fn with_health_poll_interval(mut self, interval: Duration) -> Self {
        self.health_poll_interval = interval;
        self
    }

    pub fn with_allow_missing_instances(mut self, allow: bool) -> Self {
        self.allow_missing_instances = allow;
        self
    }
}
