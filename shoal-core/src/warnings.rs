//! Warning accumulation for reconciliation runs.

use tracing::warn;

/// Non-fatal findings collected over a whole reconciliation run.
///
/// Warnings never abort a run on their own. The accumulator is threaded
/// through every component by the caller and handed back alongside the
/// outcome, so warnings survive even when the run itself fails.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Warnings {
    items: Vec<String>,
}

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a warning and logs it.
    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.items.push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.items
    }

    pub fn into_vec(self) -> Vec<String> {
        self.items
    }
}
