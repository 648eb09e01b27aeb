//! Per-sweep result reporting.

use serde::{Deserialize, Serialize};

/// Counters for one sweep over a remote batch.
///
/// One failed item never aborts a batch, so `errors` can be non-zero while
/// the sweep itself succeeds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Issues examined.
    pub processed: usize,
    /// Issues whose handling failed and was skipped.
    pub errors: usize,
    /// Issues that caused a local or remote mutation.
    pub updated: usize,
    /// Corrective pushes executed successfully.
    pub pushed: usize,
    /// Corrective pushes that failed after retries.
    pub push_failures: usize,
}

impl SweepReport {
    /// Whether anything went wrong during the sweep.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors > 0 || self.push_failures > 0
    }
}
