//! Run-level error taxonomy.
//!
//! Per-issue failures are caught inside the sweep and only counted; the
//! errors here are the ones that abort a whole run. Auth failures are kept
//! distinct so the runner can apply its cooldown and raise an alert.

use thiserror::Error;
use towerops_correlation::CorrelationError;
use towerops_db::StoreError;
use towerops_tracker::TrackerError;

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Could not authenticate against the tracker at all.
    #[error("Tracker authentication failed, aborting run: {0}")]
    Auth(#[source] TrackerError),

    /// The batch fetch itself failed after retries.
    #[error(transparent)]
    Tracker(TrackerError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Correlation(#[from] CorrelationError),
}

impl EngineError {
    /// Classify a tracker error: fatal auth vs. ordinary run failure.
    #[must_use]
    pub fn from_tracker(err: TrackerError) -> Self {
        if err.is_fatal_auth() {
            Self::Auth(err)
        } else {
            Self::Tracker(err)
        }
    }

    /// Whether the runner should apply the critical-failure cooldown.
    #[must_use]
    pub fn is_fatal_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
