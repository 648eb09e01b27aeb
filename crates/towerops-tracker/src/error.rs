//! Tracker API error taxonomy.

use thiserror::Error;

/// Errors from the remote tracker boundary.
///
/// The split that matters downstream: [`TrackerError::is_transient`] errors
/// are retried at the call layer and then surfaced as per-item failures;
/// [`TrackerError::is_fatal_auth`] aborts the whole run.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Could not obtain a valid token even after a refresh. Fatal for the
    /// whole run.
    #[error("Authentication against the tracker failed")]
    AuthenticationFailed,

    /// The tracker rejected or failed the request.
    #[error("Tracker API returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Too many requests; the tracker told us when to come back.
    #[error("Tracker rate limit hit, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The request timed out.
    #[error("Timed out waiting for the tracker API")]
    Timeout,

    /// Connection-level failure.
    #[error("Network error calling the tracker API: {0}")]
    Network(String),

    /// The response body did not match the expected shape.
    #[error("Failed to parse tracker response: {0}")]
    Parse(String),
}

impl TrackerError {
    /// Whether a retry may reasonably succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Network(_) | Self::RateLimited { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            Self::AuthenticationFailed | Self::Parse(_) => false,
        }
    }

    /// Whether this error must abort the whole reconciliation run.
    #[must_use]
    pub fn is_fatal_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed)
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Parse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result type for tracker operations.
pub type TrackerResult<T> = Result<T, TrackerError>;
