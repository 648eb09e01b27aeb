//! Store error type shared by every store implementation.

use thiserror::Error;

/// Errors surfaced by the data layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// A uniqueness constraint rejected the write. Correlation treats this
    /// as "someone else got there first" and re-reads.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A referenced record does not exist.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },
}

impl StoreError {
    /// Whether this error is a uniqueness-constraint rejection.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::UniqueViolation { .. })
    }

    /// Map an sqlx error, recognizing Postgres unique violations (23505).
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return Self::UniqueViolation {
                    constraint: db_err.constraint().unwrap_or("unknown").to_string(),
                };
            }
        }
        Self::Database(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
