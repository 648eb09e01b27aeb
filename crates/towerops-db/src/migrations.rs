//! Embedded schema migrations.

use sqlx::PgPool;

use crate::error::{StoreError, StoreResult};

/// Apply all pending migrations.
pub async fn run_migrations(pool: &PgPool) -> StoreResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))
}
