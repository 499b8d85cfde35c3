//! SQLite pool construction and migration bootstrap.

use std::path::Path;

use caldavsync_core::{SyncError, SyncResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Opens (creating if absent) the database file at `path`, runs pending
/// migrations, and returns a ready connection pool.
pub async fn init_pool(path: &Path) -> SyncResult<SqlitePool> {
    let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| SyncError::Internal(format!("opening database: {e}")))?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| SyncError::Internal(format!("running migrations: {e}")))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_pool_creates_file_and_applies_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("caldav-sync.db");
        let pool = init_pool(&db_path).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = 'sources'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }
}
