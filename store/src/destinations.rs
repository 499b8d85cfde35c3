//! CRUD and status mutation for destinations (spec §3, §6).

use caldavsync_core::{Destination, DestinationId, SyncError, SyncResult, SyncStatus};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::rows::{status_column, DestinationRow};

#[derive(Debug, Clone)]
pub struct DestinationInput {
    pub name: String,
    pub remote_ics_url: String,
    pub caldav_base_url: String,
    pub calendar_name: String,
    pub username: String,
    pub password: Option<String>,
    pub sync_interval_secs: u64,
    pub sync_all: bool,
    pub keep_local: bool,
}

const COLUMNS: &str = "id, name, remote_ics_url, caldav_base_url, calendar_name, username, password,
                       sync_interval_secs, sync_all, keep_local, last_synced, last_sync_status,
                       last_sync_error, created_at";

pub async fn list(pool: &SqlitePool) -> SyncResult<Vec<Destination>> {
    let rows: Vec<DestinationRow> =
        sqlx::query_as(&format!("SELECT {COLUMNS} FROM destinations ORDER BY id ASC"))
            .fetch_all(pool)
            .await
            .map_err(db_err)?;
    Ok(rows.into_iter().map(Destination::from).collect())
}

pub async fn get(pool: &SqlitePool, id: DestinationId) -> SyncResult<Destination> {
    let row: Option<DestinationRow> = sqlx::query_as(&format!("SELECT {COLUMNS} FROM destinations WHERE id = ?1"))
        .bind(id.0)
        .fetch_optional(pool)
        .await
        .map_err(db_err)?;
    row.map(Destination::from).ok_or_else(|| SyncError::NotFound(format!("destination {id}")))
}

pub async fn create(pool: &SqlitePool, input: DestinationInput) -> SyncResult<Destination> {
    let password = input.password.unwrap_or_default();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO destinations (name, remote_ics_url, caldav_base_url, calendar_name, username,
                                    password, sync_interval_secs, sync_all, keep_local)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         RETURNING id",
    )
    .bind(&input.name)
    .bind(&input.remote_ics_url)
    .bind(&input.caldav_base_url)
    .bind(&input.calendar_name)
    .bind(&input.username)
    .bind(&password)
    .bind(input.sync_interval_secs as i64)
    .bind(input.sync_all)
    .bind(input.keep_local)
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    get(pool, DestinationId(id)).await
}

pub async fn update(pool: &SqlitePool, id: DestinationId, input: DestinationInput) -> SyncResult<Destination> {
    let existing = get(pool, id).await?;
    let password = input.password.unwrap_or(existing.credentials.password);

    sqlx::query(
        "UPDATE destinations SET name = ?1, remote_ics_url = ?2, caldav_base_url = ?3, calendar_name = ?4,
                                 username = ?5, password = ?6, sync_interval_secs = ?7,
                                 sync_all = ?8, keep_local = ?9
         WHERE id = ?10",
    )
    .bind(&input.name)
    .bind(&input.remote_ics_url)
    .bind(&input.caldav_base_url)
    .bind(&input.calendar_name)
    .bind(&input.username)
    .bind(&password)
    .bind(input.sync_interval_secs as i64)
    .bind(input.sync_all)
    .bind(input.keep_local)
    .bind(id.0)
    .execute(pool)
    .await
    .map_err(db_err)?;

    get(pool, id).await
}

pub async fn delete(pool: &SqlitePool, id: DestinationId) -> SyncResult<()> {
    let result = sqlx::query("DELETE FROM destinations WHERE id = ?1").bind(id.0).execute(pool).await.map_err(db_err)?;
    if result.rows_affected() == 0 {
        return Err(SyncError::NotFound(format!("destination {id}")));
    }
    Ok(())
}

pub async fn record_success(pool: &SqlitePool, id: DestinationId) -> SyncResult<()> {
    sqlx::query("UPDATE destinations SET last_synced = ?1, last_sync_status = ?2, last_sync_error = NULL WHERE id = ?3")
        .bind(Utc::now())
        .bind(status_column(SyncStatus::Ok))
        .bind(id.0)
        .execute(pool)
        .await
        .map_err(db_err)?;
    Ok(())
}

pub async fn record_failure(pool: &SqlitePool, id: DestinationId, error: &str) -> SyncResult<()> {
    sqlx::query("UPDATE destinations SET last_synced = ?1, last_sync_status = ?2, last_sync_error = ?3 WHERE id = ?4")
        .bind(Utc::now())
        .bind(status_column(SyncStatus::Error))
        .bind(error)
        .bind(id.0)
        .execute(pool)
        .await
        .map_err(db_err)?;
    Ok(())
}

fn db_err(err: sqlx::Error) -> SyncError {
    SyncError::Internal(err.to_string())
}
