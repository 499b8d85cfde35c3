//! CRUD and status mutation for sources (spec §3, §6).

use caldavsync_core::{Source, SourceId, SyncError, SyncResult, SyncStatus};
use chrono::Utc;
use sqlx::SqlitePool;

use crate::rows::{status_column, SourceRow};

/// Fields accepted on create/update; `password: None` on update preserves
/// the existing credential (spec §6 `PUT /api/sources/{id}`).
#[derive(Debug, Clone)]
pub struct SourceInput {
    pub name: String,
    pub ics_path: String,
    pub caldav_base_url: String,
    pub calendar_name: Option<String>,
    pub username: String,
    pub password: Option<String>,
    pub sync_interval_secs: u64,
}

pub async fn list(pool: &SqlitePool) -> SyncResult<Vec<Source>> {
    let rows: Vec<SourceRow> = sqlx::query_as(
        "SELECT id, name, ics_path, caldav_base_url, calendar_name, username, password,
                sync_interval_secs, last_synced, last_sync_status, last_sync_error, created_at
         FROM sources ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;
    Ok(rows.into_iter().map(Source::from).collect())
}

pub async fn get(pool: &SqlitePool, id: SourceId) -> SyncResult<Source> {
    let row: Option<SourceRow> = sqlx::query_as(
        "SELECT id, name, ics_path, caldav_base_url, calendar_name, username, password,
                sync_interval_secs, last_synced, last_sync_status, last_sync_error, created_at
         FROM sources WHERE id = ?1",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await
    .map_err(db_err)?;
    row.map(Source::from).ok_or_else(|| SyncError::NotFound(format!("source {id}")))
}

pub async fn create(pool: &SqlitePool, input: SourceInput) -> SyncResult<Source> {
    if !Source::validate_ics_path(&input.ics_path) {
        return Err(SyncError::Internal(format!("invalid ics_path '{}'", input.ics_path)));
    }
    let password = input.password.unwrap_or_default();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO sources (name, ics_path, caldav_base_url, calendar_name, username, password, sync_interval_secs)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         RETURNING id",
    )
    .bind(&input.name)
    .bind(&input.ics_path)
    .bind(&input.caldav_base_url)
    .bind(&input.calendar_name)
    .bind(&input.username)
    .bind(&password)
    .bind(input.sync_interval_secs as i64)
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    get(pool, SourceId(id)).await
}

pub async fn update(pool: &SqlitePool, id: SourceId, input: SourceInput) -> SyncResult<Source> {
    let existing = get(pool, id).await?;
    let password = input.password.unwrap_or(existing.credentials.password);

    sqlx::query(
        "UPDATE sources SET name = ?1, ics_path = ?2, caldav_base_url = ?3, calendar_name = ?4,
                            username = ?5, password = ?6, sync_interval_secs = ?7
         WHERE id = ?8",
    )
    .bind(&input.name)
    .bind(&input.ics_path)
    .bind(&input.caldav_base_url)
    .bind(&input.calendar_name)
    .bind(&input.username)
    .bind(&password)
    .bind(input.sync_interval_secs as i64)
    .bind(id.0)
    .execute(pool)
    .await
    .map_err(db_err)?;

    get(pool, id).await
}

pub async fn delete(pool: &SqlitePool, id: SourceId) -> SyncResult<()> {
    let result = sqlx::query("DELETE FROM sources WHERE id = ?1").bind(id.0).execute(pool).await.map_err(db_err)?;
    if result.rows_affected() == 0 {
        return Err(SyncError::NotFound(format!("source {id}")));
    }
    Ok(())
}

/// Records a successful cycle: status, timestamp, and the newly cached
/// body, atomically in one statement (spec §3 "updates atomically").
pub async fn record_success(pool: &SqlitePool, id: SourceId, body: &str, content_type: &str) -> SyncResult<()> {
    sqlx::query(
        "UPDATE sources SET last_synced = ?1, last_sync_status = ?2, last_sync_error = NULL,
                            cached_body = ?3, cached_content_type = ?4
         WHERE id = ?5",
    )
    .bind(Utc::now())
    .bind(status_column(SyncStatus::Ok))
    .bind(body.as_bytes())
    .bind(content_type)
    .bind(id.0)
    .execute(pool)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Records a failed cycle without touching the cached body (spec §4.4
/// step 5 — "do not invalidate the previously cached body").
pub async fn record_failure(pool: &SqlitePool, id: SourceId, error: &str) -> SyncResult<()> {
    sqlx::query("UPDATE sources SET last_sync_status = ?1, last_sync_error = ?2 WHERE id = ?3")
        .bind(status_column(SyncStatus::Error))
        .bind(error)
        .bind(id.0)
        .execute(pool)
        .await
        .map_err(db_err)?;
    Ok(())
}

/// Fetches the cached `(content_type, body)` published for `ics_path`, if any.
pub async fn cached_body_by_path(pool: &SqlitePool, ics_path: &str) -> SyncResult<Option<(String, Vec<u8>)>> {
    let row: Option<(Option<String>, Option<Vec<u8>>)> =
        sqlx::query_as("SELECT cached_content_type, cached_body FROM sources WHERE ics_path = ?1")
            .bind(ics_path)
            .fetch_optional(pool)
            .await
            .map_err(db_err)?;

    Ok(row.and_then(|(ct, body)| match (ct, body) {
        (Some(ct), Some(body)) => Some((ct, body)),
        _ => None,
    }))
}

fn db_err(err: sqlx::Error) -> SyncError {
    SyncError::Internal(err.to_string())
}
