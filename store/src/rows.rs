//! `sqlx::FromRow` row types and their conversion to core domain models.
//!
//! Kept separate from `caldavsync-core` so the domain crate stays
//! sqlx-free; this is the only place SQL column layout is allowed to leak.

use caldavsync_core::{Credentials, Destination, DestinationId, Source, SourceId, SyncStatus};
use chrono::{DateTime, Utc};

#[derive(Debug, sqlx::FromRow)]
pub struct SourceRow {
    pub id: i64,
    pub name: String,
    pub ics_path: String,
    pub caldav_base_url: String,
    pub calendar_name: Option<String>,
    pub username: String,
    pub password: String,
    pub sync_interval_secs: i64,
    pub last_synced: Option<DateTime<Utc>>,
    pub last_sync_status: String,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<SourceRow> for Source {
    fn from(row: SourceRow) -> Self {
        Source {
            id: SourceId(row.id),
            name: row.name,
            ics_path: row.ics_path,
            caldav_base_url: row.caldav_base_url,
            calendar_name: row.calendar_name,
            credentials: Credentials { username: row.username, password: row.password },
            sync_interval_secs: row.sync_interval_secs.max(0) as u64,
            last_synced: row.last_synced,
            last_sync_status: parse_status(&row.last_sync_status),
            last_sync_error: row.last_sync_error,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct DestinationRow {
    pub id: i64,
    pub name: String,
    pub remote_ics_url: String,
    pub caldav_base_url: String,
    pub calendar_name: String,
    pub username: String,
    pub password: String,
    pub sync_interval_secs: i64,
    pub sync_all: bool,
    pub keep_local: bool,
    pub last_synced: Option<DateTime<Utc>>,
    pub last_sync_status: String,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DestinationRow> for Destination {
    fn from(row: DestinationRow) -> Self {
        Destination {
            id: DestinationId(row.id),
            name: row.name,
            remote_ics_url: row.remote_ics_url,
            caldav_base_url: row.caldav_base_url,
            calendar_name: row.calendar_name,
            credentials: Credentials { username: row.username, password: row.password },
            sync_interval_secs: row.sync_interval_secs.max(0) as u64,
            sync_all: row.sync_all,
            keep_local: row.keep_local,
            last_synced: row.last_synced,
            last_sync_status: parse_status(&row.last_sync_status),
            last_sync_error: row.last_sync_error,
            created_at: row.created_at,
        }
    }
}

fn parse_status(value: &str) -> SyncStatus {
    match value {
        "ok" => SyncStatus::Ok,
        "error" => SyncStatus::Error,
        _ => SyncStatus::Unset,
    }
}

pub fn status_column(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Unset => "unset",
        SyncStatus::Ok => "ok",
        SyncStatus::Error => "error",
    }
}
