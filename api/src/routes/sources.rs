//! Source REST API endpoints (spec §6: list/create/update/delete, manual
//! sync trigger, status polling).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use caldavsync_core::{Source, SourceId, SyncStatus};
use caldavsync_engine::{TriggerOutcome, UnitKey};
use caldavsync_store::sources::{self, SourceInput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::AppState;

/// A source as returned to API clients — the password never appears here
/// (spec §6 "Passwords are write-only").
#[derive(Debug, Serialize)]
pub struct SourceResponse {
    pub id: i64,
    pub name: String,
    pub ics_path: String,
    pub caldav_base_url: String,
    pub calendar_name: Option<String>,
    pub username: String,
    pub sync_interval_secs: u64,
    pub last_synced: Option<DateTime<Utc>>,
    pub last_sync_status: SyncStatus,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Source> for SourceResponse {
    fn from(source: Source) -> Self {
        Self {
            id: source.id.0,
            name: source.name,
            ics_path: source.ics_path,
            caldav_base_url: source.caldav_base_url,
            calendar_name: source.calendar_name,
            username: source.credentials.username,
            sync_interval_secs: source.sync_interval_secs,
            last_synced: source.last_synced,
            last_sync_status: source.last_sync_status,
            last_sync_error: source.last_sync_error,
            created_at: source.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SourceListResponse {
    pub sources: Vec<SourceResponse>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertSourceRequest {
    pub name: String,
    pub ics_path: String,
    pub caldav_base_url: String,
    pub calendar_name: Option<String>,
    pub username: String,
    /// Create: required. Update: omitted (or empty) preserves the existing
    /// password (spec §6 "empty `password` preserves existing").
    #[serde(default)]
    pub password: Option<String>,
    pub sync_interval_secs: u64,
}

impl From<UpsertSourceRequest> for SourceInput {
    fn from(req: UpsertSourceRequest) -> Self {
        Self {
            name: req.name,
            ics_path: req.ics_path,
            caldav_base_url: req.caldav_base_url,
            calendar_name: req.calendar_name,
            username: req.username,
            password: req.password.filter(|p| !p.is_empty()),
            sync_interval_secs: req.sync_interval_secs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub last_synced: Option<DateTime<Utc>>,
    pub last_sync_status: SyncStatus,
    pub last_sync_error: Option<String>,
}

async fn list_sources(State(state): State<AppState>) -> Result<Json<SourceListResponse>, ApiError> {
    let sources = sources::list(&state.pool).await?;
    Ok(Json(SourceListResponse { sources: sources.into_iter().map(SourceResponse::from).collect() }))
}

async fn create_source(State(state): State<AppState>, Json(req): Json<UpsertSourceRequest>) -> Result<Response, ApiError> {
    let source = sources::create(&state.pool, req.into()).await?;
    state.scheduler.register_source(source.id, source.sync_interval_secs).await;
    Ok((StatusCode::CREATED, Json(SourceResponse::from(source))).into_response())
}

async fn update_source(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpsertSourceRequest>,
) -> Result<Json<SourceResponse>, ApiError> {
    let id = SourceId::from(id);
    let source = sources::update(&state.pool, id, req.into()).await?;
    state.scheduler.register_source(source.id, source.sync_interval_secs).await;
    Ok(Json(SourceResponse::from(source)))
}

async fn delete_source(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<MessageResponse>, ApiError> {
    let id = SourceId::from(id);
    let source = sources::get(&state.pool, id).await?;
    state.scheduler.deregister(UnitKey::Source(id)).await;
    sources::delete(&state.pool, id).await?;
    state.scheduler.publisher().remove(&source.ics_path);
    Ok(Json(MessageResponse { message: format!("source {id} deleted") }))
}

async fn trigger_sync(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, ApiError> {
    let id = SourceId::from(id);
    match state.scheduler.try_trigger(UnitKey::Source(id)).await {
        Some(TriggerOutcome::Started) => {
            Ok((StatusCode::ACCEPTED, Json(MessageResponse { message: "sync started".to_string() })).into_response())
        }
        Some(TriggerOutcome::AlreadyRunning) => {
            Ok((StatusCode::CONFLICT, Json(MessageResponse { message: "sync already running".to_string() })).into_response())
        }
        None => Err(ApiError::NotFound(format!("source {id} is not scheduled"))),
    }
}

async fn source_status(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<StatusResponse>, ApiError> {
    let source = sources::get(&state.pool, SourceId::from(id)).await?;
    Ok(Json(StatusResponse {
        last_synced: source.last_synced,
        last_sync_status: source.last_sync_status,
        last_sync_error: source.last_sync_error,
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/sources", get(list_sources).post(create_source))
        .route("/api/sources/{id}", axum::routing::put(update_source).delete(delete_source))
        .route("/api/sources/{id}/sync", post(trigger_sync))
        .route("/api/sources/{id}/status", get(source_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_response_never_carries_a_password_field() {
        let source = Source {
            id: SourceId(1),
            name: "Work".to_string(),
            ics_path: "work".to_string(),
            caldav_base_url: "https://dav.example/cal".to_string(),
            calendar_name: None,
            credentials: caldavsync_core::Credentials { username: "alice".to_string(), password: "hunter2".to_string() },
            sync_interval_secs: 300,
            last_synced: None,
            last_sync_status: SyncStatus::Unset,
            last_sync_error: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&SourceResponse::from(source)).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("password"));
    }

    #[test]
    fn empty_password_on_update_is_treated_as_absent() {
        let req = UpsertSourceRequest {
            name: "x".into(),
            ics_path: "x".into(),
            caldav_base_url: "https://x".into(),
            calendar_name: None,
            username: "a".into(),
            password: Some(String::new()),
            sync_interval_secs: 60,
        };
        let input: SourceInput = req.into();
        assert!(input.password.is_none());
    }
}
