//! Destination REST API endpoints, analogous to `routes::sources` (spec §6
//! "(analogous for destinations)").

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use caldavsync_core::{Destination, DestinationId, SyncStatus};
use caldavsync_engine::{TriggerOutcome, UnitKey};
use caldavsync_store::destinations::{self, DestinationInput};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::routes::sources::{MessageResponse, StatusResponse};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct DestinationResponse {
    pub id: i64,
    pub name: String,
    pub remote_ics_url: String,
    pub caldav_base_url: String,
    pub calendar_name: String,
    pub username: String,
    pub sync_interval_secs: u64,
    pub sync_all: bool,
    pub keep_local: bool,
    pub last_synced: Option<DateTime<Utc>>,
    pub last_sync_status: SyncStatus,
    pub last_sync_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Destination> for DestinationResponse {
    fn from(destination: Destination) -> Self {
        Self {
            id: destination.id.0,
            name: destination.name,
            remote_ics_url: destination.remote_ics_url,
            caldav_base_url: destination.caldav_base_url,
            calendar_name: destination.calendar_name,
            username: destination.credentials.username,
            sync_interval_secs: destination.sync_interval_secs,
            sync_all: destination.sync_all,
            keep_local: destination.keep_local,
            last_synced: destination.last_synced,
            last_sync_status: destination.last_sync_status,
            last_sync_error: destination.last_sync_error,
            created_at: destination.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DestinationListResponse {
    pub destinations: Vec<DestinationResponse>,
}

#[derive(Debug, Deserialize)]
pub struct UpsertDestinationRequest {
    pub name: String,
    pub remote_ics_url: String,
    pub caldav_base_url: String,
    pub calendar_name: String,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
    pub sync_interval_secs: u64,
    pub sync_all: bool,
    pub keep_local: bool,
}

impl From<UpsertDestinationRequest> for DestinationInput {
    fn from(req: UpsertDestinationRequest) -> Self {
        Self {
            name: req.name,
            remote_ics_url: req.remote_ics_url,
            caldav_base_url: req.caldav_base_url,
            calendar_name: req.calendar_name,
            username: req.username,
            password: req.password.filter(|p| !p.is_empty()),
            sync_interval_secs: req.sync_interval_secs,
            sync_all: req.sync_all,
            keep_local: req.keep_local,
        }
    }
}

async fn list_destinations(State(state): State<AppState>) -> Result<Json<DestinationListResponse>, ApiError> {
    let destinations = destinations::list(&state.pool).await?;
    Ok(Json(DestinationListResponse { destinations: destinations.into_iter().map(DestinationResponse::from).collect() }))
}

async fn create_destination(
    State(state): State<AppState>,
    Json(req): Json<UpsertDestinationRequest>,
) -> Result<Response, ApiError> {
    let destination = destinations::create(&state.pool, req.into()).await?;
    state.scheduler.register_destination(destination.id, destination.sync_interval_secs).await;
    Ok((StatusCode::CREATED, Json(DestinationResponse::from(destination))).into_response())
}

async fn update_destination(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpsertDestinationRequest>,
) -> Result<Json<DestinationResponse>, ApiError> {
    let id = DestinationId::from(id);
    let destination = destinations::update(&state.pool, id, req.into()).await?;
    state.scheduler.register_destination(destination.id, destination.sync_interval_secs).await;
    Ok(Json(DestinationResponse::from(destination)))
}

async fn delete_destination(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<MessageResponse>, ApiError> {
    let id = DestinationId::from(id);
    state.scheduler.deregister(UnitKey::Destination(id)).await;
    destinations::delete(&state.pool, id).await?;
    Ok(Json(MessageResponse { message: format!("destination {id} deleted") }))
}

async fn trigger_sync(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Response, ApiError> {
    let id = DestinationId::from(id);
    match state.scheduler.try_trigger(UnitKey::Destination(id)).await {
        Some(TriggerOutcome::Started) => {
            Ok((StatusCode::ACCEPTED, Json(MessageResponse { message: "sync started".to_string() })).into_response())
        }
        Some(TriggerOutcome::AlreadyRunning) => {
            Ok((StatusCode::CONFLICT, Json(MessageResponse { message: "sync already running".to_string() })).into_response())
        }
        None => Err(ApiError::NotFound(format!("destination {id} is not scheduled"))),
    }
}

async fn destination_status(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Json<StatusResponse>, ApiError> {
    let destination = destinations::get(&state.pool, DestinationId::from(id)).await?;
    Ok(Json(StatusResponse {
        last_synced: destination.last_synced,
        last_sync_status: destination.last_sync_status,
        last_sync_error: destination.last_sync_error,
    }))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/destinations", get(list_destinations).post(create_destination))
        .route("/api/destinations/{id}", axum::routing::put(update_destination).delete(delete_destination))
        .route("/api/destinations/{id}/sync", post(trigger_sync))
        .route("/api/destinations/{id}/status", get(destination_status))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_response_never_carries_a_password_field() {
        let destination = Destination {
            id: DestinationId(1),
            name: "Shared".to_string(),
            remote_ics_url: "https://example.com/feed.ics".to_string(),
            caldav_base_url: "https://dav.example/cal".to_string(),
            calendar_name: "shared".to_string(),
            credentials: caldavsync_core::Credentials { username: "bob".to_string(), password: "s3cret".to_string() },
            sync_interval_secs: 120,
            sync_all: false,
            keep_local: true,
            last_synced: None,
            last_sync_status: SyncStatus::Unset,
            last_sync_error: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&DestinationResponse::from(destination)).unwrap();
        assert!(!json.contains("s3cret"));
        assert!(!json.contains("password"));
    }
}
