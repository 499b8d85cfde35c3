//! Health check endpoints (spec §6)

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct DetailedHealthResponse {
    pub status: String,
    pub uptime_seconds: i64,
    pub source_count: i64,
    pub db_ok: bool,
}

/// Liveness only — never touches the database.
async fn health(State(_state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string() })
}

async fn health_detailed(State(state): State<AppState>) -> Response {
    let db_ok = sqlx::query("SELECT 1").execute(&state.pool).await.is_ok();
    let source_count: i64 =
        sqlx::query_scalar("SELECT count(*) FROM sources").fetch_one(&state.pool).await.unwrap_or_default();
    let uptime_seconds = (Utc::now() - state.started_at).num_seconds().max(0);

    let status = if db_ok { "ok" } else { "degraded" };
    let status_code = if db_ok { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (status_code, Json(DetailedHealthResponse { status: status.to_string(), uptime_seconds, source_count, db_ok }))
        .into_response()
}

/// Liveness check only. Stays outside the perimeter auth layer.
pub fn routes() -> Router<AppState> {
    Router::new().route("/api/health", get(health))
}

/// Operational detail (uptime, row counts, DB connectivity). Merged behind
/// the perimeter auth layer by the caller — never exempted like `/api/health`.
pub fn detailed_routes() -> Router<AppState> {
    Router::new().route("/api/health/detailed", get(health_detailed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes_ok_status() {
        let response = HealthResponse { status: "ok".to_string() };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("ok"));
    }
}
