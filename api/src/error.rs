//! Error handling for API endpoints

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use caldavsync_core::SyncError;
use serde::Serialize;

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// API error type that can be converted to HTTP responses
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, details) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "Not Found", Some(msg)),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Bad Request", Some(msg)),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "Unauthorized", Some(msg)),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Conflict", Some(msg)),
            ApiError::Internal(msg) => {
                tracing::error!("internal server error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", None)
            }
        };

        let body = Json(ErrorResponse { error: error.to_string(), details });

        if status == StatusCode::UNAUTHORIZED {
            return (status, [("WWW-Authenticate", "Basic realm=\"caldav-ics-sync\"")], body).into_response();
        }

        (status, body).into_response()
    }
}

/// Converts the core sync error taxonomy into an HTTP response shape
/// (spec §7 taxonomy: `Network`, `Unauthorized`, `NotFound`, `Conflict`,
/// `MalformedXml`, `MalformedIcs`, `Upstream`, `Internal`).
impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotFound(msg) => ApiError::NotFound(msg),
            SyncError::Unauthorized => ApiError::Unauthorized("CalDAV credentials rejected".to_string()),
            SyncError::Conflict(msg) => ApiError::Conflict(msg),
            SyncError::Network(msg) => ApiError::Internal(format!("network error: {msg}")),
            SyncError::MalformedXml(msg) => ApiError::Internal(format!("malformed multistatus xml: {msg}")),
            SyncError::MalformedIcs(msg) => ApiError::Internal(format!("malformed icalendar data: {msg}")),
            SyncError::Upstream { status, snippet } => {
                ApiError::Internal(format!("upstream error {status}: {snippet}"))
            }
            SyncError::Internal(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::NotFound("resource not found".to_string()),
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    ApiError::Conflict(format!("constraint violation: {constraint}"))
                } else {
                    ApiError::Internal(format!("database error: {db_err}"))
                }
            }
            other => ApiError::Internal(format!("database error: {other}")),
        }
    }
}
