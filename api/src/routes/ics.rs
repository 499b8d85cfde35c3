//! Serves the published calendar feed for a source (spec §4.5, §6
//! `GET /ics/{path}`).

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_TYPE, LAST_MODIFIED};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::error::ApiError;
use crate::AppState;

/// Serves from the in-memory publisher first; falls back to the cached body
/// persisted on the source row so a feed stays servable across a restart,
/// before the first post-restart sync cycle has completed (spec §4.5
/// "restart-safety").
async fn serve_ics(State(state): State<AppState>, Path(path): Path<String>) -> Result<Response, ApiError> {
    if let Some(published) = state.scheduler.publisher().get(&path) {
        let mut response = (
            [
                (CONTENT_TYPE, published.content_type),
                (LAST_MODIFIED, published.last_modified.to_rfc2822()),
            ],
            published.body,
        )
            .into_response();
        *response.status_mut() = StatusCode::OK;
        return Ok(response);
    }

    let cached = caldavsync_store::sources::cached_body_by_path(&state.pool, &path).await?;
    match cached {
        Some((content_type, body)) => Ok(([(CONTENT_TYPE, content_type)], body).into_response()),
        None => Err(ApiError::NotFound(format!("no calendar published at '{path}'"))),
    }
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/ics/{path}", get(serve_ics))
}
