//! HTTP API surface: source/destination CRUD, manual sync triggers, status
//! polling, published-ICS serving, and health checks (spec §6).

pub mod error;
mod middleware;
mod routes;

use axum::extract::FromRef;
use axum::{middleware as axum_middleware, Router};
use caldavsync_core::config::AuthConfig;
use caldavsync_engine::Scheduler;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub scheduler: Scheduler,
    pub auth: Option<AuthConfig>,
    pub started_at: DateTime<Utc>,
}

impl FromRef<AppState> for SqlitePool {
    fn from_ref(state: &AppState) -> Self {
        state.pool.clone()
    }
}

/// Builds the full router: CRUD/sync/status/ics routes, health checks, CORS,
/// request tracing, and — when `state.auth` is configured — a perimeter
/// Basic-auth layer over every route except `/api/health` (spec §6). The web
/// UI is served as a static SPA build under `/app`, outside the perimeter
/// auth layer, the same split the teacher uses for its own `ServeDir`
/// frontend mount.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(routes::sources::routes())
        .merge(routes::destinations::routes())
        .merge(routes::ics::routes())
        .merge(routes::health::detailed_routes())
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::basic_auth::basic_auth));

    Router::new()
        .merge(routes::health::routes())
        .merge(protected)
        .nest_service("/app", ServeDir::new("web/dist").not_found_service(ServeFile::new("web/dist/index.html")))
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!("request", method = %request.method(), uri = %request.uri())
                })
                .on_response(|response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                    tracing::info!(latency_ms = %latency.as_millis(), status = %response.status(), "finished processing request");
                }),
        )
        .with_state(state)
}

/// Runs the API server until the listener is closed or an I/O error occurs.
pub async fn run_api(state: AppState, host: &str, port: u16) -> std::io::Result<()> {
    let app = create_router(state);
    let addr = format!("{host}:{port}");
    tracing::info!(%addr, "api server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await
}
