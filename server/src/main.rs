use anyhow::Result;
use caldavsync_api::AppState;
use caldavsync_core::Config;
use caldavsync_engine::{IcsPublisher, Scheduler};
use caldavsync_store::{destinations, sources};
use chrono::Utc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    caldavsync_shared::bootstrap::init_env();
    let config = Config::from_env()?;
    let _guard = caldavsync_shared::bootstrap::init_tracing("server", &config);

    tracing::info!("starting caldav-ics-sync server");

    let pool = caldavsync_shared::bootstrap::init_db(&config).await?;
    tracing::info!("migrations applied");

    let publisher = IcsPublisher::new();
    let scheduler = Scheduler::new(pool.clone(), publisher.clone());

    hydrate_publisher(&pool, &publisher).await?;
    register_existing_units(&pool, &scheduler).await?;

    let state = AppState { pool, scheduler: scheduler.clone(), auth: config.auth.clone(), started_at: Utc::now() };

    tokio::select! {
        result = caldavsync_api::run_api(state, &config.host, config.port) => {
            if let Err(err) = &result {
                tracing::error!(error = %err, "api server exited with an error");
            }
            result?;
        }
        _ = wait_for_shutdown() => {
            tracing::info!("shutdown signal received");
        }
    }

    scheduler.shutdown().await;
    tracing::info!("all sync units stopped");
    Ok(())
}

/// Primes the ICS publisher from each source's cached body so every feed is
/// servable immediately after a restart, before the first post-restart sync
/// cycle completes (spec §4.5 "restart-safety").
async fn hydrate_publisher(pool: &sqlx::SqlitePool, publisher: &IcsPublisher) -> Result<()> {
    for source in sources::list(pool).await? {
        if let Some((content_type, body)) = sources::cached_body_by_path(pool, &source.ics_path).await? {
            let last_modified = source.last_synced.unwrap_or_else(Utc::now);
            publisher.publish(source.ics_path.clone(), content_type, body, last_modified);
        }
    }
    Ok(())
}

async fn register_existing_units(pool: &sqlx::SqlitePool, scheduler: &Scheduler) -> Result<()> {
    for source in sources::list(pool).await? {
        scheduler.register_source(source.id, source.sync_interval_secs).await;
    }
    for destination in destinations::list(pool).await? {
        scheduler.register_destination(destination.id, destination.sync_interval_secs).await;
    }
    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
