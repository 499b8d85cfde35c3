use anyhow::{Context, Result};
use caldavsync_core::Config;
use sqlx::SqlitePool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize dotenvy
pub fn init_env() {
    dotenvy::dotenv().ok();
}

/// Initialize tracing. File logging is opt-in via `config.enable_file_logging`;
/// when off, only the stdout layer is installed and no guard is returned.
pub fn init_tracing(service_name: &str, config: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let default_filter = format!("info,{}=debug,sqlx=warn", service_name);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    if !config.enable_file_logging {
        tracing_subscriber::registry().with(env_filter).with(tracing_subscriber::fmt::layer()).init();
        return None;
    }

    let log_dir = config.log_dir.clone().unwrap_or_else(|| std::path::PathBuf::from("logs/app"));
    let now = chrono::Local::now().format("%y-%m-%d-%H-%M-%S").to_string();
    let filename = format!("caldav-sync-{service_name}.log.{now}.jsonl");

    let file_appender = tracing_appender::rolling::never(&log_dir, filename);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_ansi(false).json().with_writer(non_blocking))
        .init();

    Some(guard)
}

/// Opens the SQLite store and applies pending migrations (spec §6 config
/// store). Creates `DATA_DIR` first — `create_if_missing` on the sqlite
/// connection only creates the database file itself, not its parent
/// directory.
pub async fn init_db(config: &Config) -> Result<SqlitePool> {
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    let pool = caldavsync_store::init_pool(&config.db_path()).await?;
    tracing::info!(path = %config.db_path().display(), "database pool established");
    Ok(pool)
}
