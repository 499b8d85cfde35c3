//! Process-wide bootstrap configuration, loaded once from the environment
//! (spec §6 "Environment variables"). Shared by `caldavsync-api` (for the
//! perimeter auth middleware) and the `server` binary (for everything else).

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Either form of the perimeter auth secret an operator may configure.
#[derive(Debug, Clone)]
pub enum AuthSecret {
    /// `AUTH_PASSWORD` — compared to the request password byte-for-byte.
    Plain(String),
    /// `AUTH_PASSWORD_HASH` — an argon2id PHC string, verified with `argon2`.
    Hash(String),
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub username: String,
    pub secret: AuthSecret,
}

/// Bootstrap configuration (spec §6 env vars).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// `None` disables perimeter auth entirely; every route is reachable
    /// without credentials.
    pub auth: Option<AuthConfig>,
    /// Per-request timeout for outbound CalDAV/ICS HTTP calls (spec §5).
    pub http_timeout_secs: u64,
    pub log_dir: Option<PathBuf>,
    pub enable_file_logging: bool,
}

impl Config {
    /// Loads configuration from the environment, calling `dotenvy::dotenv()`
    /// first so a `.env` file in the working directory is honored.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .context("SERVER_PORT must be a valid u16")?;
        let data_dir = PathBuf::from(env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string()));
        let http_timeout_secs = env::var("HTTP_TIMEOUT_SECS")
            .ok()
            .map(|v| v.parse())
            .transpose()
            .context("HTTP_TIMEOUT_SECS must be a valid u64")?
            .unwrap_or(30);
        let log_dir = env::var("LOG_DIR").ok().map(PathBuf::from);
        let enable_file_logging =
            env::var("ENABLE_FILE_LOGGING").map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);

        let auth = parse_auth(
            env::var("AUTH_USERNAME").ok(),
            env::var("AUTH_PASSWORD").ok(),
            env::var("AUTH_PASSWORD_HASH").ok(),
        )?;

        Ok(Self { host, port, data_dir, auth, http_timeout_secs, log_dir, enable_file_logging })
    }

    /// Path to the single SQLite database file (spec §6 "Persisted state layout").
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("caldav-sync.db")
    }
}

fn parse_auth(username: Option<String>, password: Option<String>, hash: Option<String>) -> Result<Option<AuthConfig>> {
    match (username, password, hash) {
        (None, None, None) => Ok(None),
        (Some(username), Some(password), None) => Ok(Some(AuthConfig { username, secret: AuthSecret::Plain(password) })),
        (Some(username), None, Some(hash)) => Ok(Some(AuthConfig { username, secret: AuthSecret::Hash(hash) })),
        (Some(_), Some(_), Some(_)) => bail!("set exactly one of AUTH_PASSWORD or AUTH_PASSWORD_HASH, not both"),
        (Some(_), None, None) => bail!("AUTH_USERNAME is set but neither AUTH_PASSWORD nor AUTH_PASSWORD_HASH is"),
        (None, Some(_), _) | (None, _, Some(_)) => {
            bail!("AUTH_PASSWORD/AUTH_PASSWORD_HASH is set but AUTH_USERNAME is not")
        }
    }
}
