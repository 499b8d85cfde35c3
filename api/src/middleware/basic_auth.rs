//! Optional global perimeter HTTP Basic auth (spec §6 `AUTH_USERNAME` +
//! exactly one of `AUTH_PASSWORD`/`AUTH_PASSWORD_HASH`), applied over every
//! route except `/api/health`. Unlike the teacher's `caldav_basic_auth`
//! middleware, there is no per-user lookup against the database — a single
//! configured identity gates the whole API.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use caldavsync_core::config::AuthSecret;

use crate::error::ApiError;
use crate::AppState;

pub async fn basic_auth(State(state): State<AppState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let Some(auth) = state.auth.as_ref() else {
        return Ok(next.run(request).await);
    };

    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".to_string()))?;

    let (username, password) = parse_basic_auth(header)?;

    if username != auth.username {
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    }

    let ok = match &auth.secret {
        AuthSecret::Plain(expected) => constant_time_eq(password.as_bytes(), expected.as_bytes()),
        AuthSecret::Hash(hash) => verify_password(&password, hash)?,
    };
    if !ok {
        return Err(ApiError::Unauthorized("invalid credentials".to_string()));
    }

    Ok(next.run(request).await)
}

fn parse_basic_auth(header: &str) -> Result<(String, String), ApiError> {
    let encoded = header.strip_prefix("Basic ").ok_or_else(|| ApiError::Unauthorized("invalid Authorization header".to_string()))?;
    let decoded = STANDARD.decode(encoded).map_err(|_| ApiError::Unauthorized("invalid base64 encoding".to_string()))?;
    let credentials =
        String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized("invalid utf-8 in credentials".to_string()))?;

    let mut parts = credentials.splitn(2, ':');
    let username = parts.next().ok_or_else(|| ApiError::Unauthorized("missing username".to_string()))?.to_string();
    let password = parts.next().ok_or_else(|| ApiError::Unauthorized("missing password".to_string()))?.to_string();
    Ok((username, password))
}

fn verify_password(password: &str, hash: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(hash).map_err(|e| ApiError::Internal(format!("invalid password hash: {e}")))?;
    Ok(Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
