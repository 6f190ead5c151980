//! Login session storage (control database)
//!
//! Raw bearer tokens are handed to the client once; only their SHA-256 is stored.

use super::users::{user_from_row, User};
use chrono::{DateTime, Utc};
use lms_common::auth::{generate_token, hash_token};
use lms_common::time::{expiry_from_now, from_unix, unix_now};
use lms_common::Result;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// A freshly issued session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    /// Raw bearer token (only returned at login)
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Create a session for a user valid for `ttl_hours`
pub async fn create_session(pool: &SqlitePool, user_id: Uuid, ttl_hours: i64) -> Result<IssuedSession> {
    let token = generate_token();
    let expires_at = expiry_from_now(ttl_hours);

    sqlx::query(
        "INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
    )
    .bind(hash_token(&token))
    .bind(user_id.to_string())
    .bind(Utc::now())
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(IssuedSession {
        token,
        expires_at: from_unix(expires_at),
    })
}

/// Resolve a token hash to its user
///
/// Expired sessions are deleted on sight and resolve to `None`.
pub async fn find_session_user(pool: &SqlitePool, token_hash: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        r#"
        SELECT u.id, u.email, u.full_name, u.created_at, u.updated_at, s.expires_at
        FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = ?
        "#,
    )
    .bind(token_hash)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let expires_at: i64 = sqlx::Row::try_get(&row, "expires_at")?;
    if expires_at <= unix_now() {
        debug!("Session expired, removing");
        delete_session(pool, token_hash).await?;
        return Ok(None);
    }

    Ok(Some(user_from_row(&row)?))
}

/// Delete one session (logout)
pub async fn delete_session(pool: &SqlitePool, token_hash: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(token_hash)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Delete every session of a user (password change)
pub async fn delete_user_sessions(pool: &SqlitePool, user_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE user_id = ?")
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Remove all expired sessions, returning how many were removed
pub async fn purge_expired_sessions(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
        .bind(unix_now())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
