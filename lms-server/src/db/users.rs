//! User database operations (control database)

use super::parse_uuid;
use chrono::{DateTime, Utc};
use lms_common::auth::{generate_salt, hash_password};
use lms_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// User record as exposed over the API (never carries the password hash)
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored password material for login verification
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user: User,
    pub password_hash: String,
    pub password_salt: String,
}

pub(crate) fn user_from_row(row: &SqliteRow) -> Result<User> {
    let id: String = row.try_get("id")?;
    Ok(User {
        id: parse_uuid(&id)?,
        email: row.try_get("email")?,
        full_name: row.try_get("full_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert a new user; `email` must already be normalized
///
/// A duplicate email surfaces as a unique-constraint database error.
pub async fn insert_user(
    pool: &SqlitePool,
    email: &str,
    password: &str,
    full_name: &str,
) -> Result<User> {
    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        full_name: full_name.to_string(),
        created_at: now,
        updated_at: now,
    };
    let salt = generate_salt();
    let hash = hash_password(password, &salt);

    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, password_salt, full_name, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.email)
    .bind(&hash)
    .bind(&salt)
    .bind(&user.full_name)
    .bind(user.created_at)
    .bind(user.updated_at)
    .execute(pool)
    .await?;

    Ok(user)
}

/// Load user by id
pub async fn get_user(pool: &SqlitePool, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, email, full_name, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

/// Load user by normalized email
pub async fn find_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query(
        "SELECT id, email, full_name, created_at, updated_at FROM users WHERE email = ?",
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(user_from_row).transpose()
}

/// Load user plus password material by normalized email
pub async fn find_credentials(pool: &SqlitePool, email: &str) -> Result<Option<Credentials>> {
    let row = sqlx::query(
        r#"
        SELECT id, email, full_name, created_at, updated_at, password_hash, password_salt
        FROM users
        WHERE email = ?
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => Ok(Some(Credentials {
            user: user_from_row(&row)?,
            password_hash: row.try_get("password_hash")?,
            password_salt: row.try_get("password_salt")?,
        })),
        None => Ok(None),
    }
}

/// Update profile fields; a new password gets a fresh salt
pub async fn update_user(
    pool: &SqlitePool,
    id: Uuid,
    full_name: Option<&str>,
    new_password: Option<&str>,
) -> Result<User> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    if let Some(name) = full_name {
        sqlx::query("UPDATE users SET full_name = ?, updated_at = ? WHERE id = ?")
            .bind(name)
            .bind(now)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    if let Some(password) = new_password {
        let salt = generate_salt();
        sqlx::query(
            "UPDATE users SET password_hash = ?, password_salt = ?, updated_at = ? WHERE id = ?",
        )
        .bind(hash_password(password, &salt))
        .bind(&salt)
        .bind(now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    get_user(pool, id)
        .await?
        .ok_or_else(|| Error::NotFound(format!("User {}", id)))
}
