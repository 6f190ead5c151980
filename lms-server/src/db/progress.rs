//! Enrollment and module progress operations (tenant database)

use super::parse_uuid;
use chrono::{DateTime, Utc};
use lms_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Enrollment of a user in a course
#[derive(Debug, Clone, Serialize)]
pub struct Enrollment {
    pub course_id: Uuid,
    pub user_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
}

/// Progress of one user on one module
#[derive(Debug, Clone, Serialize)]
pub struct ModuleProgress {
    pub user_id: Uuid,
    pub module_id: Uuid,
    pub course_id: Uuid,
    pub completed: bool,
    pub score: Option<f64>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

fn enrollment_from_row(row: &SqliteRow) -> Result<Enrollment> {
    let course_id: String = row.try_get("course_id")?;
    let user_id: String = row.try_get("user_id")?;
    Ok(Enrollment {
        course_id: parse_uuid(&course_id)?,
        user_id: parse_uuid(&user_id)?,
        enrolled_at: row.try_get("enrolled_at")?,
    })
}

fn progress_from_row(row: &SqliteRow) -> Result<ModuleProgress> {
    let user_id: String = row.try_get("user_id")?;
    let module_id: String = row.try_get("module_id")?;
    let course_id: String = row.try_get("course_id")?;
    Ok(ModuleProgress {
        user_id: parse_uuid(&user_id)?,
        module_id: parse_uuid(&module_id)?,
        course_id: parse_uuid(&course_id)?,
        completed: row.try_get("completed")?,
        score: row.try_get("score")?,
        completed_at: row.try_get("completed_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Enroll a user; enrolling twice returns the original enrollment
pub async fn enroll(pool: &SqlitePool, course_id: Uuid, user_id: Uuid) -> Result<Enrollment> {
    sqlx::query(
        "INSERT OR IGNORE INTO enrollments (course_id, user_id, enrolled_at) VALUES (?, ?, ?)",
    )
    .bind(course_id.to_string())
    .bind(user_id.to_string())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT * FROM enrollments WHERE course_id = ? AND user_id = ?")
        .bind(course_id.to_string())
        .bind(user_id.to_string())
        .fetch_one(pool)
        .await?;
    enrollment_from_row(&row)
}

pub async fn is_enrolled(pool: &SqlitePool, course_id: Uuid, user_id: Uuid) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM enrollments WHERE course_id = ? AND user_id = ?)",
    )
    .bind(course_id.to_string())
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Enrollments of a user, oldest first
pub async fn list_user_enrollments(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<Enrollment>> {
    let rows = sqlx::query("SELECT * FROM enrollments WHERE user_id = ? ORDER BY enrolled_at ASC")
        .bind(user_id.to_string())
        .fetch_all(pool)
        .await?;
    rows.iter().map(enrollment_from_row).collect()
}

/// Enrollments of a course, oldest first
pub async fn list_course_enrollments(pool: &SqlitePool, course_id: Uuid) -> Result<Vec<Enrollment>> {
    let rows = sqlx::query("SELECT * FROM enrollments WHERE course_id = ? ORDER BY enrolled_at ASC")
        .bind(course_id.to_string())
        .fetch_all(pool)
        .await?;
    rows.iter().map(enrollment_from_row).collect()
}

pub async fn count_enrollments(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM enrollments")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Mark a module completed, replacing any earlier score
pub async fn complete_module(
    pool: &SqlitePool,
    user_id: Uuid,
    course_id: Uuid,
    module_id: Uuid,
    score: Option<f64>,
) -> Result<ModuleProgress> {
    if let Some(score) = score {
        if !(0.0..=100.0).contains(&score) {
            return Err(Error::InvalidInput(format!(
                "Score must be between 0 and 100, got {}",
                score
            )));
        }
    }

    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO module_progress (user_id, module_id, course_id, completed, score, completed_at, updated_at)
        VALUES (?, ?, ?, 1, ?, ?, ?)
        ON CONFLICT(user_id, module_id) DO UPDATE SET
            completed = 1,
            score = excluded.score,
            completed_at = excluded.completed_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id.to_string())
    .bind(module_id.to_string())
    .bind(course_id.to_string())
    .bind(score)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    let row = sqlx::query("SELECT * FROM module_progress WHERE user_id = ? AND module_id = ?")
        .bind(user_id.to_string())
        .bind(module_id.to_string())
        .fetch_one(pool)
        .await?;
    progress_from_row(&row)
}

/// Clear a completion; returns false when there was nothing to clear
pub async fn uncomplete_module(pool: &SqlitePool, user_id: Uuid, module_id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE module_progress
        SET completed = 0, score = NULL, completed_at = NULL, updated_at = ?
        WHERE user_id = ? AND module_id = ? AND completed = 1
        "#,
    )
    .bind(Utc::now())
    .bind(user_id.to_string())
    .bind(module_id.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Progress rows of a course, optionally restricted to one user
pub async fn list_course_progress(
    pool: &SqlitePool,
    course_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<Vec<ModuleProgress>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM module_progress
        WHERE course_id = ? AND (? IS NULL OR user_id = ?)
        "#,
    )
    .bind(course_id.to_string())
    .bind(user_id.map(|id| id.to_string()))
    .bind(user_id.map(|id| id.to_string()))
    .fetch_all(pool)
    .await?;
    rows.iter().map(progress_from_row).collect()
}

pub async fn count_completions(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM module_progress WHERE completed = 1")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
