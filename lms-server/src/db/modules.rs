//! Course module operations (tenant database)
//!
//! Positions within a course are always dense: `0..n` in display order.

use super::parse_uuid;
use chrono::{DateTime, Utc};
use lms_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use uuid::Uuid;

/// Module record
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub content: String,
    pub position: i64,
    pub duration_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn module_from_row(row: &SqliteRow) -> Result<Module> {
    let id: String = row.try_get("id")?;
    let course_id: String = row.try_get("course_id")?;
    Ok(Module {
        id: parse_uuid(&id)?,
        course_id: parse_uuid(&course_id)?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        position: row.try_get("position")?,
        duration_minutes: row.try_get("duration_minutes")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Append a module at the end of a course
pub async fn insert_module(
    pool: &SqlitePool,
    course_id: Uuid,
    title: &str,
    content: &str,
    duration_minutes: Option<i64>,
) -> Result<Module> {
    let mut tx = pool.begin().await?;

    let next_position: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(position) + 1, 0) FROM modules WHERE course_id = ?",
    )
    .bind(course_id.to_string())
    .fetch_one(&mut *tx)
    .await?;

    let now = Utc::now();
    let module = Module {
        id: Uuid::new_v4(),
        course_id,
        title: title.to_string(),
        content: content.to_string(),
        position: next_position,
        duration_minutes,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO modules (id, course_id, title, content, position, duration_minutes, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(module.id.to_string())
    .bind(module.course_id.to_string())
    .bind(&module.title)
    .bind(&module.content)
    .bind(module.position)
    .bind(module.duration_minutes)
    .bind(module.created_at)
    .bind(module.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(module)
}

/// Modules of a course in display order
pub async fn list_modules(pool: &SqlitePool, course_id: Uuid) -> Result<Vec<Module>> {
    let rows = sqlx::query("SELECT * FROM modules WHERE course_id = ? ORDER BY position ASC")
        .bind(course_id.to_string())
        .fetch_all(pool)
        .await?;
    rows.iter().map(module_from_row).collect()
}

/// Load a module that belongs to the given course
pub async fn get_module(pool: &SqlitePool, course_id: Uuid, module_id: Uuid) -> Result<Option<Module>> {
    let row = sqlx::query("SELECT * FROM modules WHERE id = ? AND course_id = ?")
        .bind(module_id.to_string())
        .bind(course_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(module_from_row).transpose()
}

/// Partial update; `duration_minutes` of `Some(None)` clears the duration
pub async fn update_module(
    pool: &SqlitePool,
    course_id: Uuid,
    module_id: Uuid,
    title: Option<&str>,
    content: Option<&str>,
    duration_minutes: Option<Option<i64>>,
) -> Result<Option<Module>> {
    let Some(current) = get_module(pool, course_id, module_id).await? else {
        return Ok(None);
    };

    sqlx::query(
        r#"
        UPDATE modules
        SET title = ?, content = ?, duration_minutes = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(title.unwrap_or(&current.title))
    .bind(content.unwrap_or(&current.content))
    .bind(duration_minutes.unwrap_or(current.duration_minutes))
    .bind(Utc::now())
    .bind(module_id.to_string())
    .execute(pool)
    .await?;

    get_module(pool, course_id, module_id).await
}

/// Delete a module and close the gap it leaves in the ordering
pub async fn delete_module(pool: &SqlitePool, course_id: Uuid, module_id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;

    let position: Option<i64> =
        sqlx::query_scalar("SELECT position FROM modules WHERE id = ? AND course_id = ?")
            .bind(module_id.to_string())
            .bind(course_id.to_string())
            .fetch_optional(&mut *tx)
            .await?;

    let Some(position) = position else {
        return Ok(false);
    };

    sqlx::query("DELETE FROM modules WHERE id = ?")
        .bind(module_id.to_string())
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE modules SET position = position - 1 WHERE course_id = ? AND position > ?")
        .bind(course_id.to_string())
        .bind(position)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

/// Reassign positions to match `module_ids`
///
/// `module_ids` must contain every module of the course exactly once.
pub async fn reorder_modules(
    pool: &SqlitePool,
    course_id: Uuid,
    module_ids: &[Uuid],
) -> Result<Vec<Module>> {
    let mut tx = pool.begin().await?;

    let existing: Vec<String> = sqlx::query_scalar("SELECT id FROM modules WHERE course_id = ?")
        .bind(course_id.to_string())
        .fetch_all(&mut *tx)
        .await?;
    let existing: HashSet<String> = existing.into_iter().collect();
    let requested: HashSet<String> = module_ids.iter().map(|id| id.to_string()).collect();

    if requested.len() != module_ids.len() {
        return Err(Error::InvalidInput("Module order contains duplicates".to_string()));
    }
    if requested != existing {
        return Err(Error::InvalidInput(
            "Module order must list every module of the course exactly once".to_string(),
        ));
    }

    let now = Utc::now();
    for (position, id) in module_ids.iter().enumerate() {
        sqlx::query("UPDATE modules SET position = ?, updated_at = ? WHERE id = ?")
            .bind(position as i64)
            .bind(now)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    list_modules(pool, course_id).await
}

/// Module ids of a course in display order
pub async fn module_ids(pool: &SqlitePool, course_id: Uuid) -> Result<Vec<Uuid>> {
    let ids: Vec<String> =
        sqlx::query_scalar("SELECT id FROM modules WHERE course_id = ? ORDER BY position ASC")
            .bind(course_id.to_string())
            .fetch_all(pool)
            .await?;
    ids.iter().map(|id| parse_uuid(id)).collect()
}
