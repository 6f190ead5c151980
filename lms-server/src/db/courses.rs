//! Course database operations (tenant database)

use super::parse_uuid;
use crate::pagination::{calculate_pagination, Page};
use chrono::{DateTime, Utc};
use lms_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Course record
#[derive(Debug, Clone, Serialize)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub instructor_id: Uuid,
    pub published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    pub fn new(title: String, description: String, instructor_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title,
            description,
            instructor_id,
            published: false,
            created_at: now,
            updated_at: now,
        }
    }
}

fn course_from_row(row: &SqliteRow) -> Result<Course> {
    let id: String = row.try_get("id")?;
    let instructor_id: String = row.try_get("instructor_id")?;
    Ok(Course {
        id: parse_uuid(&id)?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        instructor_id: parse_uuid(&instructor_id)?,
        published: row.try_get("published")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn insert_course(pool: &SqlitePool, course: &Course) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO courses (id, title, description, instructor_id, published, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(course.id.to_string())
    .bind(&course.title)
    .bind(&course.description)
    .bind(course.instructor_id.to_string())
    .bind(course.published)
    .bind(course.created_at)
    .bind(course.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_course(pool: &SqlitePool, id: Uuid) -> Result<Option<Course>> {
    let row = sqlx::query("SELECT * FROM courses WHERE id = ?")
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(course_from_row).transpose()
}

/// List courses newest first; `published_only` hides drafts
pub async fn list_courses(
    pool: &SqlitePool,
    published_only: bool,
    page: i64,
    page_size: i64,
) -> Result<Page<Course>> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM courses WHERE (? = 0 OR published = 1)",
    )
    .bind(published_only)
    .fetch_one(pool)
    .await?;

    let pagination = calculate_pagination(total, page, page_size);

    let rows = sqlx::query(
        r#"
        SELECT * FROM courses
        WHERE (? = 0 OR published = 1)
        ORDER BY created_at DESC, title ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(published_only)
    .bind(pagination.page_size)
    .bind(pagination.offset)
    .fetch_all(pool)
    .await?;

    let items = rows.iter().map(course_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, pagination, total))
}

/// Apply a partial update, returning the updated course
pub async fn update_course(
    pool: &SqlitePool,
    id: Uuid,
    title: Option<&str>,
    description: Option<&str>,
) -> Result<Option<Course>> {
    sqlx::query(
        r#"
        UPDATE courses
        SET title = COALESCE(?, title),
            description = COALESCE(?, description),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(title)
    .bind(description)
    .bind(Utc::now())
    .bind(id.to_string())
    .execute(pool)
    .await?;

    get_course(pool, id).await
}

pub async fn set_published(pool: &SqlitePool, id: Uuid, published: bool) -> Result<Option<Course>> {
    sqlx::query("UPDATE courses SET published = ?, updated_at = ? WHERE id = ?")
        .bind(published)
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(pool)
        .await?;

    get_course(pool, id).await
}

/// Delete a course (modules, enrollments and progress cascade)
pub async fn delete_course(pool: &SqlitePool, id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM courses WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Course counts: (total, published)
pub async fn count_courses(pool: &SqlitePool) -> Result<(i64, i64)> {
    let counts: (i64, Option<i64>) =
        sqlx::query_as("SELECT COUNT(*), SUM(published) FROM courses")
            .fetch_one(pool)
            .await?;
    Ok((counts.0, counts.1.unwrap_or(0)))
}
