//! Tenant control rows (control database)

use super::parse_uuid;
use crate::pagination::{calculate_pagination, Page};
use chrono::{DateTime, Utc};
use lms_common::{Error, Result};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use uuid::Uuid;

/// Provisioning lifecycle of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Provisioning,
    Active,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Provisioning => "provisioning",
            TenantStatus::Active => "active",
        }
    }

    fn parse(value: &str) -> Result<Self> {
        match value {
            "provisioning" => Ok(TenantStatus::Provisioning),
            "active" => Ok(TenantStatus::Active),
            other => Err(Error::Internal(format!("Unknown tenant status: {}", other))),
        }
    }
}

/// Tenant record
#[derive(Debug, Clone, Serialize)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub database_name: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// New tenant in `provisioning` state
    pub fn new(slug: &str, name: &str, database_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: name.to_string(),
            database_name: database_name.to_string(),
            status: TenantStatus::Provisioning,
            created_at: now,
            updated_at: now,
        }
    }
}

fn tenant_from_row(row: &SqliteRow) -> Result<Tenant> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    Ok(Tenant {
        id: parse_uuid(&id)?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        database_name: row.try_get("database_name")?,
        status: TenantStatus::parse(&status)?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn insert_tenant<'e, E>(executor: E, tenant: &Tenant) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO tenants (id, slug, name, database_name, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(tenant.id.to_string())
    .bind(&tenant.slug)
    .bind(&tenant.name)
    .bind(&tenant.database_name)
    .bind(tenant.status.as_str())
    .bind(tenant.created_at)
    .bind(tenant.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

pub async fn slug_exists(pool: &SqlitePool, slug: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM tenants WHERE slug = ?)")
        .bind(slug)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

pub async fn get_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Tenant>> {
    let row = sqlx::query("SELECT * FROM tenants WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(tenant_from_row).transpose()
}

pub async fn set_status<'e, E>(executor: E, tenant_id: Uuid, status: TenantStatus) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query("UPDATE tenants SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(tenant_id.to_string())
        .execute(executor)
        .await?;
    Ok(())
}

pub async fn rename(pool: &SqlitePool, tenant_id: Uuid, name: &str) -> Result<()> {
    sqlx::query("UPDATE tenants SET name = ?, updated_at = ? WHERE id = ?")
        .bind(name)
        .bind(Utc::now())
        .bind(tenant_id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a tenant control row (memberships cascade)
pub async fn delete_tenant(pool: &SqlitePool, tenant_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
        .bind(tenant_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Active tenants a user belongs to, ordered by name
pub async fn list_for_user(
    pool: &SqlitePool,
    user_id: Uuid,
    page: i64,
    page_size: i64,
) -> Result<Page<Tenant>> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM tenants t
        JOIN tenant_memberships m ON m.tenant_id = t.id
        WHERE m.user_id = ? AND t.status = 'active'
        "#,
    )
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await?;

    let pagination = calculate_pagination(total, page, page_size);

    let rows = sqlx::query(
        r#"
        SELECT t.* FROM tenants t
        JOIN tenant_memberships m ON m.tenant_id = t.id
        WHERE m.user_id = ? AND t.status = 'active'
        ORDER BY t.name ASC, t.slug ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(pagination.page_size)
    .bind(pagination.offset)
    .fetch_all(pool)
    .await?;

    let items = rows.iter().map(tenant_from_row).collect::<Result<Vec<_>>>()?;
    Ok(Page::new(items, pagination, total))
}
