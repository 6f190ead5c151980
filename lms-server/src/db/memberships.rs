//! Tenant membership operations (control database)

use super::parse_uuid;
use crate::tenancy::Role;
use chrono::{DateTime, Utc};
use lms_common::Result;
use serde::Serialize;
use sqlx::{Row, SqliteExecutor, SqlitePool};
use std::collections::HashMap;
use uuid::Uuid;

/// Member of a tenant joined with user profile
#[derive(Debug, Clone, Serialize)]
pub struct Member {
    pub user_id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

/// A tenant as seen from one user's membership list
#[derive(Debug, Clone, Serialize)]
pub struct UserTenant {
    pub tenant_id: Uuid,
    pub slug: String,
    pub name: String,
    pub role: Role,
}

pub async fn insert_membership<'e, E>(
    executor: E,
    tenant_id: Uuid,
    user_id: Uuid,
    role: Role,
) -> Result<()>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO tenant_memberships (tenant_id, user_id, role, created_at) VALUES (?, ?, ?, ?)",
    )
    .bind(tenant_id.to_string())
    .bind(user_id.to_string())
    .bind(role.as_str())
    .bind(Utc::now())
    .execute(executor)
    .await?;
    Ok(())
}

/// Role of a user in a tenant, if a member
pub async fn get_role(pool: &SqlitePool, tenant_id: Uuid, user_id: Uuid) -> Result<Option<Role>> {
    let role: Option<String> = sqlx::query_scalar(
        "SELECT role FROM tenant_memberships WHERE tenant_id = ? AND user_id = ?",
    )
    .bind(tenant_id.to_string())
    .bind(user_id.to_string())
    .fetch_optional(pool)
    .await?;

    role.map(|r| r.parse()).transpose()
}

/// Members of a tenant ordered by name
pub async fn list_members(pool: &SqlitePool, tenant_id: Uuid) -> Result<Vec<Member>> {
    let rows = sqlx::query(
        r#"
        SELECT u.id, u.email, u.full_name, m.role, m.created_at
        FROM tenant_memberships m
        JOIN users u ON u.id = m.user_id
        WHERE m.tenant_id = ?
        ORDER BY u.full_name ASC, u.email ASC
        "#,
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<Member> {
            let id: String = row.try_get("id")?;
            let role: String = row.try_get("role")?;
            Ok(Member {
                user_id: parse_uuid(&id)?,
                email: row.try_get("email")?,
                full_name: row.try_get("full_name")?,
                role: role.parse()?,
                joined_at: row.try_get("created_at")?,
            })
        })
        .collect()
}

pub async fn update_role(pool: &SqlitePool, tenant_id: Uuid, user_id: Uuid, role: Role) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE tenant_memberships SET role = ? WHERE tenant_id = ? AND user_id = ?",
    )
    .bind(role.as_str())
    .bind(tenant_id.to_string())
    .bind(user_id.to_string())
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn delete_membership(pool: &SqlitePool, tenant_id: Uuid, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM tenant_memberships WHERE tenant_id = ? AND user_id = ?")
        .bind(tenant_id.to_string())
        .bind(user_id.to_string())
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Member count per role
pub async fn count_by_role(pool: &SqlitePool, tenant_id: Uuid) -> Result<HashMap<Role, i64>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT role, COUNT(*) FROM tenant_memberships WHERE tenant_id = ? GROUP BY role",
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;

    let mut counts = HashMap::new();
    for (role, count) in rows {
        counts.insert(role.parse()?, count);
    }
    Ok(counts)
}

/// Every tenant membership of a user (active tenants only)
pub async fn list_user_tenants(pool: &SqlitePool, user_id: Uuid) -> Result<Vec<UserTenant>> {
    let rows = sqlx::query(
        r#"
        SELECT t.id, t.slug, t.name, m.role
        FROM tenant_memberships m
        JOIN tenants t ON t.id = m.tenant_id
        WHERE m.user_id = ? AND t.status = 'active'
        ORDER BY t.name ASC
        "#,
    )
    .bind(user_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<UserTenant> {
            let id: String = row.try_get("id")?;
            let role: String = row.try_get("role")?;
            Ok(UserTenant {
                tenant_id: parse_uuid(&id)?,
                slug: row.try_get("slug")?,
                name: row.try_get("name")?,
                role: role.parse()?,
            })
        })
        .collect()
}
