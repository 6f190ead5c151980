//! Tenant database schema migrations
//!
//! Every tenant database is built by the same fixed, versioned migration script.
//! Migrations are tracked in the tenant's `schema_version` table so re-running
//! the script against an up-to-date database is a no-op.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - tenants created earlier were built from them
//! 2. **Always add new migrations** - append a new `TenantMigration` with the next version
//! 3. **One transaction per migration** - a failing statement leaves no partial version

use crate::{Error, Result};
use sqlx::SqlitePool;
use tracing::{info, warn};

/// One versioned step of the tenant schema
#[derive(Debug, Clone, Copy)]
pub struct TenantMigration {
    pub version: i64,
    pub description: &'static str,
    pub statements: &'static [&'static str],
}

const V1_LEARNING: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS courses (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        instructor_id TEXT NOT NULL,
        published INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS modules (
        id TEXT PRIMARY KEY,
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '',
        position INTEGER NOT NULL,
        duration_minutes INTEGER,
        created_at TIMESTAMP NOT NULL,
        updated_at TIMESTAMP NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_modules_course ON modules(course_id, position)",
    r#"
    CREATE TABLE IF NOT EXISTS enrollments (
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        user_id TEXT NOT NULL,
        enrolled_at TIMESTAMP NOT NULL,
        PRIMARY KEY (course_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_enrollments_user ON enrollments(user_id)",
    r#"
    CREATE TABLE IF NOT EXISTS module_progress (
        user_id TEXT NOT NULL,
        module_id TEXT NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
        course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
        completed INTEGER NOT NULL DEFAULT 0,
        score REAL,
        completed_at TIMESTAMP,
        updated_at TIMESTAMP NOT NULL,
        PRIMARY KEY (user_id, module_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_progress_course ON module_progress(course_id, user_id)",
];

const V2_NOTIFICATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL DEFAULT '',
        kind TEXT NOT NULL DEFAULT 'info'
            CHECK (kind IN ('info', 'course', 'reminder', 'system')),
        read_at TIMESTAMP,
        created_at TIMESTAMP NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS push_subscriptions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        endpoint TEXT NOT NULL UNIQUE,
        p256dh TEXT NOT NULL,
        auth TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL
    )
    "#,
];

/// The migration script applied to every tenant database
pub const TENANT_MIGRATIONS: &[TenantMigration] = &[
    TenantMigration {
        version: 1,
        description: "courses, modules, enrollments, module progress",
        statements: V1_LEARNING,
    },
    TenantMigration {
        version: 2,
        description: "notifications and push subscriptions",
        statements: V2_NOTIFICATIONS,
    },
];

/// Highest version in a migration script
pub fn latest_version(migrations: &[TenantMigration]) -> i64 {
    migrations.iter().map(|m| m.version).max().unwrap_or(0)
}

async fn ensure_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Get current schema version of a tenant database (0 when nothing applied)
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i64> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
        .fetch_one(pool)
        .await?;

    Ok(version.unwrap_or(0))
}

/// Run all pending migrations against a tenant database
///
/// Returns the schema version after the run.
pub async fn run_tenant_migrations(
    pool: &SqlitePool,
    migrations: &[TenantMigration],
) -> Result<i64> {
    ensure_schema_version_table(pool).await?;

    let current_version = get_schema_version(pool).await?;
    let target_version = latest_version(migrations);

    if current_version == target_version {
        info!("Tenant schema is up to date (v{})", current_version);
        return Ok(current_version);
    }

    if current_version > target_version {
        warn!(
            "Tenant schema version ({}) is newer than code version ({})",
            current_version, target_version
        );
        return Ok(current_version);
    }

    info!(
        "Running tenant migrations: v{} -> v{}",
        current_version, target_version
    );

    let mut pending: Vec<&TenantMigration> = migrations
        .iter()
        .filter(|m| m.version > current_version)
        .collect();
    pending.sort_by_key(|m| m.version);

    for migration in pending {
        let mut tx = pool.begin().await?;

        for &statement in migration.statements {
            sqlx::query(statement).execute(&mut *tx).await.map_err(|e| {
                Error::Migration(format!(
                    "v{} ({}) failed: {}",
                    migration.version, migration.description, e
                ))
            })?;
        }

        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(
            "✓ Tenant migration v{} completed: {}",
            migration.version, migration.description
        );
    }

    Ok(target_version)
}
