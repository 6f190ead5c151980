//! Tenant provisioning and teardown
//!
//! Creating a tenant touches two databases that cannot share a transaction:
//! the control database (tenant row, admin membership) and the tenant's own
//! database file. Provisioning therefore runs as a sequence of steps, each
//! with a compensating action that undoes what earlier steps created:
//!
//! | Step | Action                                   | On failure                     |
//! |------|------------------------------------------|--------------------------------|
//! | 1    | validate slug and name                   | 400, nothing to undo           |
//! | 2    | check slug uniqueness                    | 409, nothing to undo           |
//! | 3    | create database file (must not exist)    | 409 if present, nothing to undo |
//! | 4    | insert tenant row (`provisioning`)       | drop database                  |
//! | 5    | run tenant migrations                    | delete row, drop database      |
//! | 6    | admin membership + `active` (one tx)     | delete row, drop database      |
//! | 7    | register pool, emit `TenantProvisioned`  | -                              |
//!
//! Compensation is best-effort: a failed compensation is logged and the
//! original error is returned.

use crate::db::memberships::insert_membership;
use crate::db::tenants::{self, Tenant, TenantStatus};
use crate::tenancy::{Role, TenantPools, TENANT_POOL_SIZE};
use chrono::Utc;
use lms_common::config::RootLayout;
use lms_common::db::{open_pool, run_tenant_migrations, TenantMigration, TENANT_MIGRATIONS};
use lms_common::events::{EventBus, LmsEvent};
use lms_common::{Error, Result};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use uuid::Uuid;

pub const SLUG_MIN_LEN: usize = 3;
pub const SLUG_MAX_LEN: usize = 32;
pub const NAME_MAX_LEN: usize = 200;

/// Tenant creation request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTenant {
    pub slug: String,
    pub name: String,
}

/// Validate a tenant slug
///
/// 3-32 characters of `[a-z0-9-]`, alphanumeric at both ends, no `--`.
pub fn validate_slug(slug: &str) -> Result<()> {
    let invalid = |reason: &str| Err(Error::InvalidInput(format!("Invalid slug '{}': {}", slug, reason)));

    if slug.len() < SLUG_MIN_LEN || slug.len() > SLUG_MAX_LEN {
        return invalid(&format!(
            "must be {}-{} characters",
            SLUG_MIN_LEN, SLUG_MAX_LEN
        ));
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return invalid("only lowercase letters, digits and hyphens are allowed");
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return invalid("must start and end with a letter or digit");
    }
    if slug.contains("--") {
        return invalid("consecutive hyphens are not allowed");
    }
    Ok(())
}

/// Validate a tenant display name, returning it trimmed
pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("Tenant name cannot be empty".to_string()));
    }
    if trimmed.chars().count() > NAME_MAX_LEN {
        return Err(Error::InvalidInput(format!(
            "Tenant name exceeds {} characters",
            NAME_MAX_LEN
        )));
    }
    Ok(trimmed.to_string())
}

/// Database name of a tenant: `tenant_<slug>` with hyphens as underscores
pub fn database_name_for(slug: &str) -> String {
    format!("tenant_{}", slug.replace('-', "_"))
}

/// Side files SQLite keeps next to a WAL-mode database
fn database_files(path: &Path) -> [PathBuf; 3] {
    let with_suffix = |suffix: &str| {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}

/// Remove a tenant database file and its WAL side files
pub fn drop_database(layout: &RootLayout, database_name: &str) -> Result<()> {
    for file in database_files(&layout.tenant_db_path(database_name)) {
        match std::fs::remove_file(&file) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Creates and deletes tenants
#[derive(Clone)]
pub struct TenantProvisioner {
    control: SqlitePool,
    pools: TenantPools,
    event_bus: EventBus,
    migrations: &'static [TenantMigration],
}

impl TenantProvisioner {
    pub fn new(control: SqlitePool, pools: TenantPools, event_bus: EventBus) -> Self {
        Self::with_migrations(control, pools, event_bus, TENANT_MIGRATIONS)
    }

    /// Provisioner running a custom migration script
    pub fn with_migrations(
        control: SqlitePool,
        pools: TenantPools,
        event_bus: EventBus,
        migrations: &'static [TenantMigration],
    ) -> Self {
        Self {
            control,
            pools,
            event_bus,
            migrations,
        }
    }

    /// Provision a tenant owned by `admin_user_id`
    pub async fn create_tenant(&self, request: CreateTenant, admin_user_id: Uuid) -> Result<Tenant> {
        // Step 1: validate
        let slug = request.slug.trim().to_string();
        validate_slug(&slug)?;
        let name = validate_name(&request.name)?;

        // Step 2: uniqueness
        if tenants::slug_exists(&self.control, &slug).await? {
            return Err(Error::Conflict(format!("Tenant slug '{}' is already taken", slug)));
        }

        let database_name = database_name_for(&slug);
        info!("Provisioning tenant {} (database {})", slug, database_name);

        // Step 3: create the tenant database
        let tenant_pool = self.create_database(&database_name).await?;
        info!("  [1/4] Created database {}", database_name);

        // Step 4: control row
        let mut tenant = Tenant::new(&slug, &name, &database_name);
        if let Err(e) = tenants::insert_tenant(&self.control, &tenant).await {
            warn!("Tenant row insert failed for {}: {}", slug, e);
            self.compensate_database(tenant_pool, &database_name).await;
            // Slug or database name collided with a row committed since step 2
            if e.is_unique_violation() {
                return Err(Error::Conflict(format!(
                    "Tenant '{}' already exists (slug or database {})",
                    slug, database_name
                )));
            }
            return Err(e);
        }
        info!("  [2/4] Inserted tenant row (provisioning)");

        // Step 5: schema
        if let Err(e) = run_tenant_migrations(&tenant_pool, self.migrations).await {
            warn!("Tenant migrations failed for {}: {}", slug, e);
            self.compensate_row(tenant.id, &slug).await;
            self.compensate_database(tenant_pool, &database_name).await;
            return Err(e);
        }
        info!("  [3/4] Applied tenant migrations");

        // Step 6: admin membership and activation together
        if let Err(e) = self.activate(&tenant, admin_user_id).await {
            warn!("Tenant activation failed for {}: {}", slug, e);
            self.compensate_row(tenant.id, &slug).await;
            self.compensate_database(tenant_pool, &database_name).await;
            return Err(e);
        }
        tenant.status = TenantStatus::Active;
        info!("  [4/4] Granted admin to {} and activated", admin_user_id);

        // Step 7: publish
        self.pools.insert(&slug, tenant_pool).await;
        self.event_bus.emit_lossy(LmsEvent::TenantProvisioned {
            tenant_slug: slug.clone(),
            timestamp: Utc::now(),
        });
        info!("✓ Tenant {} provisioned", slug);

        Ok(tenant)
    }

    /// Delete a tenant, its memberships and its database
    pub async fn delete_tenant(&self, tenant: &Tenant) -> Result<()> {
        // Row first so no new request can reopen the pool
        if !tenants::delete_tenant(&self.control, tenant.id).await? {
            return Err(Error::NotFound(format!("Tenant {}", tenant.slug)));
        }
        self.pools.evict(&tenant.slug).await;
        drop_database(self.pools.layout(), &tenant.database_name)?;

        self.event_bus.emit_lossy(LmsEvent::TenantDeleted {
            tenant_slug: tenant.slug.clone(),
            timestamp: Utc::now(),
        });
        info!("✓ Tenant {} deleted", tenant.slug);
        Ok(())
    }

    /// Create an empty database file, refusing to reuse an existing one
    async fn create_database(&self, database_name: &str) -> Result<SqlitePool> {
        let layout = self.pools.layout();
        layout.ensure_directories()?;
        let path = layout.tenant_db_path(database_name);

        // create_new is atomic: a concurrent request for the same slug loses here
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::Conflict(format!(
                    "Database {} already exists",
                    database_name
                )));
            }
            Err(e) => return Err(e.into()),
        }

        match open_pool(&path, false, TENANT_POOL_SIZE).await {
            Ok(pool) => Ok(pool),
            Err(e) => {
                if let Err(drop_err) = drop_database(layout, database_name) {
                    error!("Compensation failed: drop database {}: {}", database_name, drop_err);
                }
                Err(e)
            }
        }
    }

    async fn activate(&self, tenant: &Tenant, admin_user_id: Uuid) -> Result<()> {
        let mut tx = self.control.begin().await?;
        insert_membership(&mut *tx, tenant.id, admin_user_id, Role::Admin).await?;
        tenants::set_status(&mut *tx, tenant.id, TenantStatus::Active).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn compensate_row(&self, tenant_id: Uuid, slug: &str) {
        match tenants::delete_tenant(&self.control, tenant_id).await {
            Ok(_) => info!("Compensation: removed tenant row for {}", slug),
            Err(e) => error!("Compensation failed: delete tenant row {}: {}", slug, e),
        }
    }

    async fn compensate_database(&self, pool: SqlitePool, database_name: &str) {
        pool.close().await;
        match drop_database(self.pools.layout(), database_name) {
            Ok(()) => info!("Compensation: dropped database {}", database_name),
            Err(e) => error!("Compensation failed: drop database {}: {}", database_name, e),
        }
    }
}
