//! Tenant isolation primitives
//!
//! - `Role`: ordered membership roles (`learner` < `instructor` < `admin`)
//! - `TenantPools`: one connection pool per active tenant database
//! - `TenantContext`: what a tenant-scoped handler receives from middleware

use crate::db::tenants::{Tenant, TenantStatus};
use crate::error::{ApiError, ApiResult};
use lms_common::config::RootLayout;
use lms_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Connections per tenant pool
pub(crate) const TENANT_POOL_SIZE: u32 = 5;

/// Membership role within a tenant
///
/// Ordering is privilege: every admin may do what an instructor may do,
/// every instructor what a learner may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learner,
    Instructor,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Learner => "learner",
            Role::Instructor => "instructor",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "learner" => Ok(Role::Learner),
            "instructor" => Ok(Role::Instructor),
            "admin" => Ok(Role::Admin),
            other => Err(Error::InvalidInput(format!("Unknown role: {}", other))),
        }
    }
}

/// Registry of open tenant database pools keyed by slug
#[derive(Clone)]
pub struct TenantPools {
    layout: RootLayout,
    pools: Arc<RwLock<HashMap<String, SqlitePool>>>,
}

impl TenantPools {
    pub fn new(layout: RootLayout) -> Self {
        Self {
            layout,
            pools: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn layout(&self) -> &RootLayout {
        &self.layout
    }

    /// Get the pool of an active tenant, opening it on first use
    ///
    /// Tenants still provisioning are reported as not found.
    pub async fn get(&self, tenant: &Tenant) -> Result<SqlitePool> {
        if tenant.status != TenantStatus::Active {
            return Err(Error::NotFound(format!("Tenant {}", tenant.slug)));
        }

        if let Some(pool) = self.pools.read().await.get(&tenant.slug) {
            return Ok(pool.clone());
        }

        let mut pools = self.pools.write().await;
        // Another request may have opened it while we waited for the write lock
        if let Some(pool) = pools.get(&tenant.slug) {
            return Ok(pool.clone());
        }

        let path = self.layout.tenant_db_path(&tenant.database_name);
        if !path.exists() {
            return Err(Error::Internal(format!(
                "Database for active tenant {} is missing: {}",
                tenant.slug,
                path.display()
            )));
        }

        let pool = lms_common::db::open_pool(&path, false, TENANT_POOL_SIZE).await?;
        debug!("Opened tenant pool for {}", tenant.slug);
        pools.insert(tenant.slug.clone(), pool.clone());
        Ok(pool)
    }

    /// Register a freshly provisioned pool
    pub async fn insert(&self, slug: &str, pool: SqlitePool) {
        self.pools.write().await.insert(slug.to_string(), pool);
    }

    /// Remove and close a tenant's pool
    pub async fn evict(&self, slug: &str) {
        let removed = self.pools.write().await.remove(slug);
        if let Some(pool) = removed {
            pool.close().await;
            info!("Closed tenant pool for {}", slug);
        }
    }

    pub async fn open_count(&self) -> usize {
        self.pools.read().await.len()
    }
}

/// Per-request tenant scope inserted by the tenant middleware
#[derive(Clone)]
pub struct TenantContext {
    pub tenant: Tenant,
    pub role: Role,
    pub pool: SqlitePool,
}

impl TenantContext {
    /// Fail with 403 unless the caller holds at least `required`
    pub fn require(&self, required: Role) -> ApiResult<()> {
        if self.role >= required {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "Requires {} role in tenant {}",
                required, self.tenant.slug
            )))
        }
    }

    pub fn is_at_least(&self, role: Role) -> bool {
        self.role >= role
    }

    pub fn slug(&self) -> &str {
        &self.tenant.slug
    }
}
