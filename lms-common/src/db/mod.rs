//! Database schemas, connection helpers and migrations
//!
//! One control database plus one database per tenant.

pub mod control;
pub mod tenant_schema;

pub use control::*;
pub use tenant_schema::*;

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;

/// Busy timeout applied to every connection
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open a connection pool on a database file
///
/// Every connection gets `foreign_keys = ON`, WAL journaling and the busy timeout.
/// When `create` is false a missing file is an error.
pub async fn open_pool(path: &Path, create: bool, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}
