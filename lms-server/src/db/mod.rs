//! Database access layer for lms-server
//!
//! Control database: users, sessions, tenants, memberships.
//! Tenant databases: courses, modules, progress, notifications.
//!
//! Ids are stored as TEXT (hyphenated UUIDs); timestamps as RFC 3339 TEXT.

pub mod courses;
pub mod memberships;
pub mod modules;
pub mod notifications;
pub mod progress;
pub mod sessions;
pub mod tenants;
pub mod users;

use lms_common::{Error, Result};
use uuid::Uuid;

/// Parse a stored id column
pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| Error::Internal(format!("Corrupt id '{}': {}", value, e)))
}
