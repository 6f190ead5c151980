//! Multi-step operations that span databases or aggregate tenant data

pub mod analytics;
pub mod provisioning;

pub use provisioning::{CreateTenant, TenantProvisioner};
