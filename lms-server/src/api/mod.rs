//! HTTP API handlers for lms-server

pub mod analytics;
pub mod auth;
pub mod buildinfo;
pub mod courses;
pub mod health;
pub mod modules;
pub mod notifications;
pub mod progress;
pub mod tenants;
pub mod users;

pub use auth::{auth_middleware, AuthUser};
pub use buildinfo::get_build_info;
pub use health::health_routes;
pub use tenants::tenant_middleware;
