//! # LMS Common Library
//!
//! Shared code for the LMS backend including:
//! - Error types
//! - Bootstrap configuration and root folder layout
//! - Control and tenant database schemas with migrations
//! - Password and session token primitives
//! - Event types (LmsEvent enum) and the EventBus
//! - SSE helpers and timestamp utilities

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod sse;
pub mod time;

pub use error::{Error, Result};
