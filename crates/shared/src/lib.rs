//! Shared types, errors, and configuration for Ferry.
//!
//! This crate provides common types used across all other crates:
//! - Typed IDs for type-safe entity references
//! - Application-wide error types
//! - Configuration management

pub mod config;
pub mod error;
pub mod types;

pub use config::{AdminConfig, AppConfig, CloudinaryConfig, RelayConfig};
pub use error::AppError;
pub use types::TenantId;
