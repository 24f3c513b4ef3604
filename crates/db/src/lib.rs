//! Database layer with `SeaORM` entities and repositories.
//!
//! This crate provides:
//! - `SeaORM` entity definitions
//! - The tenant repository, which implements the relay's credential store
//! - Database migrations

pub mod entities;
pub mod migration;
pub mod repositories;

pub use repositories::{
    ProvisionedTenant, TenantError, TenantRepository, TenantTransaction, TenantUsage,
};

use std::time::Duration;

use ferry_shared::config::DatabaseConfig;
use sea_orm::{ConnectOptions, Database, DatabaseConnection, DbErr};

/// Establishes a pooled connection using the configured pool bounds.
///
/// # Errors
///
/// Returns an error if the connection cannot be established.
pub async fn connect_with(config: &DatabaseConfig) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(5))
        .sqlx_logging(false);

    Database::connect(options).await
}
