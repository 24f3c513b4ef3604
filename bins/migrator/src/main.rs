//! Database migration runner for Ferry.
//!
//! Reads `DATABASE_URL`. Usage:
//!   migrator up      - Run all pending migrations
//!   migrator down    - Rollback last migration
//!   migrator status  - Show migration status
//!   migrator fresh   - Drop all tables and re-run migrations

use ferry_db::migration::Migrator;
use sea_orm_migration::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // The CLI installs its own tracing subscriber.
    cli::run_cli(Migrator).await;
}
