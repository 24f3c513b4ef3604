//! Initial schema: tenants and their upload destinations.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(INITIAL_SQL).await?;
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(
            "DROP TABLE IF EXISTS upload_destinations CASCADE;
             DROP TABLE IF EXISTS tenants CASCADE;",
        )
        .await?;
        Ok(())
    }
}

const INITIAL_SQL: &str = r"
-- Tenants authenticate with an API key; only its SHA-256 digest is stored
CREATE TABLE tenants (
    id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
    email VARCHAR(255) NOT NULL UNIQUE,
    api_key_hash VARCHAR(64) NOT NULL UNIQUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- One destination per tenant, plus its usage counter
CREATE TABLE upload_destinations (
    tenant_id UUID PRIMARY KEY REFERENCES tenants(id) ON DELETE CASCADE,
    provider VARCHAR(32) NOT NULL,
    name VARCHAR(255) NOT NULL,
    access_key TEXT NOT NULL,
    secret TEXT NOT NULL,
    endpoint TEXT,
    region VARCHAR(64),
    request_count BIGINT NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_provider CHECK (provider IN ('cloudinary', 's3')),
    CONSTRAINT chk_request_count_non_negative CHECK (request_count >= 0),
    CONSTRAINT chk_s3_endpoint CHECK (provider <> 's3' OR endpoint IS NOT NULL)
);
";
