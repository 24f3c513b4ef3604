//! Tenant repository for database operations.
//!
//! Backs the relay's credential store: API-key lookup and transactional
//! usage counters. Also provisions tenants, keys and destinations.

use chrono::{DateTime, Utc};
use ferry_core::credential::{
    CounterTransaction, CredentialError, CredentialStore, Destination, DestinationProvider,
    TenantCredential, generate_api_key, hash_api_key,
};
use ferry_shared::TenantId;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, Set, SqlErr, TransactionTrait,
};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::entities::{tenants, upload_destinations};

/// Tenant repository errors.
#[derive(Debug, Error)]
pub enum TenantError {
    /// Tenant does not exist.
    #[error("tenant not found: {0}")]
    NotFound(TenantId),

    /// Another tenant already uses the email.
    #[error("email already registered: {0}")]
    EmailTaken(String),

    /// The tenant already registered a destination.
    #[error("tenant {0} already has an upload destination")]
    DestinationExists(TenantId),

    /// The tenant has not registered a destination yet.
    #[error("tenant {0} has no upload destination")]
    NoDestination(TenantId),

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] DbErr),
}

/// A newly created tenant and its one-time API key.
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionedTenant {
    /// Tenant ID.
    pub tenant_id: TenantId,
    /// Contact email.
    pub email: String,
    /// Plain API key; only its hash is stored.
    pub api_key: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Usage counter snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TenantUsage {
    /// Tenant ID.
    pub tenant_id: TenantId,
    /// Destination provider.
    pub provider: DestinationProvider,
    /// Successfully relayed uploads.
    pub request_count: i64,
    /// Last counter or destination change.
    pub updated_at: DateTime<Utc>,
}

/// Tenant repository.
#[derive(Debug, Clone)]
pub struct TenantRepository {
    db: DatabaseConnection,
}

impl TenantRepository {
    /// Creates a new tenant repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Creates a tenant and issues its first API key.
    ///
    /// # Errors
    ///
    /// Returns `EmailTaken` if the email is registered, or a database error.
    pub async fn create_tenant(&self, email: &str) -> Result<ProvisionedTenant, TenantError> {
        let now = Utc::now();
        let api_key = generate_api_key();

        let tenant = tenants::ActiveModel {
            id: Set(Uuid::now_v7()),
            email: Set(email.to_string()),
            api_key_hash: Set(hash_api_key(&api_key)),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&self.db)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => TenantError::EmailTaken(email.to_string()),
            _ => TenantError::Database(e),
        })?;

        let tenant_id = TenantId::from(tenant.id);
        info!(tenant_id = %tenant_id, "Tenant created");

        Ok(ProvisionedTenant {
            tenant_id,
            email: tenant.email,
            api_key,
            created_at: now,
        })
    }

    /// Finds a tenant by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn find_tenant(&self, tenant_id: TenantId) -> Result<Option<tenants::Model>, DbErr> {
        tenants::Entity::find_by_id(tenant_id.into_inner())
            .one(&self.db)
            .await
    }

    /// Replaces the tenant's API key. The old key stops resolving immediately.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the tenant does not exist, or a database error.
    pub async fn rotate_api_key(&self, tenant_id: TenantId) -> Result<String, TenantError> {
        let api_key = generate_api_key();

        let result = tenants::Entity::update_many()
            .col_expr(tenants::Column::ApiKeyHash, Expr::value(hash_api_key(&api_key)))
            .col_expr(tenants::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(tenants::Column::Id.eq(tenant_id.into_inner()))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(TenantError::NotFound(tenant_id));
        }

        info!(tenant_id = %tenant_id, "API key rotated");
        Ok(api_key)
    }

    /// Registers the tenant's upload destination. A tenant has at most one.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown tenant, `DestinationExists` if one is
    /// already registered, or a database error.
    pub async fn register_destination(
        &self,
        tenant_id: TenantId,
        destination: &Destination,
    ) -> Result<TenantUsage, TenantError> {
        let txn = self.db.begin().await?;

        if tenants::Entity::find_by_id(tenant_id.into_inner())
            .one(&txn)
            .await?
            .is_none()
        {
            return Err(TenantError::NotFound(tenant_id));
        }

        let now = Utc::now();
        let model = upload_destinations::ActiveModel {
            tenant_id: Set(tenant_id.into_inner()),
            provider: Set(destination.provider.as_str().to_string()),
            name: Set(destination.name.clone()),
            access_key: Set(destination.access_key.clone()),
            secret: Set(destination.secret.clone()),
            endpoint: Set(destination.endpoint.clone()),
            region: Set(destination.region.clone()),
            request_count: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        }
        .insert(&txn)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => TenantError::DestinationExists(tenant_id),
            _ => TenantError::Database(e),
        })?;

        txn.commit().await?;

        info!(tenant_id = %tenant_id, provider = %model.provider, "Upload destination registered");
        Ok(TenantUsage {
            tenant_id,
            provider: destination.provider,
            request_count: model.request_count,
            updated_at: now,
        })
    }

    /// Reads the tenant's usage counter.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `NoDestination`, or a database error.
    pub async fn usage(&self, tenant_id: TenantId) -> Result<TenantUsage, TenantError> {
        let found = tenants::Entity::find_by_id(tenant_id.into_inner())
            .find_also_related(upload_destinations::Entity)
            .one(&self.db)
            .await?;

        match found {
            None => Err(TenantError::NotFound(tenant_id)),
            Some((_, None)) => Err(TenantError::NoDestination(tenant_id)),
            Some((_, Some(destination))) => {
                let provider = parse_provider(&destination.provider)
                    .map_err(|e| TenantError::Database(DbErr::Custom(e.to_string())))?;
                Ok(TenantUsage {
                    tenant_id,
                    provider,
                    request_count: destination.request_count,
                    updated_at: destination.updated_at.with_timezone(&Utc),
                })
            }
        }
    }
}

impl CredentialStore for TenantRepository {
    type Transaction = TenantTransaction;

    async fn lookup(&self, api_key: &str) -> Result<Option<TenantCredential>, CredentialError> {
        let model = upload_destinations::Entity::find()
            .inner_join(tenants::Entity)
            .filter(tenants::Column::ApiKeyHash.eq(hash_api_key(api_key)))
            .one(&self.db)
            .await
            .map_err(|e| CredentialError::store(e.to_string()))?;

        model.map(to_credential).transpose()
    }

    async fn begin(&self) -> Result<TenantTransaction, CredentialError> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| CredentialError::store(e.to_string()))?;
        Ok(TenantTransaction { txn })
    }
}

/// Usage-counter transaction over a database transaction.
///
/// Dropping it without `commit` rolls the database transaction back.
pub struct TenantTransaction {
    txn: DatabaseTransaction,
}

impl std::fmt::Debug for TenantTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantTransaction").finish_non_exhaustive()
    }
}

impl CounterTransaction for TenantTransaction {
    async fn increment_counter(&mut self, tenant_id: TenantId, delta: i64) -> Result<(), CredentialError> {
        // Single-statement read-modify-write; concurrent increments serialize on the row.
        let result = upload_destinations::Entity::update_many()
            .col_expr(
                upload_destinations::Column::RequestCount,
                Expr::col(upload_destinations::Column::RequestCount).add(delta),
            )
            .col_expr(upload_destinations::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(upload_destinations::Column::TenantId.eq(tenant_id.into_inner()))
            .exec(&self.txn)
            .await
            .map_err(|e| CredentialError::store(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(CredentialError::TenantNotFound(tenant_id));
        }
        Ok(())
    }

    async fn commit(self) -> Result<(), CredentialError> {
        self.txn
            .commit()
            .await
            .map_err(|e| CredentialError::store(e.to_string()))
    }

    async fn rollback(self) -> Result<(), CredentialError> {
        self.txn
            .rollback()
            .await
            .map_err(|e| CredentialError::store(e.to_string()))
    }
}

fn parse_provider(value: &str) -> Result<DestinationProvider, CredentialError> {
    DestinationProvider::parse(value)
        .ok_or_else(|| CredentialError::store(format!("unknown destination provider: {value}")))
}

fn to_credential(model: upload_destinations::Model) -> Result<TenantCredential, CredentialError> {
    let provider = parse_provider(&model.provider)?;

    Ok(TenantCredential {
        tenant_id: TenantId::from(model.tenant_id),
        destination: Destination {
            provider,
            name: model.name,
            access_key: model.access_key,
            secret: model.secret,
            endpoint: model.endpoint,
            region: model.region,
        },
        request_count: model.request_count,
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
