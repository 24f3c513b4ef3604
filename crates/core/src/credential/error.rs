//! Credential store error types.

use ferry_shared::TenantId;
use thiserror::Error;

/// Credential store errors.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No counter row exists for the tenant.
    #[error("no destination registered for tenant {0}")]
    TenantNotFound(TenantId),

    /// The transaction was already committed or rolled back.
    #[error("transaction is no longer active")]
    TransactionClosed,

    /// Underlying store operation failed.
    #[error("credential store error: {0}")]
    Store(String),
}

impl CredentialError {
    /// Create a store error.
    #[must_use]
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}
