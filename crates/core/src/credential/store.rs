//! Store traits consumed by the relay.

use std::future::Future;

use ferry_shared::TenantId;

use super::error::CredentialError;
use super::types::TenantCredential;

/// Persistent mapping from API key to tenant credential record.
///
/// This trait is implemented by the db crate to provide actual database operations.
pub trait CredentialStore: Send + Sync + 'static {
    /// Transaction type used for counter updates.
    type Transaction: CounterTransaction;

    /// Look up the credential record for a raw API key.
    fn lookup(
        &self,
        api_key: &str,
    ) -> impl Future<Output = Result<Option<TenantCredential>, CredentialError>> + Send;

    /// Begin a transaction for counter updates.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, CredentialError>> + Send;
}

/// A transaction over tenant usage counters.
///
/// `commit` is all-or-nothing: a rollback, or dropping the transaction before
/// `commit` returns, leaves every counter unchanged.
pub trait CounterTransaction: Send + 'static {
    /// Add `delta` to the tenant's request counter.
    fn increment_counter(
        &mut self,
        tenant_id: TenantId,
        delta: i64,
    ) -> impl Future<Output = Result<(), CredentialError>> + Send;

    /// Commit all increments made in this transaction.
    fn commit(self) -> impl Future<Output = Result<(), CredentialError>> + Send;

    /// Discard all increments made in this transaction.
    fn rollback(self) -> impl Future<Output = Result<(), CredentialError>> + Send;
}
