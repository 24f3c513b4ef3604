//! Usage accounting transaction.

use ferry_shared::TenantId;

use crate::credential::{CounterTransaction, CredentialError};

/// Lifecycle of an accounting transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountingState {
    /// Open; increments are pending.
    Began,
    /// Increments are durable.
    Committed,
    /// Increments were discarded.
    RolledBack,
}

/// Rollback-by-default wrapper around a [`CounterTransaction`].
///
/// The transaction starts in [`AccountingState::Began`] and moves exactly once
/// to `Committed` or `RolledBack`. Callers must end it explicitly: every path
/// that does not reach [`Accounting::commit`] calls [`Accounting::rollback`].
#[derive(Debug)]
pub struct Accounting<T> {
    txn: Option<T>,
    state: AccountingState,
}

impl<T: CounterTransaction> Accounting<T> {
    /// Wrap a freshly begun transaction.
    #[must_use]
    pub const fn new(txn: T) -> Self {
        Self {
            txn: Some(txn),
            state: AccountingState::Began,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> AccountingState {
        self.state
    }

    /// Add `delta` to the tenant's counter inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns `TransactionClosed` once the transaction has ended, or the
    /// store's error.
    pub async fn increment(&mut self, tenant_id: TenantId, delta: i64) -> Result<(), CredentialError> {
        let txn = self.txn.as_mut().ok_or(CredentialError::TransactionClosed)?;
        txn.increment_counter(tenant_id, delta).await
    }

    /// Commit pending increments.
    ///
    /// A failed commit leaves the transaction `RolledBack`: the store
    /// guarantees nothing from it persists.
    ///
    /// # Errors
    ///
    /// Returns `TransactionClosed` if the transaction already ended, or the
    /// store's commit error.
    pub async fn commit(&mut self) -> Result<(), CredentialError> {
        let txn = self.txn.take().ok_or(CredentialError::TransactionClosed)?;
        let result = txn.commit().await;
        self.state = if result.is_ok() {
            AccountingState::Committed
        } else {
            AccountingState::RolledBack
        };
        result
    }

    /// Discard pending increments. A no-op once rolled back.
    ///
    /// # Errors
    ///
    /// Returns `TransactionClosed` after a commit, or the store's rollback
    /// error. The state is `RolledBack` either way.
    pub async fn rollback(&mut self) -> Result<(), CredentialError> {
        match self.state {
            AccountingState::RolledBack => Ok(()),
            AccountingState::Committed => Err(CredentialError::TransactionClosed),
            AccountingState::Began => {
                self.state = AccountingState::RolledBack;
                match self.txn.take() {
                    Some(txn) => txn.rollback().await,
                    None => Ok(()),
                }
            }
        }
    }
}
