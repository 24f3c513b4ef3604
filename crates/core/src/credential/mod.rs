//! Tenant credentials and the store that holds them.
//!
//! This module provides:
//! - The tenant credential record and its upload destination
//! - The `CredentialStore` / `CounterTransaction` traits implemented by the db crate
//! - API key generation and hashing

mod api_key;
mod error;
mod store;
mod types;

pub use api_key::{generate_api_key, hash_api_key};
pub use error::CredentialError;
pub use store::{CounterTransaction, CredentialStore};
pub use types::{Destination, DestinationProvider, TenantCredential};
