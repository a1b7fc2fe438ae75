//! Key-value store abstraction.
//!
//! Aggregates are stored as JSON under one key each. Request processing
//! writes unconditionally; response processing writes with
//! [`KeyValueStore::compare_and_set`] so concurrent outcomes for the same
//! aggregate cannot overwrite each other.

use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Failed to connect to the store
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A command failed
    #[error("Store operation '{operation}' failed for key '{key}': {reason}")]
    OperationFailed {
        /// Operation name (`get`, `set`, `compare_and_set`)
        operation: &'static str,
        /// The key involved
        key: String,
        /// The reason for failure
        reason: String,
    },
}

/// Result of a conditional write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored value matched and was replaced
    Written,
    /// The stored value changed since it was read; nothing was written
    Conflict,
}

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Trait for key-value store implementations.
///
/// Uses explicit boxed futures so it can be shared as `Arc<dyn KeyValueStore>`.
pub trait KeyValueStore: Send + Sync {
    /// Read a value; `None` when the key is absent.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<Vec<u8>>>;

    /// Write a value unconditionally.
    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> StoreFuture<'a, ()>;

    /// Write `value` only if the key still holds `expected`.
    ///
    /// `expected = None` means the key must be absent.
    fn compare_and_set<'a>(
        &'a self,
        key: &'a str,
        expected: Option<Vec<u8>>,
        value: Vec<u8>,
    ) -> StoreFuture<'a, CasOutcome>;
}
