//! Key-value store contract.
//!
//! The page cache keeps all of its shared state (generation counter, cached
//! pages, regeneration locks) in a store implementing [`KeyValueStore`]. Any
//! number of server processes sharing one store observe the same state.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors surfaced by a [`KeyValueStore`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// `increment` was called on a key that does not exist.
    #[error("key `{key}` not found")]
    NotFound { key: String },
    /// `increment` was called on a value that is not a decimal integer.
    #[error("value at `{key}` is not an integer")]
    NotAnInteger { key: String },
    /// The store could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The operation did not complete within the configured timeout.
    #[error("store operation `{op}` timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Communication failures, as opposed to answers about the data.
    pub fn is_communication(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout { .. })
    }
}

/// Shared key-value store with per-key expiry.
///
/// A `ttl` of `None` stores the value without expiry. `increment` and `add`
/// must be atomic with respect to concurrent callers: the generation counter
/// and the regeneration lock rely on them for coordination.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Atomically increments the integer at `key` and returns the new value.
    ///
    /// Fails with [`StoreError::NotFound`] when the key is absent.
    async fn increment(&self, key: &str) -> Result<i64, StoreError>;

    /// Stores `value` only if `key` is absent. Returns `true` when created.
    async fn add(&self, key: &str, value: Bytes, ttl: Option<Duration>)
    -> Result<bool, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
