//! Timeout-bounded access to the shared store.
//!
//! Every call goes through `tokio::time::timeout`, so a wedged store shows
//! up as [`StoreError::Timeout`] instead of a hung request.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use tracing::warn;

use super::store::{KeyValueStore, StoreError};

const METRIC_STORE_ERROR_TOTAL: &str = "genpage_store_error_total";

#[derive(Clone)]
pub struct CacheBackend {
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
}

impl CacheBackend {
    pub fn new(store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// The wrapped store, without the timeout.
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.bounded("get", key, self.store.get(key)).await
    }

    pub async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.bounded("set", key, self.store.set(key, value, ttl)).await
    }

    pub async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        self.bounded("increment", key, self.store.increment(key)).await
    }

    pub async fn add(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        self.bounded("add", key, self.store.add(key, value, ttl)).await
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.bounded("delete", key, self.store.delete(key)).await
    }

    async fn bounded<T, F>(&self, op: &'static str, key: &str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout {
                op,
                after: self.timeout,
            }),
        };

        if let Err(err) = &result
            && err.is_communication()
        {
            warn!(op, cache_key = key, error = %err, "Store operation failed");
            counter!(METRIC_STORE_ERROR_TOTAL, "op" => op).increment(1);
        }

        result
    }
}
