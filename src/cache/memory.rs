//! In-process [`KeyValueStore`] backed by a bounded LRU map.
//!
//! Every operation takes the same mutex, which makes `increment` and `add`
//! atomic. Expired entries are dropped lazily when touched.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use metrics::counter;

use super::lock::mutex_lock;
use super::store::{KeyValueStore, StoreError};

const SOURCE: &str = "cache::memory";
const METRIC_MEMORY_EVICT_TOTAL: &str = "genpage_memory_evict_total";
pub const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

#[derive(Clone)]
struct MemoryEntry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    /// A TTL too large to represent as an instant never expires.
    fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Bounded in-memory store.
pub struct MemoryStore {
    entries: Mutex<LruCache<String, MemoryEntry>>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, including expired ones not yet touched.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(entries: &mut LruCache<String, MemoryEntry>, key: &str, entry: MemoryEntry) {
        if let Some((evicted, _)) = entries.push(key.to_string(), entry)
            && evicted != key
        {
            counter!(METRIC_MEMORY_EVICT_TOTAL).increment(1);
        }
    }

    /// Returns the live entry at `key`, dropping it first if it has expired.
    fn live<'a>(
        entries: &'a mut LruCache<String, MemoryEntry>,
        key: &str,
    ) -> Option<&'a mut MemoryEntry> {
        let now = Instant::now();
        if entries.peek(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.pop(key);
            return None;
        }
        entries.get_mut(key)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        Ok(Self::live(&mut entries, key).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "set");
        Self::insert(&mut entries, key, MemoryEntry::new(value, ttl));
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, StoreError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "increment");
        let Some(entry) = Self::live(&mut entries, key) else {
            return Err(StoreError::NotFound {
                key: key.to_string(),
            });
        };

        let current = std::str::from_utf8(&entry.value)
            .ok()
            .and_then(|text| text.trim().parse::<i64>().ok())
            .ok_or_else(|| StoreError::NotAnInteger {
                key: key.to_string(),
            })?;
        let next = current.saturating_add(1);
        entry.value = Bytes::from(next.to_string());
        Ok(next)
    }

    async fn add(
        &self,
        key: &str,
        value: Bytes,
        ttl: Option<Duration>,
    ) -> Result<bool, StoreError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "add");
        if Self::live(&mut entries, key).is_some() {
            return Ok(false);
        }
        Self::insert(&mut entries, key, MemoryEntry::new(value, ttl));
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        mutex_lock(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }
}
