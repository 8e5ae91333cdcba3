//! Regeneration lock and background rebuild pool.
//!
//! At most one process rebuilds a given page at a time: the rebuilder claims
//! `<key>:locked` with an add-if-absent write. A crashed holder is recovered
//! by the lock's TTL.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};
use uuid::Uuid;

use super::backend::CacheBackend;
use super::keys::CacheKey;
use super::store::StoreError;

/// Proof of a held regeneration lock. Hand it back to
/// [`RegenerationLock::release`] when done.
#[derive(Debug)]
#[must_use = "a held lock blocks rebuilds until released or expired"]
pub struct LockToken {
    lock_key: String,
    marker: Uuid,
}

impl LockToken {
    pub fn lock_key(&self) -> &str {
        &self.lock_key
    }

    pub fn marker(&self) -> Uuid {
        self.marker
    }
}

#[derive(Clone)]
pub struct RegenerationLock {
    backend: CacheBackend,
    ttl: Duration,
}

impl RegenerationLock {
    pub fn new(backend: CacheBackend, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// Tries to claim the lock for `key`. `Ok(None)` means someone else holds it.
    pub async fn acquire(&self, key: &CacheKey) -> Result<Option<LockToken>, StoreError> {
        let lock_key = key.lock_key();
        let marker = Uuid::new_v4();
        let created = self
            .backend
            .add(&lock_key, Bytes::from(marker.to_string()), Some(self.ttl))
            .await?;

        Ok(created.then_some(LockToken { lock_key, marker }))
    }

    /// Releases a held lock. Failures are logged; the TTL cleans up after them.
    ///
    /// The lock is only deleted while it still carries this token's marker, so
    /// a holder that outlived the TTL cannot drop a successor's lock. The check
    /// and the delete are separate store calls.
    pub async fn release(&self, token: LockToken) {
        let result = match self.backend.get(&token.lock_key).await {
            Ok(Some(current)) if current.as_ref() == token.marker.to_string().as_bytes() => {
                self.backend.delete(&token.lock_key).await
            }
            Ok(_) => {
                debug!(lock_key = %token.lock_key, "Regeneration lock expired before release");
                Ok(())
            }
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            warn!(
                lock_key = %token.lock_key,
                error = %err,
                "Failed to release regeneration lock"
            );
        }
    }
}

/// Result of one background rebuild attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// A fresh page was stored under the current key.
    Stored,
    /// The handler ran but its response may not be cached.
    Uncacheable,
    /// Another rebuild already holds the lock.
    Locked,
    /// The pool was full; the rebuild was skipped.
    Saturated,
    /// The store or the handler failed.
    Failed,
}

impl RebuildOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stored => "stored",
            Self::Uncacheable => "uncacheable",
            Self::Locked => "locked",
            Self::Saturated => "saturated",
            Self::Failed => "failed",
        }
    }
}

/// Caps the number of background rebuilds running at once.
#[derive(Clone)]
pub struct RebuildPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl RebuildPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Rebuilds currently running.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// Claims a slot without waiting. `None` when the pool is saturated.
    pub fn try_reserve(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.permits).try_acquire_owned().ok()
    }
}
