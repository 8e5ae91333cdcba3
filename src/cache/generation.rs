//! Generation counter.
//!
//! A single integer in the shared store defines the cache's freshness epoch.
//! Every cache key embeds a generation, so bumping the counter makes all
//! current keys miss on their next lookup while the old entries stay in the
//! store for stale serving.

use bytes::Bytes;
use tracing::{debug, warn};

use super::backend::CacheBackend;
use super::store::StoreError;

/// Freshness epoch. Starts at 1 and only ever grows.
pub type Generation = u64;

pub const INITIAL_GENERATION: Generation = 1;

#[derive(Clone)]
pub struct GenerationCounter {
    backend: CacheBackend,
    key: String,
}

impl GenerationCounter {
    pub fn new(backend: CacheBackend, key: impl Into<String>) -> Self {
        Self {
            backend,
            key: key.into(),
        }
    }

    /// Store key holding the counter.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Advances the generation by one, creating the counter at 1 if absent.
    ///
    /// A counter holding a non-integer is left untouched and reported:
    /// resetting it would move the generation backwards.
    pub async fn bump(&self) -> Result<Generation, StoreError> {
        match self.backend.increment(&self.key).await {
            Ok(value) => Ok(to_generation(value)),
            Err(err @ StoreError::NotAnInteger { .. }) => {
                warn!(counter = %self.key, "generation counter is not an integer");
                Err(err)
            }
            Err(StoreError::NotFound { .. }) => {
                debug!(counter = %self.key, "initializing generation counter");
                self.backend
                    .set(&self.key, Bytes::from(INITIAL_GENERATION.to_string()), None)
                    .await?;
                Ok(INITIAL_GENERATION)
            }
            Err(err) => Err(err),
        }
    }

    /// Reads the current generation; an absent counter reads as 1.
    pub async fn current(&self) -> Result<Generation, StoreError> {
        let Some(raw) = self.backend.get(&self.key).await? else {
            return Ok(INITIAL_GENERATION);
        };

        std::str::from_utf8(&raw)
            .ok()
            .and_then(|text| text.trim().parse::<i64>().ok())
            .map(to_generation)
            .ok_or_else(|| StoreError::NotAnInteger {
                key: self.key.clone(),
            })
    }
}

fn to_generation(value: i64) -> Generation {
    Generation::try_from(value)
        .unwrap_or(INITIAL_GENERATION)
        .max(INITIAL_GENERATION)
}
