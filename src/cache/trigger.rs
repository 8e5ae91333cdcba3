//! Invalidation trigger.
//!
//! Turns write events into generation bumps. Every write to a
//! non-whitelisted entity type invalidates the whole cache at once; pages
//! rebuilt afterwards land under new keys.

use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::config::CacheConfig;
use super::events::{WriteEvent, WriteKind};
use super::generation::{Generation, GenerationCounter};
use super::store::StoreError;

const METRIC_GENERATION_BUMP_TOTAL: &str = "genpage_generation_bump_total";

/// Bumps the generation counter on write events.
#[derive(Clone)]
pub struct InvalidationTrigger {
    config: CacheConfig,
    counter: GenerationCounter,
}

impl InvalidationTrigger {
    pub fn new(config: CacheConfig, counter: GenerationCounter) -> Self {
        Self { config, counter }
    }

    /// Applies one write event.
    ///
    /// Returns the new generation, or `None` when the entity type is whitelisted.
    pub async fn handle(&self, event: &WriteEvent) -> Result<Option<Generation>, StoreError> {
        if self.config.is_whitelisted(&event.entity_type) {
            debug!(
                event_id = %event.id,
                entity_type = %event.entity_type,
                write = event.kind.as_str(),
                "Write to whitelisted entity ignored"
            );
            return Ok(None);
        }

        let generation = self.counter.bump().await?;
        counter!(METRIC_GENERATION_BUMP_TOTAL).increment(1);
        info!(
            event_id = %event.id,
            entity_type = %event.entity_type,
            write = event.kind.as_str(),
            generation,
            "Cache generation bumped"
        );
        Ok(Some(generation))
    }

    /// An entity of `entity_type` was created or updated.
    pub async fn entity_saved(&self, entity_type: &str) -> Result<Option<Generation>, StoreError> {
        self.handle(&WriteEvent::new(entity_type, WriteKind::Saved))
            .await
    }

    /// An entity of `entity_type` is about to be deleted.
    pub async fn entity_deleting(
        &self,
        entity_type: &str,
    ) -> Result<Option<Generation>, StoreError> {
        self.handle(&WriteEvent::new(entity_type, WriteKind::Deleting))
            .await
    }

    /// Invalidates everything unconditionally. Also creates the counter if absent.
    pub async fn clear_cache(&self) -> Result<Generation, StoreError> {
        let generation = self.counter.bump().await?;
        counter!(METRIC_GENERATION_BUMP_TOTAL).increment(1);
        info!(generation, "Cache cleared");
        Ok(generation)
    }

    /// Drains `events` on a background task until every sender is dropped.
    ///
    /// Store failures are logged per event; the stream keeps going.
    pub fn listen(self, mut events: mpsc::Receiver<WriteEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Err(err) = self.handle(&event).await {
                    warn!(
                        event_id = %event.id,
                        entity_type = %event.entity_type,
                        error = %err,
                        "Failed to bump cache generation"
                    );
                }
            }
            debug!("Write event stream closed");
        })
    }
}
