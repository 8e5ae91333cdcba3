//! Generational page cache.
//!
//! Whole rendered pages are stored in a shared key-value store under keys
//! derived from the request identity and a global generation number:
//!
//! - **Generation counter**: one integer in the store. Any write to a
//!   non-whitelisted entity bumps it, which makes every current key miss.
//! - **Stale-while-revalidate**: on a miss, older generations are searched
//!   and served immediately while a background task renders the page again.
//! - **Regeneration lock**: an add-if-absent marker so that only one rebuild
//!   per page runs at a time, across all processes sharing the store.
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `genpage.toml`:
//!
//! ```toml
//! [cache]
//! key_prefix = "gp"
//! max_generation_regression = 25
//! invalidation_whitelist = ["sessions.session"]
//! # ... see config.rs for all options
//! ```

mod backend;
mod config;
mod entry;
mod events;
mod generation;
mod keys;
mod lock;
mod memory;
mod middleware;
mod policy;
mod protocol;
mod regeneration;
mod store;
mod trigger;

pub use backend::CacheBackend;
pub use config::CacheConfig;
pub use entry::{CachedPage, EntryDecodeError};
pub use events::{WriteEvent, WriteKind};
pub use generation::{Generation, GenerationCounter, INITIAL_GENERATION};
pub use keys::{CacheKey, RequestIdentity, derive_key, derive_previous_key, iri_to_uri};
pub use memory::{DEFAULT_MEMORY_CAPACITY, MemoryStore};
pub use middleware::{CachedRoute, page_cache_layer};
pub use policy::{
    CsrfTokenUsed, UnresolvedRoutePolicy, Visitor, request_is_cacheable, response_is_cacheable,
};
pub use protocol::{CachePage, Outcome, PageCache, Ttl};
pub use regeneration::{LockToken, RebuildOutcome, RebuildPool, RegenerationLock};
pub use store::{KeyValueStore, StoreError};
pub use trigger::InvalidationTrigger;
