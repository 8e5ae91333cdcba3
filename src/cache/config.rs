//! Page cache configuration.
//!
//! Built from the `[cache]` and `[store]` sections of the resolved [`Settings`].

use std::collections::HashSet;
use std::time::Duration;

use super::policy::UnresolvedRoutePolicy;
use crate::config::Settings;

// Default values for cache configuration
const DEFAULT_KEY_PREFIX: &str = "gp";
const DEFAULT_MAX_GENERATION_REGRESSION: u32 = 25;
const DEFAULT_LOCK_TTL_SECS: u64 = 15 * 60;
const DEFAULT_LANGUAGE: &str = "en-us";
const DEFAULT_MAX_BACKGROUND_REBUILDS: usize = 16;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;
const DEFAULT_STORE_TIMEOUT_MS: u64 = 250;

/// Runtime configuration of the page cache engine.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Global kill switch: nothing is read from or written to the store.
    pub disabled: bool,
    /// Prefix for every key, including the generation counter.
    pub key_prefix: String,
    /// TTL for cached pages when a route sets none. `None` caches forever.
    pub default_ttl: Option<Duration>,
    /// How many generations back a miss may look for a stale copy.
    pub max_generation_regression: u32,
    /// Expiry of a regeneration lock left behind by a crashed rebuild.
    pub lock_ttl: Duration,
    /// Entity types whose writes never invalidate the cache.
    pub invalidation_whitelist: HashSet<String>,
    /// Whether the authenticated user participates in the key.
    pub user_specific: bool,
    /// Whether the (sorted) query string participates in the key.
    pub key_includes_query: bool,
    /// What to do with requests that matched no route.
    pub unresolved_routes: UnresolvedRoutePolicy,
    /// Language used in keys when the request carries none.
    pub default_language: String,
    /// Upper bound on concurrently running background rebuilds.
    pub max_background_rebuilds: usize,
    /// Responses with larger bodies are served but not stored.
    pub max_body_bytes: usize,
    /// Deadline applied to every store operation.
    pub store_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            disabled: false,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            default_ttl: None,
            max_generation_regression: DEFAULT_MAX_GENERATION_REGRESSION,
            lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            invalidation_whitelist: HashSet::new(),
            user_specific: true,
            key_includes_query: false,
            unresolved_routes: UnresolvedRoutePolicy::Exclude,
            default_language: DEFAULT_LANGUAGE.to_string(),
            max_background_rebuilds: DEFAULT_MAX_BACKGROUND_REBUILDS,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
        }
    }
}

impl From<&Settings> for CacheConfig {
    fn from(settings: &Settings) -> Self {
        let cache = &settings.cache;
        Self {
            disabled: cache.disabled,
            key_prefix: cache.key_prefix.clone(),
            default_ttl: cache.default_ttl,
            max_generation_regression: cache.max_generation_regression.get(),
            lock_ttl: cache.lock_ttl,
            invalidation_whitelist: cache.invalidation_whitelist.clone(),
            user_specific: cache.user_specific,
            key_includes_query: cache.key_includes_query,
            unresolved_routes: if cache.cache_unresolved_routes {
                UnresolvedRoutePolicy::Allow
            } else {
                UnresolvedRoutePolicy::Exclude
            },
            default_language: cache.default_language.clone(),
            max_background_rebuilds: cache.max_background_rebuilds.get(),
            max_body_bytes: cache.max_body_bytes.get(),
            store_timeout: settings.store.timeout,
        }
    }
}

impl CacheConfig {
    /// Returns true unless the global kill switch is set.
    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Name of the generation counter in the store.
    pub fn generation_key(&self) -> String {
        format!("{}_gen", self.key_prefix)
    }

    /// Returns true if writes to `entity_type` must leave the cache alone.
    pub fn is_whitelisted(&self, entity_type: &str) -> bool {
        self.invalidation_whitelist.contains(entity_type)
    }

    /// Returns the background rebuild cap, clamping to 1 if zero.
    pub fn max_background_rebuilds_non_zero(&self) -> usize {
        self.max_background_rebuilds.max(1)
    }
}
