//! Serving protocol.
//!
//! Each cacheable request ends in one of four states:
//!
//! - **Bypass**: not cacheable, or the generation is unreadable. The handler
//!   runs and its response passes through untouched.
//! - **Exact hit**: the page exists at the current generation.
//! - **Stale hit**: an older generation has the page. It is served at once and
//!   a background task rebuilds the current one.
//! - **Miss**: the handler runs and a cacheable response is stored.
//!
//! The store is never allowed to fail a request. Read failures count as
//! misses, write failures are dropped.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{Body, HttpBody};
use axum::http::{Request, Response, StatusCode, request};
use axum::response::IntoResponse;
use futures::FutureExt;
use http_body_util::BodyExt;
use metrics::{counter, histogram};
use tracing::{debug, error, warn};

use super::backend::CacheBackend;
use super::config::CacheConfig;
use super::entry::{CachedPage, set_etag};
use super::generation::{Generation, GenerationCounter};
use super::keys::{CacheKey, RequestIdentity, derive_key, derive_previous_key};
use super::policy::{request_is_cacheable, response_is_cacheable};
use super::regeneration::{RebuildOutcome, RebuildPool, RegenerationLock};
use super::store::{KeyValueStore, StoreError};
use super::trigger::InvalidationTrigger;

const METRIC_REQUEST_TOTAL: &str = "genpage_request_total";
const METRIC_REBUILD_TOTAL: &str = "genpage_rebuild_total";
const METRIC_REBUILD_MS: &str = "genpage_rebuild_ms";

/// How a request was served. Attached to every response as an extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Bypass,
    ExactHit,
    StaleHitRefresh,
    MissFill,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bypass => "bypass",
            Self::ExactHit => "exact_hit",
            Self::StaleHitRefresh => "stale_hit_refresh",
            Self::MissFill => "miss_fill",
        }
    }
}

/// Lifetime of a stored page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Ttl {
    /// Use [`CacheConfig::default_ttl`].
    #[default]
    Default,
    /// Expire after the given duration. Zero means forever.
    Expires(Duration),
    /// Never expire.
    Forever,
}

impl Ttl {
    /// Resolves to the store TTL; `None` stores without expiry.
    pub fn resolve(self, config: &CacheConfig) -> Option<Duration> {
        match self {
            Self::Default => config.default_ttl,
            Self::Expires(ttl) => Some(ttl),
            Self::Forever => None,
        }
        .filter(|ttl| !ttl.is_zero())
    }
}

/// Per-route cache settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePage {
    pub ttl: Ttl,
}

impl CachePage {
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Ttl::Expires(ttl);
        self
    }

    pub fn forever(mut self) -> Self {
        self.ttl = Ttl::Forever;
        self
    }
}

/// What became of a response offered to the store.
enum Fill {
    Stored,
    Uncacheable,
    Failed,
}

/// The page cache engine. Cheap to clone.
#[derive(Clone)]
pub struct PageCache {
    inner: Arc<Inner>,
}

struct Inner {
    config: CacheConfig,
    backend: CacheBackend,
    generation: GenerationCounter,
    lock: RegenerationLock,
    pool: RebuildPool,
    trigger: InvalidationTrigger,
}

impl PageCache {
    /// Builds the engine over `store`. Does not touch the store.
    pub fn new(config: CacheConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let backend = CacheBackend::new(store, config.store_timeout);
        let generation = GenerationCounter::new(backend.clone(), config.generation_key());
        let lock = RegenerationLock::new(backend.clone(), config.lock_ttl);
        let pool = RebuildPool::new(config.max_background_rebuilds_non_zero());
        let trigger = InvalidationTrigger::new(config.clone(), generation.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                backend,
                generation,
                lock,
                pool,
                trigger,
            }),
        }
    }

    /// Settings for a cached route, starting from the default TTL.
    pub fn page() -> CachePage {
        CachePage::default()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn generation(&self) -> &GenerationCounter {
        &self.inner.generation
    }

    pub fn trigger(&self) -> &InvalidationTrigger {
        &self.inner.trigger
    }

    /// Invalidates every cached page. See [`InvalidationTrigger::clear_cache`].
    pub async fn clear_cache(&self) -> Result<Generation, StoreError> {
        self.inner.trigger.clear_cache().await
    }

    /// Background rebuilds currently running in this process.
    pub fn rebuilds_in_flight(&self) -> usize {
        self.inner.pool.in_flight()
    }

    /// Key `request` maps to at `generation`.
    pub fn key_for<B>(&self, request: &Request<B>, generation: Generation) -> CacheKey {
        let identity = RequestIdentity::from_request(&self.inner.config, request);
        derive_key(&self.inner.config.key_prefix, generation, &identity)
    }

    /// Reads a stored page. Store failures and undecodable entries read as absent.
    pub async fn cached(&self, key: &CacheKey) -> Option<CachedPage> {
        let raw = self.inner.backend.get(key.as_str()).await.ok()??;
        match CachedPage::decode(&raw) {
            Ok(page) => Some(page),
            Err(err) => {
                warn!(cache_key = %key, error = %err, "Discarding undecodable cache entry");
                None
            }
        }
    }

    /// Serves `request` through the cache, calling `handler` when a rendering is needed.
    ///
    /// The handler is called at most once on the request path. A stale hit may
    /// call it once more from a background task with a copy of the request head.
    pub async fn serve<H, Fut>(
        &self,
        page: &CachePage,
        request: Request<Body>,
        handler: H,
    ) -> Response<Body>
    where
        H: Fn(Request<Body>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Response<Body>> + Send + 'static,
    {
        let config = &self.inner.config;

        if !request_is_cacheable(config, &request) {
            return finish(handler(request).await, Outcome::Bypass, None);
        }

        let identity = RequestIdentity::from_request(config, &request);
        let generation = match self.inner.generation.current().await {
            Ok(generation) => generation,
            Err(err) => {
                debug!(error = %err, "Generation unavailable, bypassing cache");
                return finish(handler(request).await, Outcome::Bypass, None);
            }
        };

        let key = derive_key(&config.key_prefix, generation, &identity);
        if let Some(cached) = self.cached(&key).await {
            let response = cached.into_response(&key);
            return finish(response, Outcome::ExactHit, Some((&key, generation)));
        }

        for offset in 1..=config.max_generation_regression {
            let Some(stale_key) =
                derive_previous_key(&config.key_prefix, generation, offset, &identity)
            else {
                break;
            };
            if let Some(cached) = self.cached(&stale_key).await {
                let (parts, _) = request.into_parts();
                self.spawn_rebuild(key, parts, page.ttl, handler);
                let response = cached.into_response(&stale_key);
                return finish(
                    response,
                    Outcome::StaleHitRefresh,
                    Some((&stale_key, generation - Generation::from(offset))),
                );
            }
        }

        let response = handler(request).await;
        let (response, _) = self.fill(&key, response, page.ttl).await;
        finish(response, Outcome::MissFill, Some((&key, generation)))
    }

    /// Tags `response` with `key` and stores it if it is cacheable.
    async fn fill(
        &self,
        key: &CacheKey,
        response: Response<Body>,
        ttl: Ttl,
    ) -> (Response<Body>, Fill) {
        let config = &self.inner.config;
        let head_cacheable = response_is_cacheable(config, &response);
        let (mut parts, body) = response.into_parts();
        set_etag(&mut parts.headers, key);

        let too_large = body
            .size_hint()
            .upper()
            .is_some_and(|upper| upper > config.max_body_bytes as u64);
        if !head_cacheable || too_large {
            return (Response::from_parts(parts, body), Fill::Uncacheable);
        }

        let content = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                error!(cache_key = %key, error = %err, "Failed to buffer response body");
                return (StatusCode::INTERNAL_SERVER_ERROR.into_response(), Fill::Failed);
            }
        };
        if content.len() > config.max_body_bytes {
            debug!(cache_key = %key, bytes = content.len(), "Response too large to cache");
            return (Response::from_parts(parts, Body::from(content)), Fill::Uncacheable);
        }

        let entry = match CachedPage::from_parts(&parts.headers, content.clone()).encode() {
            Ok(entry) => entry,
            Err(err) => {
                error!(cache_key = %key, error = %err, "Failed to encode cache entry");
                return (Response::from_parts(parts, Body::from(content)), Fill::Failed);
            }
        };
        let fill = match self
            .inner
            .backend
            .set(key.as_str(), entry, ttl.resolve(config))
            .await
        {
            Ok(()) => Fill::Stored,
            Err(_) => Fill::Failed,
        };
        (Response::from_parts(parts, Body::from(content)), fill)
    }

    /// Starts a detached rebuild of `key` unless the pool is saturated.
    fn spawn_rebuild<H, Fut>(&self, key: CacheKey, parts: request::Parts, ttl: Ttl, handler: H)
    where
        H: Fn(Request<Body>) -> Fut + Send + 'static,
        Fut: Future<Output = Response<Body>> + Send + 'static,
    {
        let Some(permit) = self.inner.pool.try_reserve() else {
            record_rebuild(&key, RebuildOutcome::Saturated, None);
            return;
        };

        let cache = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let started = Instant::now();
            let outcome = cache.rebuild(&key, parts, ttl, handler).await;
            record_rebuild(&key, outcome, Some(started.elapsed()));
        });
    }

    async fn rebuild<H, Fut>(
        &self,
        key: &CacheKey,
        parts: request::Parts,
        ttl: Ttl,
        handler: H,
    ) -> RebuildOutcome
    where
        H: Fn(Request<Body>) -> Fut,
        Fut: Future<Output = Response<Body>>,
    {
        let token = match self.inner.lock.acquire(key).await {
            Ok(Some(token)) => token,
            Ok(None) => return RebuildOutcome::Locked,
            Err(_) => return RebuildOutcome::Failed,
        };

        let request = Request::from_parts(parts, Body::empty());
        let rendered = AssertUnwindSafe(async move { handler(request).await })
            .catch_unwind()
            .await;

        let outcome = match rendered {
            Ok(response) => match self.fill(key, response, ttl).await.1 {
                Fill::Stored => RebuildOutcome::Stored,
                Fill::Uncacheable => RebuildOutcome::Uncacheable,
                Fill::Failed => RebuildOutcome::Failed,
            },
            Err(_) => {
                error!(cache_key = %key, "Handler panicked during background rebuild");
                RebuildOutcome::Failed
            }
        };

        self.inner.lock.release(token).await;
        outcome
    }
}

fn finish(
    mut response: Response<Body>,
    outcome: Outcome,
    served: Option<(&CacheKey, Generation)>,
) -> Response<Body> {
    match served {
        Some((key, generation)) => debug!(
            cache_key = %key,
            generation,
            outcome = outcome.as_str(),
            status = response.status().as_u16(),
            "Page served"
        ),
        None => debug!(outcome = outcome.as_str(), "Page served"),
    }
    counter!(METRIC_REQUEST_TOTAL, "outcome" => outcome.as_str()).increment(1);
    response.extensions_mut().insert(outcome);
    response
}

fn record_rebuild(key: &CacheKey, outcome: RebuildOutcome, elapsed: Option<Duration>) {
    debug!(cache_key = %key, outcome = outcome.as_str(), "Background rebuild finished");
    counter!(METRIC_REBUILD_TOTAL, "outcome" => outcome.as_str()).increment(1);
    if let Some(elapsed) = elapsed {
        histogram!(METRIC_REBUILD_MS).record(elapsed.as_secs_f64() * 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::to_bytes;
    use axum::http::{HeaderValue, Method, header};
    use bytes::Bytes;
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    use super::*;
    use crate::cache::backend::testing::FlakyStore;
    use crate::cache::memory::MemoryStore;
    use crate::cache::policy::UnresolvedRoutePolicy;

    /// Handler that counts calls and renders `body #<call>`.
    #[derive(Clone, Default)]
    struct Counting {
        calls: Arc<AtomicUsize>,
    }

    impl Counting {
        fn handler(
            &self,
        ) -> impl Fn(Request<Body>) -> futures::future::BoxFuture<'static, Response<Body>>
        + Clone
        + Send
        + Sync
        + 'static {
            let calls = Arc::clone(&self.calls);
            move |_request| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    let mut response = Response::new(Body::from(format!("body #{n}")));
                    response
                        .headers_mut()
                        .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                    response
                }
                .boxed()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn config() -> CacheConfig {
        CacheConfig {
            unresolved_routes: UnresolvedRoutePolicy::Allow,
            ..Default::default()
        }
    }

    fn cache_with(config: CacheConfig) -> (PageCache, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        (PageCache::new(config, store.clone()), store)
    }

    fn get(path: &str) -> Request<Body> {
        Request::builder().uri(path).body(Body::empty()).unwrap()
    }

    async fn body_of(response: Response<Body>) -> Bytes {
        to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    async fn settle(cache: &PageCache) {
        for _ in 0..200 {
            if cache.rebuilds_in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("background rebuild did not finish");
    }

    #[test]
    fn ttl_resolution() {
        let mut config = CacheConfig::default();
        assert_eq!(Ttl::Default.resolve(&config), None);
        assert_eq!(Ttl::Forever.resolve(&config), None);
        assert_eq!(
            Ttl::Expires(Duration::from_secs(60)).resolve(&config),
            Some(Duration::from_secs(60))
        );
        assert_eq!(Ttl::Expires(Duration::ZERO).resolve(&config), None);

        config.default_ttl = Some(Duration::from_secs(30));
        assert_eq!(Ttl::Default.resolve(&config), Some(Duration::from_secs(30)));
        assert_eq!(Ttl::Forever.resolve(&config), None);

        config.default_ttl = Some(Duration::ZERO);
        assert_eq!(Ttl::Default.resolve(&config), None);
    }

    #[test]
    fn page_builder() {
        assert_eq!(PageCache::page().ttl, Ttl::Default);
        assert_eq!(
            PageCache::page().ttl(Duration::from_secs(5)).ttl,
            Ttl::Expires(Duration::from_secs(5))
        );
        assert_eq!(PageCache::page().forever().ttl, Ttl::Forever);
    }

    #[tokio::test]
    async fn miss_then_exact_hit() {
        let (cache, _) = cache_with(config());
        cache.clear_cache().await.unwrap();
        let handler = Counting::default();
        let page = PageCache::page();

        let first = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(first.extensions().get::<Outcome>(), Some(&Outcome::MissFill));
        let etag = first.headers()[header::ETAG].clone();
        assert_eq!(etag, cache.key_for(&get("/"), 1).as_str());
        assert_eq!(body_of(first).await, "body #1");

        let second = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(second.extensions().get::<Outcome>(), Some(&Outcome::ExactHit));
        assert_eq!(second.headers()[header::ETAG], etag);
        assert_eq!(second.headers()[header::CONTENT_TYPE], "text/plain");
        assert_eq!(body_of(second).await, "body #1");
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn stale_hit_serves_old_page_and_rebuilds() {
        let (cache, _) = cache_with(config());
        cache.clear_cache().await.unwrap();
        let handler = Counting::default();
        let page = PageCache::page();

        cache.serve(&page, get("/"), handler.handler()).await;
        cache.trigger().entity_saved("blog.article").await.unwrap();

        let stale = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(
            stale.extensions().get::<Outcome>(),
            Some(&Outcome::StaleHitRefresh)
        );
        assert_eq!(stale.headers()[header::ETAG], cache.key_for(&get("/"), 1).as_str());
        assert_eq!(body_of(stale).await, "body #1");

        settle(&cache).await;
        assert_eq!(handler.calls(), 2);
        let fresh = cache.cached(&cache.key_for(&get("/"), 2)).await.unwrap();
        assert_eq!(fresh.content, "body #2");

        let hit = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(hit.extensions().get::<Outcome>(), Some(&Outcome::ExactHit));
        assert_eq!(body_of(hit).await, "body #2");
    }

    #[tokio::test]
    async fn regression_limit_bounds_stale_walk() {
        let (cache, _) = cache_with(CacheConfig {
            max_generation_regression: 2,
            ..config()
        });
        cache.clear_cache().await.unwrap();
        let handler = Counting::default();
        let page = PageCache::page();

        cache.serve(&page, get("/"), handler.handler()).await;
        for _ in 0..3 {
            cache.clear_cache().await.unwrap();
        }

        let response = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(response.extensions().get::<Outcome>(), Some(&Outcome::MissFill));
        assert_eq!(handler.calls(), 2);
    }

    #[tokio::test]
    async fn held_lock_skips_rebuild() {
        let (cache, _) = cache_with(config());
        cache.clear_cache().await.unwrap();
        let handler = Counting::default();
        let page = PageCache::page();

        cache.serve(&page, get("/"), handler.handler()).await;
        cache.clear_cache().await.unwrap();

        let current = cache.key_for(&get("/"), 2);
        let _held = cache.inner.lock.acquire(&current).await.unwrap().unwrap();

        let stale = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(
            stale.extensions().get::<Outcome>(),
            Some(&Outcome::StaleHitRefresh)
        );
        settle(&cache).await;
        assert_eq!(handler.calls(), 1);
        assert!(cache.cached(&current).await.is_none());
    }

    #[tokio::test]
    async fn panicking_rebuild_releases_lock() {
        let (cache, _) = cache_with(config());
        cache.clear_cache().await.unwrap();
        let page = PageCache::page();

        cache
            .serve(&page, get("/"), Counting::default().handler())
            .await;
        cache.clear_cache().await.unwrap();

        let panicking = |_request: Request<Body>| async {
            if true {
                panic!("render failed");
            }
            Response::new(Body::empty())
        };
        cache.serve(&page, get("/"), panicking).await;
        settle(&cache).await;

        let current = cache.key_for(&get("/"), 2);
        assert!(cache.inner.lock.acquire(&current).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn uncacheable_response_is_not_stored() {
        let (cache, _) = cache_with(config());
        cache.clear_cache().await.unwrap();
        let page = PageCache::page();
        let calls = Arc::new(AtomicUsize::new(0));

        let handler = {
            let calls = Arc::clone(&calls);
            move |_request: Request<Body>| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    let mut response = Response::new(Body::from("private"));
                    response
                        .headers_mut()
                        .insert(header::VARY, HeaderValue::from_static("Cookie"));
                    response
                }
            }
        };

        let first = cache.serve(&page, get("/"), handler.clone()).await;
        assert_eq!(first.extensions().get::<Outcome>(), Some(&Outcome::MissFill));
        assert!(first.headers().contains_key(header::ETAG));
        cache.serve(&page, get("/"), handler).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn oversized_body_is_served_but_not_stored() {
        let (cache, _) = cache_with(CacheConfig {
            max_body_bytes: 4,
            ..config()
        });
        let handler = Counting::default();
        let page = PageCache::page();

        let response = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(body_of(response).await, "body #1");
        assert!(cache.cached(&cache.key_for(&get("/"), 1)).await.is_none());
    }

    #[tokio::test]
    async fn non_get_bypasses() {
        let (cache, _) = cache_with(config());
        let handler = Counting::default();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Body::empty())
            .unwrap();

        let response = cache.serve(&PageCache::page(), request, handler.handler()).await;
        assert_eq!(response.extensions().get::<Outcome>(), Some(&Outcome::Bypass));
        assert!(!response.headers().contains_key(header::ETAG));
    }

    #[tokio::test]
    async fn store_outage_degrades_to_bypass() {
        let store = Arc::new(FlakyStore::default());
        let cache = PageCache::new(config(), store.clone());
        let handler = Counting::default();
        let page = PageCache::page();

        store.set_down(true);
        for _ in 0..2 {
            let response = cache.serve(&page, get("/"), handler.handler()).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.extensions().get::<Outcome>(), Some(&Outcome::Bypass));
        }
        assert_eq!(handler.calls(), 2);

        store.set_down(false);
        let response = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(response.extensions().get::<Outcome>(), Some(&Outcome::MissFill));
    }

    #[tokio::test]
    async fn page_ttl_expires_entry() {
        let (cache, _) = cache_with(config());
        let handler = Counting::default();
        let page = PageCache::page().ttl(Duration::from_millis(30));

        cache.serve(&page, get("/"), handler.handler()).await;
        assert!(cache.cached(&cache.key_for(&get("/"), 1)).await.is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.cached(&cache.key_for(&get("/"), 1)).await.is_none());
    }

    #[tokio::test]
    async fn saturated_pool_serves_stale_without_rebuilding() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        let _guard = metrics::set_default_local_recorder(&recorder);

        let (cache, _) = cache_with(CacheConfig {
            max_background_rebuilds: 1,
            ..config()
        });
        cache.clear_cache().await.unwrap();
        let handler = Counting::default();
        let page = PageCache::page();

        cache.serve(&page, get("/"), handler.handler()).await;
        cache.clear_cache().await.unwrap();

        let _busy = cache.inner.pool.try_reserve().expect("only slot");
        let stale = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(
            stale.extensions().get::<Outcome>(),
            Some(&Outcome::StaleHitRefresh)
        );
        assert_eq!(body_of(stale).await, "body #1");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(handler.calls(), 1);
        assert!(cache.cached(&cache.key_for(&get("/"), 2)).await.is_none());

        let saturated = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find(|(key, _, _, _)| {
                key.key().name() == METRIC_REBUILD_TOTAL
                    && key
                        .key()
                        .labels()
                        .any(|label| label.key() == "outcome" && label.value() == "saturated")
            })
            .map(|(_, _, _, value)| value);
        assert_eq!(saturated, Some(DebugValue::Counter(1)));
    }

    #[tokio::test]
    async fn unrepresentable_default_ttl_still_stores() {
        let (cache, _) = cache_with(CacheConfig {
            default_ttl: Some(Duration::from_secs(u64::MAX)),
            ..config()
        });
        let handler = Counting::default();
        let page = PageCache::page();

        let miss = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(miss.extensions().get::<Outcome>(), Some(&Outcome::MissFill));
        let hit = cache.serve(&page, get("/"), handler.handler()).await;
        assert_eq!(hit.extensions().get::<Outcome>(), Some(&Outcome::ExactHit));
        assert_eq!(handler.calls(), 1);
    }

    #[tokio::test]
    async fn undecodable_entry_reads_as_miss() {
        let (cache, store) = cache_with(config());
        let key = cache.key_for(&get("/"), 1);
        store
            .set(key.as_str(), Bytes::from("garbage"), None)
            .await
            .unwrap();

        let handler = Counting::default();
        let response = cache.serve(&PageCache::page(), get("/"), handler.handler()).await;
        assert_eq!(response.extensions().get::<Outcome>(), Some(&Outcome::MissFill));
        assert_eq!(handler.calls(), 1);
    }
}
