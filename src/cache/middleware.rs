//! Page cache middleware.
//!
//! Wraps a route (or a whole router) so that GET responses are served through
//! [`PageCache::serve`]. Background rebuilds re-run the downstream stack with
//! the original request head and an empty body.

use axum::{body::Body, extract::State, http::Request, middleware::Next, response::Response};
use tracing::instrument;

use super::protocol::{CachePage, PageCache};

/// Middleware state: the shared engine plus the settings of the wrapped route.
#[derive(Clone)]
pub struct CachedRoute {
    pub cache: PageCache,
    pub page: CachePage,
}

impl CachedRoute {
    pub fn new(cache: PageCache, page: CachePage) -> Self {
        Self { cache, page }
    }
}

/// Use with `axum::middleware::from_fn_with_state`.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(route): State<CachedRoute>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let handler = move |request: Request<Body>| {
        let next = next.clone();
        async move { next.run(request).await }
    };
    route.cache.serve(&route.page, request, handler).await
}
