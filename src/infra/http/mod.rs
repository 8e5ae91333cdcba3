//! Demo site served behind the page cache.

mod demo;
mod middleware;

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use dashmap::DashMap;

use crate::cache::{CachePage, CachedRoute, PageCache, page_cache_layer};

pub use demo::{WIDGET_ENTITY, Widget};
pub use middleware::{RequestContext, log_responses, set_request_context, visitor};

/// Shared state of the demo handlers.
#[derive(Clone)]
pub struct DemoState {
    pub cache: PageCache,
    pub widgets: Arc<DashMap<u64, Widget>>,
}

impl DemoState {
    /// Builds the state with a few seeded widgets.
    pub fn new(cache: PageCache) -> Self {
        let widgets = DashMap::new();
        for (id, name) in [(1, "Flange"), (7, "Sprocket"), (42, "Gizmo")] {
            widgets.insert(id, Widget::new(id, name));
        }
        Self {
            cache,
            widgets: Arc::new(widgets),
        }
    }
}

pub fn build_router(state: DemoState) -> Router {
    let cache = state.cache.clone();
    let cached = |page: CachePage| {
        axum_middleware::from_fn_with_state(CachedRoute::new(cache.clone(), page), page_cache_layer)
    };

    let pages = Router::new()
        .route("/", get(demo::index))
        .route("/messages/", get(demo::messages))
        .route("/form/", get(demo::form))
        .route(
            "/widgets/{id}",
            get(demo::show_widget)
                .post(demo::update_widget)
                .delete(demo::delete_widget),
        )
        .fallback(demo::not_found)
        .layer(cached(PageCache::page()));

    // Fixed content never expires on its own; only a generation bump retires it.
    let fixed = Router::new()
        .route("/content-types/text/plain/", get(demo::plain_text))
        .route("/content-types/text/html/", get(demo::html_text))
        .layer(cached(PageCache::page().forever()));

    let uncached = Router::new()
        .route("/cache/clear", post(demo::clear_cache))
        .route("/_health", get(demo::health));

    pages
        .merge(fixed)
        .merge(uncached)
        .with_state(state)
        .layer(axum_middleware::from_fn(visitor))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
