//! Cacheability predicates.
//!
//! Both predicates err on the side of not caching: a page that could have
//! been cached but wasn't costs a handler call, a page cached when it
//! shouldn't have been leaks content between visitors.

use axum::extract::MatchedPath;
use axum::http::{HeaderMap, Method, Request, Response, StatusCode, header};
use serde::Deserialize;

use super::config::CacheConfig;

/// Per-request identity details, inserted by upstream middleware
/// (session, authentication, locale negotiation).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visitor {
    /// Authenticated user identifier; `None` for anonymous visitors.
    pub user_id: Option<String>,
    /// Negotiated language tag.
    pub language: Option<String>,
    /// One-time messages queued for display on this request.
    pub pending_messages: usize,
}

impl Visitor {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_pending_messages(mut self, count: usize) -> Self {
        self.pending_messages = count;
        self
    }
}

/// Response extension set by handlers that consumed a CSRF token.
///
/// Such responses embed per-session secrets and are never shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsrfTokenUsed;

/// Treatment of requests that did not resolve to a known route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedRoutePolicy {
    /// Never cache them, so stray 404 probes cannot fill the store.
    #[default]
    Exclude,
    /// Cache them like any other page.
    Allow,
}

/// Decides whether `request` may be answered from, or stored into, the cache.
pub fn request_is_cacheable<B>(config: &CacheConfig, request: &Request<B>) -> bool {
    if !config.is_enabled() || request.method() != Method::GET {
        return false;
    }

    let resolved = request.extensions().get::<MatchedPath>().is_some();
    if !resolved && config.unresolved_routes == UnresolvedRoutePolicy::Exclude {
        return false;
    }

    // Pending messages must be shown exactly once; a cached page would replay them.
    request
        .extensions()
        .get::<Visitor>()
        .is_none_or(|visitor| visitor.pending_messages == 0)
}

/// Decides whether `response` may be stored.
pub fn response_is_cacheable<B>(config: &CacheConfig, response: &Response<B>) -> bool {
    config.is_enabled()
        && response.status() == StatusCode::OK
        && !has_token(response.headers(), header::PRAGMA, "no-cache")
        && !has_token(response.headers(), header::VARY, "cookie")
        && response.extensions().get::<CsrfTokenUsed>().is_none()
}

/// Returns true if any value of `name` lists `token` (comma-separated, case-insensitive).
fn has_token(headers: &HeaderMap, name: header::HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}
