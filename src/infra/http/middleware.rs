use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderMap, Request, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::cache::{Outcome, Visitor};

pub(crate) const USER_ID_HEADER: &str = "x-user-id";
pub(crate) const LANGUAGE_COOKIE: &str = "lang";
pub(crate) const FLASH_COOKIE: &str = "flash";

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Derives the [`Visitor`] of a request.
///
/// Stands in for real session and authentication middleware: the user comes
/// from `X-User-Id`, the language from a `lang` cookie, and a non-empty
/// `flash` cookie counts as one pending message.
pub async fn visitor(mut request: Request<Body>, next: Next) -> Response {
    let visitor = visitor_from_headers(request.headers());
    request.extensions_mut().insert(visitor);
    next.run(request).await
}

pub(crate) fn visitor_from_headers(headers: &HeaderMap) -> Visitor {
    let mut visitor = match headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
    {
        Some(user_id) => Visitor::authenticated(user_id),
        None => Visitor::anonymous(),
    };

    if let Some(language) = cookie(headers, LANGUAGE_COOKIE).filter(|lang| !lang.is_empty()) {
        visitor = visitor.with_language(language.to_ascii_lowercase());
    }
    if cookie(headers, FLASH_COOKIE).is_some_and(|flash| !flash.is_empty()) {
        visitor = visitor.with_pending_messages(1);
    }
    visitor
}

pub(crate) fn cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = start.elapsed().as_millis();
    let outcome = response
        .extensions()
        .get::<Outcome>()
        .map(|outcome| outcome.as_str())
        .unwrap_or("uncached");

    if status.is_server_error() {
        error!(
            target = "genpage::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = elapsed_ms,
            outcome,
            request_id = request_id,
            "request failed",
        );
    } else if status.is_client_error() {
        warn!(
            target = "genpage::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms = elapsed_ms,
            outcome,
            request_id = request_id,
            "client request error",
        );
    } else {
        debug!(
            target = "genpage::http::response",
            status = status.as_u16(),
            method = %method,
            path = %uri.path(),
            elapsed_ms = elapsed_ms,
            outcome,
            request_id = request_id,
            "request served",
        );
    }

    response
}
