//! Demo handlers: a small widget catalogue plus pages exercising each
//! cacheability rule.

use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{CsrfTokenUsed, Generation, Visitor};
use crate::error::AppError;

use super::DemoState;
use super::middleware::{FLASH_COOKIE, cookie};

/// Entity type reported to the invalidation trigger on widget writes.
pub const WIDGET_ENTITY: &str = "demo.widget";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Widget {
    pub id: u64,
    pub name: String,
    pub revision: u64,
}

impl Widget {
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            revision: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct WidgetUpdate {
    name: String,
}

#[derive(Debug, Serialize)]
pub(super) struct Cleared {
    generation: Generation,
}

pub(super) async fn index(State(state): State<DemoState>, request: Request<Body>) -> String {
    let visitor = request
        .extensions()
        .get::<Visitor>()
        .cloned()
        .unwrap_or_default();
    let language = visitor
        .language
        .unwrap_or_else(|| state.cache.config().default_language.clone());

    match visitor.user_id {
        Some(user_id) => format!("Hello, user {user_id} ({language})"),
        None => format!("Hello, guest ({language})"),
    }
}

pub(super) async fn plain_text() -> &'static str {
    "plain text content"
}

pub(super) async fn html_text() -> Html<&'static str> {
    Html("<p>html content</p>")
}

pub(super) async fn show_widget(
    State(state): State<DemoState>,
    Path(id): Path<u64>,
) -> Result<Json<Widget>, AppError> {
    state
        .widgets
        .get(&id)
        .map(|widget| Json(widget.clone()))
        .ok_or(AppError::NotFound)
}

pub(super) async fn update_widget(
    State(state): State<DemoState>,
    Path(id): Path<u64>,
    Json(update): Json<WidgetUpdate>,
) -> Json<Widget> {
    let widget = {
        let mut entry = state
            .widgets
            .entry(id)
            .or_insert_with(|| Widget { revision: 0, ..Widget::new(id, "") });
        entry.name = update.name;
        entry.revision += 1;
        entry.value().clone()
    };

    info!(widget = id, revision = widget.revision, "Widget saved");
    // The write itself succeeded; a missed bump only delays freshness.
    if let Err(err) = state.cache.trigger().entity_saved(WIDGET_ENTITY).await {
        warn!(widget = id, error = %err, "Failed to invalidate page cache");
    }
    Json(widget)
}

pub(super) async fn delete_widget(
    State(state): State<DemoState>,
    Path(id): Path<u64>,
) -> Result<StatusCode, AppError> {
    if !state.widgets.contains_key(&id) {
        return Err(AppError::NotFound);
    }
    if let Err(err) = state.cache.trigger().entity_deleting(WIDGET_ENTITY).await {
        warn!(widget = id, error = %err, "Failed to invalidate page cache");
    }
    state.widgets.remove(&id);
    info!(widget = id, "Widget deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Shows the flash message once and clears its cookie.
pub(super) async fn messages(request: Request<Body>) -> Response {
    let flash = cookie(request.headers(), FLASH_COOKIE)
        .filter(|flash| !flash.is_empty())
        .map(str::to_owned);

    match flash {
        Some(message) => (
            [(
                header::SET_COOKIE,
                format!("{FLASH_COOKIE}=; Path=/; Max-Age=0"),
            )],
            format!("Message: {message}"),
        )
            .into_response(),
        None => "No messages".into_response(),
    }
}

/// Renders a form carrying a fresh CSRF token.
pub(super) async fn form() -> impl IntoResponse {
    let token = Uuid::new_v4();
    (
        Extension(CsrfTokenUsed),
        Html(format!(
            r#"<form method="post"><input type="hidden" name="csrf" value="{token}"></form>"#
        )),
    )
}

pub(super) async fn clear_cache(State(state): State<DemoState>) -> Result<Json<Cleared>, AppError> {
    let generation = state.cache.clear_cache().await?;
    Ok(Json(Cleared { generation }))
}

pub(super) async fn health() -> &'static str {
    "ok"
}

pub(super) async fn not_found() -> AppError {
    AppError::NotFound
}
