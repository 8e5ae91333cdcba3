//! Stored page representation.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Response, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::keys::CacheKey;

/// A rendered page as kept in the store: the body and its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPage {
    pub content: Bytes,
    pub content_type: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct WireEntry {
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_type: Option<String>,
}

/// Why a stored entry could not be read back.
#[derive(Debug, thiserror::Error)]
pub enum EntryDecodeError {
    #[error("malformed entry: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed entry content: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl CachedPage {
    pub fn new(content: impl Into<Bytes>, content_type: Option<String>) -> Self {
        Self {
            content: content.into(),
            content_type,
        }
    }

    /// Captures the storable parts of a response head and its buffered body.
    pub fn from_parts(headers: &HeaderMap, content: Bytes) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Self {
            content,
            content_type,
        }
    }

    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        let wire = WireEntry {
            content: STANDARD.encode(&self.content),
            content_type: self.content_type.clone(),
        };
        serde_json::to_vec(&wire).map(Bytes::from)
    }

    pub fn decode(raw: &[u8]) -> Result<Self, EntryDecodeError> {
        let wire: WireEntry = serde_json::from_slice(raw)?;
        Ok(Self {
            content: Bytes::from(STANDARD.decode(wire.content)?),
            content_type: wire.content_type,
        })
    }

    /// Builds the `200 OK` response for this page, tagged with `key`.
    pub fn into_response(self, key: &CacheKey) -> Response<Body> {
        let mut response = Response::new(Body::from(self.content));

        if let Some(value) = self
            .content_type
            .as_deref()
            .and_then(|ct| HeaderValue::from_str(ct).ok())
        {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
        set_etag(response.headers_mut(), key);
        response
    }
}

/// Sets the `ETag` header to the cache key the response was served or stored under.
pub fn set_etag(headers: &mut HeaderMap, key: &CacheKey) {
    if let Ok(value) = HeaderValue::from_str(key.as_str()) {
        headers.insert(header::ETAG, value);
    }
}
