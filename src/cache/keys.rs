//! Cache key derivation.
//!
//! A key is a digest over the request identity and a generation. Writer and
//! reader never exchange anything but the key, so derivation must stay a pure
//! function of its inputs across processes and restarts.

use std::fmt;

use axum::http::{Request, header};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use sha2::{Digest, Sha256};
use url::form_urlencoded;

use super::config::CacheConfig;
use super::generation::Generation;
use super::policy::Visitor;

const FIELD_DELIMITER: &str = ":";
const ANY_HOST: &str = "*";
const LOCK_SUFFIX: &str = ":locked";
/// Digest bytes kept in the key (128 bits).
const DIGEST_BYTES: usize = 16;

/// Characters escaped when turning a path into a URI. Reserved characters and
/// `%` pass through untouched; non-ASCII is always encoded as UTF-8 octets.
const IRI_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'\\')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Lookup key of a cached page.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Key of the regeneration lock guarding this entry.
    pub fn lock_key(&self) -> String {
        format!("{}{LOCK_SUFFIX}", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The parts of a request a cached page may vary on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestIdentity {
    pub host: String,
    /// Path in URI form (see [`iri_to_uri`]).
    pub path: String,
    /// Canonical query string; `None` when queries do not participate.
    pub query: Option<String>,
    pub language: String,
    /// Authenticated user id, or empty.
    pub user_id: String,
}

impl RequestIdentity {
    /// Extracts the identity of `request` under `config`.
    pub fn from_request<B>(config: &CacheConfig, request: &Request<B>) -> Self {
        let visitor = request.extensions().get::<Visitor>();

        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .or_else(|| request.uri().authority().map(|a| a.as_str().to_string()))
            .filter(|host| !host.is_empty())
            .unwrap_or_else(|| ANY_HOST.to_string());

        let query = config
            .key_includes_query
            .then(|| canonical_query(request.uri().query().unwrap_or("")));

        let language = visitor
            .and_then(|visitor| visitor.language.clone())
            .or_else(|| {
                request
                    .headers()
                    .get(header::ACCEPT_LANGUAGE)
                    .and_then(|value| value.to_str().ok())
                    .and_then(primary_language)
            })
            .unwrap_or_else(|| config.default_language.clone());

        let user_id = if config.user_specific {
            visitor
                .and_then(|visitor| visitor.user_id.clone())
                .unwrap_or_default()
        } else {
            String::new()
        };

        Self {
            host,
            path: iri_to_uri(request.uri().path()),
            query,
            language,
            user_id,
        }
    }

    /// Canonical, order-sensitive field string for `generation`.
    fn canonical(&self, prefix: &str, generation: Generation) -> String {
        let generation = generation.to_string();
        let mut fields: Vec<&str> = vec![prefix, &generation, &self.path, &self.host];
        if let Some(query) = &self.query {
            fields.push(query);
        }
        fields.push(&self.language);
        fields.push(&self.user_id);
        fields.join(FIELD_DELIMITER)
    }
}

/// Derives the cache key of `identity` at `generation`.
pub fn derive_key(prefix: &str, generation: Generation, identity: &RequestIdentity) -> CacheKey {
    let digest = Sha256::digest(identity.canonical(prefix, generation).as_bytes());
    CacheKey(format!("{prefix}.{}", hex::encode(&digest[..DIGEST_BYTES])))
}

/// Derives the key `offset` generations before `current`.
///
/// Returns `None` once the walk would fall below the first generation.
pub fn derive_previous_key(
    prefix: &str,
    current: Generation,
    offset: u32,
    identity: &RequestIdentity,
) -> Option<CacheKey> {
    current
        .checked_sub(Generation::from(offset))
        .filter(|generation| *generation >= 1)
        .map(|generation| derive_key(prefix, generation, identity))
}

/// Percent-encodes the characters of an IRI path that are not valid in a URI.
pub fn iri_to_uri(path: &str) -> String {
    utf8_percent_encode(path, IRI_ESCAPE).to_string()
}

/// Decodes, sorts and re-encodes query pairs so that parameter order and
/// escaping style do not split the cache.
fn canonical_query(query: &str) -> String {
    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect();
    pairs.sort_unstable();
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// First language tag of an `Accept-Language` value, lowercased.
fn primary_language(value: &str) -> Option<String> {
    value
        .split(',')
        .next()
        .and_then(|tag| tag.split(';').next())
        .map(|tag| tag.trim().to_ascii_lowercase())
        .filter(|tag| !tag.is_empty() && tag != "*")
}
