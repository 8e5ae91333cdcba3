//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    collections::HashSet,
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::cache::{CacheConfig, DEFAULT_MEMORY_CAPACITY};

mod cli;
#[cfg(test)]
mod tests;

pub use cli::{CliArgs, Command, ServeArgs, ServeOverrides};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "genpage";
const ENV_PREFIX: &str = "GENPAGE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub store: StoreSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub disabled: bool,
    pub key_prefix: String,
    /// `None` caches forever.
    pub default_ttl: Option<Duration>,
    pub max_generation_regression: NonZeroU32,
    pub lock_ttl: Duration,
    pub invalidation_whitelist: HashSet<String>,
    pub user_specific: bool,
    pub key_includes_query: bool,
    pub cache_unresolved_routes: bool,
    pub default_language: String,
    pub max_background_rebuilds: NonZeroUsize,
    pub max_body_bytes: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub capacity: NonZeroUsize,
    pub timeout: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cache.invalidation_whitelist")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    store: RawStoreSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(disabled) = overrides.cache_disabled {
            self.cache.disabled = Some(disabled);
        }
        if let Some(prefix) = overrides.cache_key_prefix.as_ref() {
            self.cache.key_prefix = Some(prefix.clone());
        }
        if let Some(seconds) = overrides.cache_default_ttl_seconds {
            self.cache.default_ttl_seconds = Some(seconds);
        }
        if let Some(count) = overrides.cache_max_generation_regression {
            self.cache.max_generation_regression = Some(count);
        }
        if let Some(seconds) = overrides.cache_lock_ttl_seconds {
            self.cache.lock_ttl_seconds = Some(seconds);
        }
        if let Some(user_specific) = overrides.cache_user_specific {
            self.cache.user_specific = Some(user_specific);
        }
        if let Some(count) = overrides.cache_max_background_rebuilds {
            self.cache.max_background_rebuilds = Some(count);
        }
        if let Some(capacity) = overrides.store_capacity {
            self.store.capacity = Some(capacity);
        }
        if let Some(millis) = overrides.store_timeout_ms {
            self.store.timeout_ms = Some(millis);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            store,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            store: build_store_settings(store)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let defaults = CacheConfig::default();

    let key_prefix = cache.key_prefix.unwrap_or(defaults.key_prefix);
    if key_prefix.is_empty() {
        return Err(LoadError::invalid("cache.key_prefix", "must not be empty"));
    }
    // The key doubles as the ETag header value.
    if !key_prefix
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(LoadError::invalid(
            "cache.key_prefix",
            "only ASCII letters, digits, `_`, `-` and `.` are allowed",
        ));
    }

    if cache
        .default_ttl_seconds
        .is_some_and(|seconds| seconds > MAX_TTL_SECS)
    {
        return Err(LoadError::invalid(
            "cache.default_ttl_seconds",
            "must not exceed one year; use 0 to cache forever",
        ));
    }
    let default_ttl = cache
        .default_ttl_seconds
        .filter(|seconds| *seconds > 0)
        .map(Duration::from_secs);

    let regression = cache
        .max_generation_regression
        .unwrap_or(defaults.max_generation_regression);
    let max_generation_regression = NonZeroU32::new(regression).ok_or_else(|| {
        LoadError::invalid("cache.max_generation_regression", "must be greater than zero")
    })?;

    let lock_ttl = cache
        .lock_ttl_seconds
        .map(Duration::from_secs)
        .unwrap_or(defaults.lock_ttl);
    if lock_ttl.is_zero() {
        return Err(LoadError::invalid(
            "cache.lock_ttl_seconds",
            "must be greater than zero",
        ));
    }
    if lock_ttl.as_secs() > MAX_TTL_SECS {
        return Err(LoadError::invalid(
            "cache.lock_ttl_seconds",
            "must not exceed one year",
        ));
    }

    let invalidation_whitelist = cache
        .invalidation_whitelist
        .unwrap_or_default()
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect();

    let default_language = cache
        .default_language
        .map(|language| language.trim().to_ascii_lowercase())
        .unwrap_or(defaults.default_language);
    if default_language.is_empty() {
        return Err(LoadError::invalid(
            "cache.default_language",
            "must not be empty",
        ));
    }

    let max_background_rebuilds = non_zero_usize(
        cache
            .max_background_rebuilds
            .unwrap_or(defaults.max_background_rebuilds),
        "cache.max_background_rebuilds",
    )?;
    let max_body_bytes = non_zero_usize(
        cache.max_body_bytes.unwrap_or(defaults.max_body_bytes),
        "cache.max_body_bytes",
    )?;

    Ok(CacheSettings {
        disabled: cache.disabled.unwrap_or(false),
        key_prefix,
        default_ttl,
        max_generation_regression,
        lock_ttl,
        invalidation_whitelist,
        user_specific: cache.user_specific.unwrap_or(true),
        key_includes_query: cache.key_includes_query.unwrap_or(false),
        cache_unresolved_routes: cache.cache_unresolved_routes.unwrap_or(false),
        default_language,
        max_background_rebuilds,
        max_body_bytes,
    })
}

fn build_store_settings(store: RawStoreSettings) -> Result<StoreSettings, LoadError> {
    let capacity = non_zero_usize(
        store.capacity.unwrap_or(DEFAULT_MEMORY_CAPACITY),
        "store.capacity",
    )?;

    let timeout = store
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(CacheConfig::default().store_timeout);
    if timeout.is_zero() {
        return Err(LoadError::invalid(
            "store.timeout_ms",
            "must be greater than zero",
        ));
    }

    Ok(StoreSettings {
        capacity,
        timeout,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    disabled: Option<bool>,
    key_prefix: Option<String>,
    default_ttl_seconds: Option<u64>,
    max_generation_regression: Option<u32>,
    lock_ttl_seconds: Option<u64>,
    invalidation_whitelist: Option<Vec<String>>,
    user_specific: Option<bool>,
    key_includes_query: Option<bool>,
    cache_unresolved_routes: Option<bool>,
    default_language: Option<String>,
    max_background_rebuilds: Option<usize>,
    max_body_bytes: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    capacity: Option<usize>,
    timeout_ms: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_usize(value: usize, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}
