use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the genpage binary.
#[derive(Debug, Parser)]
#[command(name = "genpage", version, about = "Generational page cache demo server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "GENPAGE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the demo HTTP server behind the page cache.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Disable the page cache entirely.
    #[arg(
        long = "cache-disabled",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_disabled: Option<bool>,

    /// Override the cache key prefix.
    #[arg(long = "cache-key-prefix", value_name = "PREFIX")]
    pub cache_key_prefix: Option<String>,

    /// Override the default page TTL (0 caches forever).
    #[arg(long = "cache-default-ttl-seconds", value_name = "SECONDS")]
    pub cache_default_ttl_seconds: Option<u64>,

    /// Override how many generations back a miss may search.
    #[arg(long = "cache-max-generation-regression", value_name = "COUNT")]
    pub cache_max_generation_regression: Option<u32>,

    /// Override the regeneration lock expiry.
    #[arg(long = "cache-lock-ttl-seconds", value_name = "SECONDS")]
    pub cache_lock_ttl_seconds: Option<u64>,

    /// Toggle per-user cache keys.
    #[arg(
        long = "cache-user-specific",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_user_specific: Option<bool>,

    /// Override the concurrent background rebuild cap.
    #[arg(long = "cache-max-background-rebuilds", value_name = "COUNT")]
    pub cache_max_background_rebuilds: Option<usize>,

    /// Override the in-memory store capacity (entries).
    #[arg(long = "store-capacity", value_name = "COUNT")]
    pub store_capacity: Option<usize>,

    /// Override the store operation timeout.
    #[arg(long = "store-timeout-ms", value_name = "MILLIS")]
    pub store_timeout_ms: Option<u64>,
}
