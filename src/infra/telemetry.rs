use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Registers units and help text for every metric the page cache emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "genpage_request_total",
            Unit::Count,
            "Requests seen by the page cache, labelled by serving outcome."
        );
        describe_counter!(
            "genpage_rebuild_total",
            Unit::Count,
            "Background rebuilds, labelled by result."
        );
        describe_histogram!(
            "genpage_rebuild_ms",
            Unit::Milliseconds,
            "Background rebuild latency in milliseconds."
        );
        describe_counter!(
            "genpage_generation_bump_total",
            Unit::Count,
            "Total number of generation counter bumps."
        );
        describe_counter!(
            "genpage_store_error_total",
            Unit::Count,
            "Store operations that failed or timed out, labelled by operation."
        );
        describe_counter!(
            "genpage_memory_evict_total",
            Unit::Count,
            "Entries evicted from the in-memory store due to capacity."
        );
    });
}
