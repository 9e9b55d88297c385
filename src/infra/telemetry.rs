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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "coursehub_cache_hit_total",
            Unit::Count,
            "Cache-aside reads served from the cache, by key kind."
        );
        describe_counter!(
            "coursehub_cache_miss_total",
            Unit::Count,
            "Cache-aside reads that fell through to the store, by key kind."
        );
        describe_counter!(
            "coursehub_cache_error_total",
            Unit::Count,
            "Cache backend failures, by operation."
        );
        describe_counter!(
            "coursehub_cache_invalidation_total",
            Unit::Count,
            "Invalidation passes run after writes."
        );
        describe_histogram!(
            "coursehub_cache_invalidation_ms",
            Unit::Milliseconds,
            "Invalidation pass latency in milliseconds."
        );
        describe_counter!(
            "coursehub_search_sync_total",
            Unit::Count,
            "Search index writes, by operation."
        );
        describe_counter!(
            "coursehub_side_effect_failure_total",
            Unit::Count,
            "Post-commit side effects that failed and were logged instead of returned."
        );
    });
}
