//! Tracing subscriber and metric catalogue.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Registry, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

const COUNTERS: &[(&str, &str)] = &[
    ("marketlens_cache_hit_total", "Read-through cache hits."),
    ("marketlens_cache_miss_total", "Read-through cache misses."),
    (
        "marketlens_cache_error_total",
        "Cache backend errors absorbed as misses or skipped writes.",
    ),
    (
        "marketlens_cache_flight_joined_total",
        "Cache misses that waited on an in-flight load for the same key.",
    ),
    (
        "marketlens_rate_limit_rejected_total",
        "Requests rejected by the fixed-window rate limiter.",
    ),
    ("marketlens_audit_persisted_total", "Audit records written."),
    (
        "marketlens_audit_failed_total",
        "Audit records the store rejected.",
    ),
    (
        "marketlens_audit_dropped_total",
        "Audit records dropped before reaching the worker.",
    ),
    (
        "marketlens_scheduler_promoted_total",
        "Scheduled items promoted to published.",
    ),
];

fn output_layer(format: LogFormat) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(output_layer(logging.format))
        .with(ErrorLayer::default())
        .with(filter)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, help) in COUNTERS {
            describe_counter!(*name, Unit::Count, *help);
        }
        describe_histogram!(
            "marketlens_http_request_ms",
            Unit::Milliseconds,
            "HTTP request latency in milliseconds."
        );
    });
}
