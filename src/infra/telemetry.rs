use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
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
            "pressroom_jobs_started_total",
            Unit::Count,
            "Total number of job attempts started, per queue."
        );
        describe_counter!(
            "pressroom_jobs_completed_total",
            Unit::Count,
            "Total number of job attempts that completed, per queue."
        );
        describe_counter!(
            "pressroom_jobs_failed_total",
            Unit::Count,
            "Total number of job attempts that failed, per queue."
        );
        describe_histogram!(
            "pressroom_job_duration_ms",
            Unit::Milliseconds,
            "Job attempt latency in milliseconds, per queue."
        );
        describe_counter!(
            "pressroom_publish_targets_total",
            Unit::Count,
            "Publish target attempts by target kind and outcome."
        );
        describe_gauge!(
            "pressroom_scheduler_due_articles",
            Unit::Count,
            "Articles found due for publishing by the last scheduler sweep."
        );
    });
}
