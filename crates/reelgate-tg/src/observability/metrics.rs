use super::GLOBAL_LABELS;
use crate::config::{from_env, ConfigError};
use crate::Result;
use serde::Deserialize;

/// Histogram buckets to measure the distribution of request durations in seconds
const DEFAULT_DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

#[derive(Deserialize)]
struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    metrics_port: u16,
}

fn default_metrics_port() -> u16 {
    2000
}

/// Starts the Prometheus exporter listener. Must be called within a tokio runtime.
pub fn init_metrics() -> Result {
    let config: MetricsConfig = from_env("")?;

    let invalid = |err: metrics_exporter_prometheus::BuildError| ConfigError::Invalid {
        var: "METRICS_PORT",
        reason: err.to_string(),
    };

    let mut builder = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.metrics_port))
        .set_buckets(DEFAULT_DURATION_BUCKETS)
        .map_err(invalid)?;

    for (key, value) in GLOBAL_LABELS {
        builder = builder.add_global_label(*key, *value);
    }

    builder.install().map_err(invalid)?;

    describe();

    Ok(())
}

fn describe() {
    metrics::describe_histogram!(
        "http_request_duration_seconds",
        metrics::Unit::Seconds,
        "Duration of a single real http request. Retries appear as separate observations"
    );
    metrics::describe_histogram!(
        "http_request_effective_duration_seconds",
        metrics::Unit::Seconds,
        "Same as `http_request_duration_seconds` but covers the time spent on retries"
    );
    metrics::describe_counter!("tg_updates_total", "Number of updates received from Telegram");
    metrics::describe_counter!(
        "tg_updates_skipped_total",
        "Number of updates received from Telegram, that were skipped by the bot"
    );
    metrics::describe_counter!(
        "reelgate_download_requests_total",
        "Number of download requests by their final outcome"
    );
    metrics::describe_histogram!(
        "reelgate_provider_fetch_duration_seconds",
        metrics::Unit::Seconds,
        "Time it took the content provider to list the media of a post"
    );
    metrics::describe_histogram!(
        "reelgate_delivery_duration_seconds",
        metrics::Unit::Seconds,
        "Time it took to upload all media of a post to Telegram"
    );
    metrics::describe_counter!(
        "reelgate_broadcast_sends_total",
        "Number of broadcast messages sent, labeled with the send outcome"
    );
    metrics::describe_counter!(
        "reelgate_registered_users_total",
        "Number of new users registered with /start"
    );
}
