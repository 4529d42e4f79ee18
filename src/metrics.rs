// ABOUTME: Prometheus metrics for the bridge process.
// ABOUTME: Installs the global recorder and names every gauge and counter in one place.

use anyhow::{Context, Result};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder; returns the handle used to render /metrics
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus metrics recorder")
}

/// Gauge: number of live conversation sessions
pub fn set_active_conversations(count: u64) {
    gauge!("hearsay_active_conversations").set(count as f64);
}

/// Counter: mention events received
pub fn increment_mentions() {
    counter!("hearsay_mentions_total").increment(1);
}

/// Counter: mention events that ended in a dispatch error
pub fn increment_dispatch_errors() {
    counter!("hearsay_dispatch_errors_total").increment(1);
}
