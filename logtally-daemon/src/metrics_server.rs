//! Prometheus scrape endpoint for monitor and daemon metrics.
//!
//! The exporter's built-in HTTP listener serves every path; the metric names
//! live in `logtally_core::metrics`.

use std::net::SocketAddr;

use anyhow::Result;
use logtally_core::config::MetricsConfig;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

/// Bucket bounds (seconds) for the per-cycle read duration histogram.
const CYCLE_DURATION_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Install the global recorder and start the scrape listener.
///
/// Call at most once per process.
///
/// # Errors
///
/// Fails on an unparsable address, a bind failure, or when a recorder is
/// already installed.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    let addr = metrics_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(logtally_core::metrics::MONITOR_CYCLE_DURATION_SECONDS.to_owned()),
            CYCLE_DURATION_BUCKETS,
        )
        .map_err(|e| anyhow::anyhow!("invalid histogram buckets: {}", e))?
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    logtally_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "metrics endpoint listening");
    Ok(())
}

/// Parse the configured listen address and port.
fn metrics_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}
