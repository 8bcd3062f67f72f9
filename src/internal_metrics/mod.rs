//! # Internal Metrics Module
//!
//! Infrastructure for collecting and exposing alertbridge's metrics.
//!
//! ## Components:
//!
//! - **`MetricsBuilder`**: installs the Prometheus recorder, binds the
//!   exporter's listener and prepares the optional `SystemCollector`.
//!
//! - **`SenderMetrics`** / **`ForkedMetrics`**: cloneable handles registered
//!   once per component, so the hot paths only touch atomics.
//!
//! - **`MetricsServer`**: (Defined in `server.rs`) An `axum`-based web server
//!   that exposes the `/metrics` endpoint for Prometheus to scrape.
//!
//! - **`SystemCollector`**: (Defined in `system.rs`) A background task that
//!   periodically collects and updates process-level metrics (CPU, memory).

use crate::config::MetricsConfig;
use crate::internal_metrics::server::MetricsServer;
use crate::internal_metrics::system::SystemCollector;
use anyhow::{Context, Result};
use metrics::{Counter, Gauge, Histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;

pub mod server;
pub mod system;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_recorder;

/// Label attached to every sender series, naming the destination.
pub const DESTINATION_LABEL: &str = "alertmanager";

/// Registers descriptions for every metric alertbridge emits.
pub fn describe_metrics() {
    metrics::describe_counter!("notifications_accepted_total", Unit::Count, "Total number of alerts accepted into the notification queue.");
    metrics::describe_counter!("notifications_sent_total", Unit::Count, "Total number of alerts delivered to the remote Alertmanager.");
    metrics::describe_counter!("notifications_dropped_total", Unit::Count, "Total number of alerts dropped due to queue overflow or failed delivery.");
    metrics::describe_counter!("notifications_errors_total", Unit::Count, "Total number of alerts affected by failed deliveries.");
    metrics::describe_gauge!("notifications_queue_length", Unit::Count, "The number of alerts currently waiting in the notification queue.");
    metrics::describe_gauge!("notifications_queue_capacity", Unit::Count, "The configured capacity of the notification queue.");
    metrics::describe_histogram!("notifications_latency_seconds", Unit::Seconds, "Latency of alert batch deliveries to the remote Alertmanager.");
    metrics::describe_counter!("forked_remote_syncs_total", Unit::Count, "Background configuration syncs to the remote Alertmanager, labeled by outcome.");
    metrics::describe_counter!("forked_shadow_errors_total", Unit::Count, "Errors from the non-authoritative backend, labeled by operation.");
    metrics::describe_gauge!("process_cpu_usage_percent", Unit::Percent, "The percentage of CPU time the process is currently using.");
    metrics::describe_gauge!("process_memory_usage_bytes", Unit::Bytes, "The resident set size of the process, in bytes.");
}

/// Handles for the notification sender's metrics, labeled by destination.
#[derive(Clone)]
pub struct SenderMetrics {
    pub accepted_total: Counter,
    pub sent_total: Counter,
    pub dropped_total: Counter,
    pub errors_total: Counter,
    pub queue_length: Gauge,
    pub queue_capacity: Gauge,
    pub latency_seconds: Histogram,
}

impl std::fmt::Debug for SenderMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderMetrics").finish_non_exhaustive()
    }
}

impl SenderMetrics {
    /// Registers the sender series for `destination` with the current recorder.
    pub fn new(destination: &str) -> Self {
        let dest = destination.to_string();
        Self {
            accepted_total: metrics::counter!("notifications_accepted_total", DESTINATION_LABEL => dest.clone()),
            sent_total: metrics::counter!("notifications_sent_total", DESTINATION_LABEL => dest.clone()),
            dropped_total: metrics::counter!("notifications_dropped_total", DESTINATION_LABEL => dest.clone()),
            errors_total: metrics::counter!("notifications_errors_total", DESTINATION_LABEL => dest.clone()),
            queue_length: metrics::gauge!("notifications_queue_length", DESTINATION_LABEL => dest.clone()),
            queue_capacity: metrics::gauge!("notifications_queue_capacity", DESTINATION_LABEL => dest.clone()),
            latency_seconds: metrics::histogram!("notifications_latency_seconds", DESTINATION_LABEL => dest),
        }
    }
}

/// Operations whose shadow failures are counted.
pub const SHADOW_OPERATIONS: &[&str] = &[
    "apply_config",
    "save_and_apply_config",
    "save_and_apply_default_config",
    "create_silence",
    "delete_silence",
    "stop_and_wait",
];

/// Handles for the forked notifier's metrics.
#[derive(Clone)]
pub struct ForkedMetrics {
    pub remote_syncs_success: Counter,
    pub remote_syncs_failure: Counter,
    shadow_errors: HashMap<&'static str, Counter>,
}

impl std::fmt::Debug for ForkedMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForkedMetrics").finish_non_exhaustive()
    }
}

impl ForkedMetrics {
    pub fn new() -> Self {
        Self {
            remote_syncs_success: metrics::counter!("forked_remote_syncs_total", "outcome" => "success"),
            remote_syncs_failure: metrics::counter!("forked_remote_syncs_total", "outcome" => "failure"),
            shadow_errors: SHADOW_OPERATIONS
                .iter()
                .map(|op| (*op, metrics::counter!("forked_shadow_errors_total", "operation" => *op)))
                .collect(),
        }
    }

    /// Counts a failure on the non-authoritative backend.
    pub fn increment_shadow_error(&self, operation: &'static str) {
        match self.shadow_errors.get(operation) {
            Some(counter) => counter.increment(1),
            None => metrics::counter!("forked_shadow_errors_total", "operation" => operation).increment(1),
        }
    }
}

impl Default for ForkedMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// The unspawned tasks of an initialized metrics system.
pub struct MetricsTasks {
    pub server: MetricsServer,
    pub addr: SocketAddr,
    /// Present when process metrics are enabled.
    pub collector: Option<SystemCollector>,
}

/// Builder for the metrics system.
///
/// Installs the `PrometheusRecorder` as the global recorder and prepares the
/// `MetricsServer` that exposes it.
pub struct MetricsBuilder {
    config: MetricsConfig,
}

impl MetricsBuilder {
    pub fn new(config: MetricsConfig) -> Self {
        Self { config }
    }

    /// Initializes the metrics system.
    ///
    /// Returns `None` when metrics are disabled in the configuration. The
    /// server and collector are returned unspawned; the caller decides where
    /// they run.
    pub fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<Option<MetricsTasks>> {
        if !self.config.enabled {
            return Ok(None);
        }

        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .context("invalid histogram buckets")?
            .build_recorder();
        let handle = recorder.handle();

        // Bind before installing the recorder so a bad address fails startup
        // without leaving a half-initialized recorder behind.
        let listener = std::net::TcpListener::bind(self.config.listen_address).with_context(|| {
            format!("failed to bind metrics server to {}", self.config.listen_address)
        })?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;
        let listener = TcpListener::from_std(listener)?;

        metrics::set_global_recorder(recorder)
            .map_err(|e| anyhow::anyhow!("failed to install Prometheus recorder: {}", e))?;
        describe_metrics();

        let collector = self.config.system_metrics_enabled.then(SystemCollector::new);

        Ok(Some(MetricsTasks {
            server: MetricsServer::new(listener, handle, shutdown_rx),
            addr,
            collector,
        }))
    }
}
