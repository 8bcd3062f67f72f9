//! # Metrics Server
//!
//! Serves the Prometheus exposition format on `/metrics` until the shutdown
//! signal fires.

use axum::{extract::State, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, trace};

/// Exposes the installed Prometheus recorder to scrapers.
pub struct MetricsServer {
    listener: TcpListener,
    handle: PrometheusHandle,
    shutdown_rx: watch::Receiver<bool>,
}

async fn render(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

impl MetricsServer {
    /// `listener` must already be bound; the server is not spawned here.
    pub fn new(listener: TcpListener, handle: PrometheusHandle, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            listener,
            handle,
            shutdown_rx,
        }
    }

    pub async fn run(self) {
        let Self {
            listener,
            handle,
            mut shutdown_rx,
        } = self;
        let app = Router::new().route("/metrics", get(render)).with_state(handle);

        let shutdown = async move {
            let _ = shutdown_rx.changed().await;
            trace!("Metrics server received shutdown signal.");
        };
        if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            error!(error = %e, "Metrics server failed.");
        }
        trace!("Metrics server task finished.");
    }
}
