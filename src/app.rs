//! The main application logic, decoupled from the entry point.

use crate::{
    api::{ApiServer, ApiState},
    backend::{load_default_config, InProcessBackend, RemoteBackend, RemoteBackendConfig},
    config::Config,
    core::{Backend, ConfigStore},
    errors::StoreError,
    forked::{new_forked_notifier, ForkedOptions},
    internal_metrics::{MetricsBuilder, MetricsTasks},
    store::MemoryConfigStore,
    task_manager::TaskManager,
};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

/// A handle to the running application.
pub struct App {
    task_manager: TaskManager,
    backend: Arc<dyn Backend>,
    metrics_addr: Option<SocketAddr>,
    api_addr: Option<SocketAddr>,
}

impl App {
    /// Creates a new `AppBuilder` to construct an `App`.
    pub fn builder(config: Config) -> AppBuilder {
        AppBuilder::new(config)
    }

    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_addr
    }

    pub fn api_addr(&self) -> Option<SocketAddr> {
        self.api_addr
    }

    /// The composite backend serving this organization.
    pub fn backend(&self) -> Arc<dyn Backend> {
        self.backend.clone()
    }

    /// Waits for the shutdown signal, stops the backends and then waits for
    /// every background task.
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.task_manager.get_shutdown_rx();
        if !*shutdown_rx.borrow() {
            shutdown_rx.changed().await.ok();
        }
        info!("Shutdown signal received, stopping Alertmanagers.");

        self.backend.stop_and_wait().await;
        self.task_manager.shutdown().await;

        info!("All tasks shut down.");
        Ok(())
    }
}

/// Builder for the main application.
///
/// Separates constructing the components from running them, and lets tests
/// swap in their own store or backends.
pub struct AppBuilder {
    config: Config,
    store_override: Option<Arc<dyn ConfigStore>>,
    internal_override: Option<Arc<dyn Backend>>,
    remote_override: Option<Arc<dyn Backend>>,
}

impl AppBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store_override: None,
            internal_override: None,
            remote_override: None,
        }
    }

    /// Overrides the configuration store for testing.
    pub fn store_override(mut self, store: Arc<dyn ConfigStore>) -> Self {
        self.store_override = Some(store);
        self
    }

    /// Overrides the in-process backend for testing.
    pub fn internal_override(mut self, backend: Arc<dyn Backend>) -> Self {
        self.internal_override = Some(backend);
        self
    }

    /// Overrides the remote backend for testing.
    pub fn remote_override(mut self, backend: Arc<dyn Backend>) -> Self {
        self.remote_override = Some(backend);
        self
    }

    /// Builds and initializes all application components, returning a runnable `App`.
    #[instrument(skip_all)]
    pub async fn build(self, shutdown_rx: watch::Receiver<bool>) -> Result<App> {
        let config = self.config;
        let task_manager = TaskManager::new(shutdown_rx.clone());
        let org_id = config.org_id;

        // =========================================================================
        // 1. Metrics
        // =========================================================================
        let metrics_addr = match MetricsBuilder::new(config.metrics.clone()).build(shutdown_rx.clone())? {
            Some(MetricsTasks { server, addr, collector }) => {
                task_manager.spawn("MetricsServer", server.run());
                if let Some(collector) = collector {
                    task_manager.spawn("SystemCollector", collector.run(shutdown_rx.clone()));
                }
                info!(%addr, "Metrics server listening.");
                Some(addr)
            }
            None => None,
        };

        // =========================================================================
        // 2. Store and backends
        // =========================================================================
        let default_config = load_default_config(config.internal.default_config_path.as_deref())?;
        let store = self
            .store_override
            .unwrap_or_else(|| Arc::new(MemoryConfigStore::new()));

        let internal = match self.internal_override {
            Some(backend) => backend,
            None => Arc::new(InProcessBackend::new(
                org_id,
                store.clone(),
                default_config.clone(),
                Duration::from_secs(config.internal.silence_retention_hours * 3600),
            )),
        };
        let remote = match self.remote_override {
            Some(backend) => backend,
            None => {
                let remote_config = RemoteBackendConfig::from_config(&config, default_config);
                Arc::new(RemoteBackend::new(remote_config).context("failed to create remote Alertmanager")?)
            }
        };

        let backend = new_forked_notifier(
            config.forking.mode,
            internal,
            remote,
            store.clone(),
            ForkedOptions {
                org_id,
                sync_interval: Duration::from_secs(config.forking.sync_interval_seconds),
            },
        );
        info!(org_id, mode = %config.forking.mode, "Forked Alertmanager created.");

        // =========================================================================
        // 3. Initial configuration
        // =========================================================================
        apply_initial_config(backend.as_ref(), store.as_ref(), org_id).await;

        // =========================================================================
        // 4. Background maintenance
        // =========================================================================
        {
            let backend = backend.clone();
            let store = store.clone();
            task_manager.spawn_periodic(
                "ConfigSync",
                Duration::from_secs(config.internal.config_poll_interval_seconds),
                move || {
                    let backend = backend.clone();
                    let store = store.clone();
                    async move { sync_stored_config(backend.as_ref(), store.as_ref(), org_id).await }
                },
            );
        }
        {
            let backend = backend.clone();
            task_manager.spawn_periodic(
                "CleanUp",
                Duration::from_secs(config.internal.maintenance_interval_seconds),
                move || {
                    let backend = backend.clone();
                    async move { backend.clean_up().await }
                },
            );
        }

        // =========================================================================
        // 5. Operator API
        // =========================================================================
        let api_addr = if config.api.enabled {
            let listener = TcpListener::bind(config.api.listen_address)
                .await
                .with_context(|| format!("failed to bind API server to {}", config.api.listen_address))?;
            let addr = listener.local_addr()?;
            let state = Arc::new(ApiState {
                backend: backend.clone(),
                org_id,
            });
            task_manager.spawn("ApiServer", ApiServer::new(listener, state, shutdown_rx).run());
            info!(%addr, "API server listening.");
            Some(addr)
        } else {
            None
        };

        Ok(App {
            task_manager,
            backend,
            metrics_addr,
            api_addr,
        })
    }
}

/// Applies the stored configuration, saving the default one first when the
/// organization has none. Failures are logged; startup continues.
async fn apply_initial_config(backend: &dyn Backend, store: &dyn ConfigStore, org_id: i64) {
    if let Err(StoreError::NotFound(_)) = store.get_latest_config(org_id).await {
        info!(org_id, "No stored configuration, applying the default.");
        if let Err(e) = backend.save_and_apply_default_config().await {
            warn!(org_id, error = %e, "Failed to apply default configuration.");
        }
    }
    sync_stored_config(backend, store, org_id).await;
}

async fn sync_stored_config(backend: &dyn Backend, store: &dyn ConfigStore, org_id: i64) {
    match store.get_latest_config(org_id).await {
        Ok(config) => match backend.apply_config(&config).await {
            Ok(()) => debug!(org_id, hash = %config.hash, "Applied stored configuration."),
            Err(e) => warn!(org_id, error = %e, "Failed to apply stored configuration."),
        },
        Err(e) => warn!(org_id, error = %e, "Failed to read stored configuration."),
    }
}
