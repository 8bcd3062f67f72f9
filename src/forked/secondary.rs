use super::{shadow_error, ForkedOptions};
use crate::core::{
    AlertConfiguration, AlertGroup, AlertQuery, AlertmanagerStatus, Backend, BackendResult,
    ConfigStore, GettableAlert, GettableSilence, OrgId, PostableAlert, PostableSilence, Receiver,
    TestReceiversConfig, TestReceiversResult, TestTemplatesConfig, TestTemplatesResults,
};
use crate::internal_metrics::ForkedMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// The in-process backend is authoritative; the remote one is a replica.
pub struct SecondaryForkedNotifier {
    org_id: OrgId,
    internal: Arc<dyn Backend>,
    remote: Arc<dyn Backend>,
    store: Arc<dyn ConfigStore>,
    sync_interval: Duration,
    /// When the remote last accepted a configuration. Locked for the whole
    /// check-then-push sequence.
    last_sync: Mutex<Option<Instant>>,
    metrics: ForkedMetrics,
}

impl SecondaryForkedNotifier {
    pub fn new(
        internal: Arc<dyn Backend>,
        remote: Arc<dyn Backend>,
        store: Arc<dyn ConfigStore>,
        options: ForkedOptions,
    ) -> Self {
        Self {
            org_id: options.org_id,
            internal,
            remote,
            store,
            sync_interval: options.sync_interval,
            last_sync: Mutex::new(None),
            metrics: ForkedMetrics::new(),
        }
    }

    /// Pushes `config` to the remote if the sync interval has elapsed. A
    /// sync already in progress makes this a no-op.
    async fn maybe_sync_remote(&self, config: &AlertConfiguration) {
        let Ok(mut last_sync) = self.last_sync.try_lock() else {
            debug!("Remote sync already in progress, skipping.");
            return;
        };
        if let Some(at) = *last_sync {
            if at.elapsed() < self.sync_interval {
                return;
            }
        }

        match self.remote.apply_config(config).await {
            Ok(()) => {
                *last_sync = Some(Instant::now());
                self.metrics.remote_syncs_success.increment(1);
                debug!(hash = %config.hash, "Synced configuration to remote Alertmanager.");
            }
            Err(e) => {
                self.metrics.remote_syncs_failure.increment(1);
                warn!(error = %e, "Failed to sync configuration to remote Alertmanager.");
            }
        }
    }
}

#[async_trait]
impl Backend for SecondaryForkedNotifier {
    #[instrument(skip_all, fields(org_id = self.org_id, hash = %config.hash))]
    async fn apply_config(&self, config: &AlertConfiguration) -> BackendResult<()> {
        let result = self.internal.apply_config(config).await;
        self.maybe_sync_remote(config).await;
        result
    }

    async fn save_and_apply_config(&self, config: &AlertConfiguration) -> BackendResult<()> {
        self.internal.save_and_apply_config(config).await
    }

    async fn save_and_apply_default_config(&self) -> BackendResult<()> {
        self.internal.save_and_apply_default_config().await
    }

    async fn get_status(&self) -> BackendResult<AlertmanagerStatus> {
        self.internal.get_status().await
    }

    async fn create_silence(&self, silence: &PostableSilence) -> BackendResult<String> {
        self.internal.create_silence(silence).await
    }

    async fn delete_silence(&self, id: &str) -> BackendResult<()> {
        self.internal.delete_silence(id).await
    }

    async fn get_silence(&self, id: &str) -> BackendResult<GettableSilence> {
        self.internal.get_silence(id).await
    }

    async fn list_silences(&self, filter: &[String]) -> BackendResult<Vec<GettableSilence>> {
        self.internal.list_silences(filter).await
    }

    async fn get_alerts(&self, query: &AlertQuery) -> BackendResult<Vec<GettableAlert>> {
        self.internal.get_alerts(query).await
    }

    async fn get_alert_groups(&self, query: &AlertQuery) -> BackendResult<Vec<AlertGroup>> {
        self.internal.get_alert_groups(query).await
    }

    async fn put_alerts(&self, alerts: &[PostableAlert]) -> BackendResult<()> {
        self.internal.put_alerts(alerts).await
    }

    async fn get_receivers(&self) -> BackendResult<Vec<Receiver>> {
        self.internal.get_receivers().await
    }

    async fn test_receivers(&self, config: &TestReceiversConfig) -> BackendResult<TestReceiversResult> {
        self.internal.test_receivers(config).await
    }

    async fn test_template(&self, config: &TestTemplatesConfig) -> BackendResult<TestTemplatesResults> {
        self.internal.test_template(config).await
    }

    async fn clean_up(&self) {
        self.internal.clean_up().await;
    }

    /// Stops both backends, then hands the latest stored configuration to
    /// the remote so a later cut-over starts from current state.
    async fn stop_and_wait(&self) {
        self.internal.stop_and_wait().await;
        self.remote.stop_and_wait().await;

        let config = match self.store.get_latest_config(self.org_id).await {
            Ok(config) => config,
            Err(e) => {
                warn!(org_id = self.org_id, error = %e, "Failed to read latest configuration for remote hand-off.");
                return;
            }
        };
        match self.remote.apply_config(&config).await {
            Ok(()) => info!(org_id = self.org_id, hash = %config.hash, "Handed latest configuration to remote Alertmanager."),
            Err(e) => shadow_error(&self.metrics, "stop_and_wait", &e),
        }
    }

    fn ready(&self) -> bool {
        self.internal.ready() && self.remote.ready()
    }
}
