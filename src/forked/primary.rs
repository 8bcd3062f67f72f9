use super::{shadow_error, ForkedOptions};
use crate::core::{
    AlertConfiguration, AlertGroup, AlertQuery, AlertmanagerStatus, Backend, BackendResult,
    GettableAlert, GettableSilence, OrgId, PostableAlert, PostableSilence, Receiver,
    TestReceiversConfig, TestReceiversResult, TestTemplatesConfig, TestTemplatesResults,
};
use crate::internal_metrics::ForkedMetrics;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::instrument;

/// The remote backend is authoritative; the in-process one receives shadow
/// writes of configuration and silences.
pub struct PrimaryForkedNotifier {
    org_id: OrgId,
    internal: Arc<dyn Backend>,
    remote: Arc<dyn Backend>,
    metrics: ForkedMetrics,
}

impl PrimaryForkedNotifier {
    pub fn new(internal: Arc<dyn Backend>, remote: Arc<dyn Backend>, options: ForkedOptions) -> Self {
        Self {
            org_id: options.org_id,
            internal,
            remote,
            metrics: ForkedMetrics::new(),
        }
    }

    fn observe(&self, operation: &'static str, result: BackendResult<()>) {
        if let Err(e) = result {
            shadow_error(&self.metrics, operation, &e);
        }
    }
}

#[async_trait]
impl Backend for PrimaryForkedNotifier {
    #[instrument(skip_all, fields(org_id = self.org_id, hash = %config.hash))]
    async fn apply_config(&self, config: &AlertConfiguration) -> BackendResult<()> {
        let result = self.remote.apply_config(config).await;
        self.observe("apply_config", self.internal.apply_config(config).await);
        result
    }

    async fn save_and_apply_config(&self, config: &AlertConfiguration) -> BackendResult<()> {
        let result = self.remote.save_and_apply_config(config).await;
        self.observe(
            "save_and_apply_config",
            self.internal.save_and_apply_config(config).await,
        );
        result
    }

    async fn save_and_apply_default_config(&self) -> BackendResult<()> {
        let result = self.remote.save_and_apply_default_config().await;
        self.observe(
            "save_and_apply_default_config",
            self.internal.save_and_apply_default_config().await,
        );
        result
    }

    async fn get_status(&self) -> BackendResult<AlertmanagerStatus> {
        self.remote.get_status().await
    }

    /// Creates the silence remotely, then mirrors it in-process under the
    /// remote id.
    async fn create_silence(&self, silence: &PostableSilence) -> BackendResult<String> {
        let id = self.remote.create_silence(silence).await?;
        let shadow = PostableSilence {
            id: Some(id.clone()),
            ..silence.clone()
        };
        self.observe(
            "create_silence",
            self.internal.create_silence(&shadow).await.map(|_| ()),
        );
        Ok(id)
    }

    async fn delete_silence(&self, id: &str) -> BackendResult<()> {
        self.remote.delete_silence(id).await?;
        self.observe("delete_silence", self.internal.delete_silence(id).await);
        Ok(())
    }

    async fn get_silence(&self, id: &str) -> BackendResult<GettableSilence> {
        self.remote.get_silence(id).await
    }

    async fn list_silences(&self, filter: &[String]) -> BackendResult<Vec<GettableSilence>> {
        self.remote.list_silences(filter).await
    }

    async fn get_alerts(&self, query: &AlertQuery) -> BackendResult<Vec<GettableAlert>> {
        self.remote.get_alerts(query).await
    }

    async fn get_alert_groups(&self, query: &AlertQuery) -> BackendResult<Vec<AlertGroup>> {
        self.remote.get_alert_groups(query).await
    }

    async fn put_alerts(&self, alerts: &[PostableAlert]) -> BackendResult<()> {
        self.remote.put_alerts(alerts).await
    }

    async fn get_receivers(&self) -> BackendResult<Vec<Receiver>> {
        self.remote.get_receivers().await
    }

    async fn test_receivers(&self, config: &TestReceiversConfig) -> BackendResult<TestReceiversResult> {
        self.remote.test_receivers(config).await
    }

    async fn test_template(&self, config: &TestTemplatesConfig) -> BackendResult<TestTemplatesResults> {
        self.remote.test_template(config).await
    }

    async fn clean_up(&self) {
        self.internal.clean_up().await;
    }

    async fn stop_and_wait(&self) {
        tokio::join!(self.internal.stop_and_wait(), self.remote.stop_and_wait());
    }

    fn ready(&self) -> bool {
        self.internal.ready() && self.remote.ready()
    }
}
