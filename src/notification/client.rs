//! A client for posting alert batches to a remote Alertmanager.

use crate::notification::Alert;
use async_trait::async_trait;
use reqwest::Url;
use tracing::{debug, error, instrument};

/// Path of the alert ingestion endpoint, relative to the Alertmanager URL.
pub const ALERTS_PATH: &str = "alertmanager/api/v2/alerts";

/// A transport that can deliver a batch of alerts.
#[async_trait]
pub trait AlertsClient: Send + Sync {
    /// Posts a batch of alerts. Timeouts are imposed by the caller.
    async fn post_alerts(&self, alerts: &[Alert]) -> anyhow::Result<()>;

    /// A descriptive name for the destination, used to label metrics.
    fn destination(&self) -> String;
}

/// Posts alerts over HTTP using a preconfigured `reqwest::Client`.
pub struct HttpAlertsClient {
    client: reqwest::Client,
    url: Url,
    basic_auth: Option<(String, String)>,
}

impl HttpAlertsClient {
    /// Creates a client posting to `<base>/alertmanager/api/v2/alerts`.
    ///
    /// `client` is expected to carry the tenant headers and credentials.
    pub fn new(client: reqwest::Client, base: &Url) -> anyhow::Result<Self> {
        let url = base.join(ALERTS_PATH)?;
        Ok(Self {
            client,
            url,
            basic_auth: None,
        })
    }

    pub fn with_basic_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.basic_auth = Some((user.into(), password.into()));
        self
    }
}

#[async_trait]
impl AlertsClient for HttpAlertsClient {
    #[instrument(skip(self, alerts), fields(count = alerts.len()))]
    async fn post_alerts(&self, alerts: &[Alert]) -> anyhow::Result<()> {
        if alerts.is_empty() {
            return Ok(());
        }

        let mut request = self.client.post(self.url.clone()).json(alerts);
        if let Some((user, password)) = &self.basic_auth {
            request = request.basic_auth(user, Some(password));
        }
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!("Successfully posted batch to remote Alertmanager.");
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        error!(
            status = %status,
            body = %text,
            "Failed to post alerts to remote Alertmanager"
        );
        anyhow::bail!(
            "failed to post alerts: status {}, body: {}",
            status,
            text
        )
    }

    fn destination(&self) -> String {
        self.url.to_string()
    }
}
