//! A client for a remote, Alertmanager-compatible service.
//!
//! Reads and silence writes go straight to the remote API. Alerts are
//! sanitized and handed to a [`NotificationSender`], which delivers them in
//! the background.

use crate::config::{Config, SenderConfig};
use crate::core::{
    AlertConfiguration, AlertGroup, AlertQuery, AlertmanagerStatus, Backend, BackendResult,
    GettableAlert, GettableSilence, Label, OrgId, PostableAlert, PostableSilence, Receiver,
    TestReceiversConfig, TestReceiversResult, TestTemplatesConfig, TestTemplatesResults,
};
use crate::errors::BackendError;
use crate::notification::client::HttpAlertsClient;
use crate::notification::sender::NotificationSender;
use crate::notification::Alert;
use crate::sanitize::sanitize_label_set;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Internal label that must never reach the remote Alertmanager.
pub const NAMESPACE_UID_LABEL: &str = "__alert_rule_namespace_uid__";

const READY_PATH: &str = "-/ready";
const CONFIG_PATH: &str = "api/v1/grafana/config";
const RECEIVERS_PATH: &str = "api/v1/grafana/receivers";
const RECEIVERS_TEST_PATH: &str = "api/v1/grafana/receivers/test";
const TEMPLATES_TEST_PATH: &str = "api/v1/grafana/templates/test";
const STATUS_PATH: &str = "alertmanager/api/v2/status";
const SILENCES_PATH: &str = "alertmanager/api/v2/silences";
const SILENCE_PATH: &str = "alertmanager/api/v2/silence";
const ALERTS_PATH: &str = "alertmanager/api/v2/alerts";
const ALERT_GROUPS_PATH: &str = "alertmanager/api/v2/alerts/groups";

/// Everything needed to construct a [`RemoteBackend`].
#[derive(Debug, Clone)]
pub struct RemoteBackendConfig {
    pub org_id: OrgId,
    pub url: String,
    pub tenant_id: String,
    pub basic_auth_password: String,
    pub timeout: Duration,
    pub promote_config: bool,
    pub external_url: String,
    /// Raw document pushed by `save_and_apply_default_config`.
    pub default_config: String,
    pub sender: SenderConfig,
}

impl RemoteBackendConfig {
    pub fn from_config(config: &Config, default_config: String) -> Self {
        Self {
            org_id: config.org_id,
            url: config.remote.url.clone(),
            tenant_id: config.remote.tenant_id.clone(),
            basic_auth_password: config.remote.basic_auth_password.clone(),
            timeout: Duration::from_secs(config.remote.timeout_seconds),
            promote_config: config.remote.promote_config,
            external_url: config.remote.external_url.clone(),
            default_config,
            sender: config.sender.clone(),
        }
    }
}

/// The payload of a configuration push.
#[derive(Debug, Serialize)]
struct UserGrafanaConfig<'a> {
    grafana_alertmanager_config: serde_json::Value,
    hash: &'a str,
    created_at: i64,
    default: bool,
    promoted: bool,
    external_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostSilenceResponse {
    #[serde(rename = "silenceID")]
    silence_id: String,
}

pub struct RemoteBackend {
    org_id: OrgId,
    tenant_id: String,
    password: Option<String>,
    base: Url,
    http: reqwest::Client,
    timeout: Duration,
    promote_config: bool,
    external_url: String,
    default_config: String,
    sender: NotificationSender,
    ready: AtomicBool,
    /// Hash of the last configuration the remote accepted.
    last_hash: Mutex<Option<String>>,
}

impl RemoteBackend {
    /// Validates the connection settings, builds the HTTP client and starts
    /// the notification sender. Must be called from within a Tokio runtime.
    pub fn new(config: RemoteBackendConfig) -> BackendResult<Self> {
        if config.url.trim().is_empty() {
            return Err(BackendError::InvalidConfig(format!(
                "empty remote Alertmanager URL for tenant '{}'",
                config.tenant_id
            )));
        }
        let mut base = Url::parse(&config.url).map_err(|e| {
            BackendError::InvalidConfig(format!("unable to parse remote Alertmanager URL: {}", e))
        })?;
        // Relative joins replace the last path segment unless it ends in '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        let tenant = HeaderValue::from_str(&config.tenant_id)
            .map_err(|e| BackendError::InvalidConfig(format!("invalid tenant id: {}", e)))?;
        headers.insert(HeaderName::from_static("x-scope-orgid"), tenant);
        headers.insert(
            HeaderName::from_static("x-remote-alertmanager"),
            HeaderValue::from_static("true"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()?;

        let password = Some(config.basic_auth_password.clone()).filter(|p| !p.is_empty());
        let mut alerts_client = HttpAlertsClient::new(http.clone(), &base)
            .map_err(|e| BackendError::InvalidConfig(e.to_string()))?;
        if let Some(password) = &password {
            alerts_client = alerts_client.with_basic_auth(config.tenant_id.clone(), password.clone());
        }
        let sender = NotificationSender::new(&config.sender, Arc::new(alerts_client))
            .map_err(|e| BackendError::InvalidConfig(format!("{:#}", e)))?;

        info!(org_id = config.org_id, url = %base, "Remote Alertmanager client created.");
        Ok(Self {
            org_id: config.org_id,
            tenant_id: config.tenant_id,
            password,
            base,
            http,
            timeout: config.timeout,
            promote_config: config.promote_config,
            external_url: config.external_url,
            default_config: config.default_config,
            sender,
            ready: AtomicBool::new(false),
            last_hash: Mutex::new(None),
        })
    }

    /// The sender that delivers this backend's alerts.
    pub fn sender(&self) -> &NotificationSender {
        &self.sender
    }

    fn endpoint(&self, path: &str) -> BackendResult<Url> {
        self.base
            .join(path)
            .map_err(|e| BackendError::InvalidConfig(format!("invalid request path {}: {}", path, e)))
    }

    /// URL of a single silence. The id is appended as one percent-encoded
    /// segment, so it cannot leave the silence path.
    fn silence_url(&self, id: &str) -> BackendResult<Url> {
        if matches!(id, "" | "." | "..") {
            return Err(BackendError::SilenceNotFound(id.to_string()));
        }
        let mut url = self.endpoint(SILENCE_PATH)?;
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidConfig(format!("remote URL {} cannot carry a path", self.base)))?
            .push(id);
        Ok(url)
    }

    fn request(&self, method: Method, path: &str) -> BackendResult<RequestBuilder> {
        Ok(self.request_to(method, self.endpoint(path)?))
    }

    fn request_to(&self, method: Method, url: Url) -> RequestBuilder {
        let mut request = self.http.request(method, url);
        if let Some(password) = &self.password {
            request = request.basic_auth(&self.tenant_id, Some(password));
        }
        request
    }

    async fn execute(&self, request: RequestBuilder) -> BackendResult<Response> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout(self.timeout)
            } else {
                BackendError::Request(e)
            }
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(BackendError::UnexpectedStatus {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> BackendResult<T> {
        let bytes = self.execute(request).await?.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }

    /// Checks the remote readiness endpoint and records the outcome.
    #[instrument(skip(self), fields(org_id = self.org_id))]
    pub async fn check_readiness(&self) -> BackendResult<()> {
        let result = self.execute(self.request(Method::GET, READY_PATH)?).await;
        match &result {
            Ok(_) => {
                if !self.ready.swap(true, Ordering::SeqCst) {
                    info!("Remote Alertmanager is ready.");
                }
            }
            Err(e) => {
                self.ready.store(false, Ordering::SeqCst);
                warn!(error = %e, "Remote Alertmanager is not ready.");
            }
        }
        result.map(|_| ())
    }

    /// Sends the configuration and records its hash. Callers hold the hash
    /// lock for the whole exchange.
    async fn push_config(
        &self,
        config: &AlertConfiguration,
        last_hash: &mut Option<String>,
    ) -> BackendResult<()> {
        let document: serde_json::Value = serde_json::from_str(&config.raw)
            .map_err(|e| BackendError::InvalidConfig(format!("configuration is not valid JSON: {}", e)))?;
        let payload = UserGrafanaConfig {
            grafana_alertmanager_config: document,
            hash: &config.hash,
            created_at: config.created_at.timestamp(),
            default: config.is_default,
            promoted: self.promote_config,
            external_url: &self.external_url,
        };
        self.execute(self.request(Method::POST, CONFIG_PATH)?.json(&payload))
            .await?;
        *last_hash = Some(config.hash.clone());
        info!(org_id = self.org_id, hash = %config.hash, "Pushed configuration to remote Alertmanager.");
        Ok(())
    }

    fn alert_query(request: RequestBuilder, query: &AlertQuery) -> RequestBuilder {
        let mut params: Vec<(&str, String)> = vec![
            ("active", query.active.to_string()),
            ("silenced", query.silenced.to_string()),
            ("inhibited", query.inhibited.to_string()),
        ];
        params.extend(query.filter.iter().map(|f| ("filter", f.clone())));
        if let Some(receiver) = &query.receiver {
            params.push(("receiver", receiver.clone()));
        }
        request.query(&params)
    }

    fn silence_not_found(id: &str, err: BackendError) -> BackendError {
        match err {
            BackendError::UnexpectedStatus { status, .. } if status == StatusCode::NOT_FOUND.as_u16() => {
                BackendError::SilenceNotFound(id.to_string())
            }
            other => other,
        }
    }
}

#[async_trait]
impl Backend for RemoteBackend {
    /// Pushes the configuration unless the remote already runs it.
    async fn apply_config(&self, config: &AlertConfiguration) -> BackendResult<()> {
        if !self.ready() {
            self.check_readiness().await?;
        }
        let mut last = self.last_hash.lock().await;
        if last.as_deref() == Some(config.hash.as_str()) {
            debug!(hash = %config.hash, "Remote configuration unchanged, not sending.");
            return Ok(());
        }
        self.push_config(config, &mut last).await
    }

    async fn save_and_apply_config(&self, config: &AlertConfiguration) -> BackendResult<()> {
        let mut last = self.last_hash.lock().await;
        self.push_config(config, &mut last).await
    }

    async fn save_and_apply_default_config(&self) -> BackendResult<()> {
        let config = AlertConfiguration::default_for(self.org_id, self.default_config.clone());
        let mut last = self.last_hash.lock().await;
        self.push_config(&config, &mut last).await
    }

    async fn get_status(&self) -> BackendResult<AlertmanagerStatus> {
        self.fetch(self.request(Method::GET, STATUS_PATH)?).await
    }

    async fn create_silence(&self, silence: &PostableSilence) -> BackendResult<String> {
        let response: PostSilenceResponse = self
            .fetch(self.request(Method::POST, SILENCES_PATH)?.json(silence))
            .await?;
        Ok(response.silence_id)
    }

    async fn delete_silence(&self, id: &str) -> BackendResult<()> {
        self.execute(self.request_to(Method::DELETE, self.silence_url(id)?))
            .await
            .map(|_| ())
            .map_err(|e| Self::silence_not_found(id, e))
    }

    async fn get_silence(&self, id: &str) -> BackendResult<GettableSilence> {
        self.fetch(self.request_to(Method::GET, self.silence_url(id)?))
            .await
            .map_err(|e| Self::silence_not_found(id, e))
    }

    async fn list_silences(&self, filter: &[String]) -> BackendResult<Vec<GettableSilence>> {
        let params: Vec<(&str, &str)> = filter.iter().map(|f| ("filter", f.as_str())).collect();
        self.fetch(self.request(Method::GET, SILENCES_PATH)?.query(&params))
            .await
    }

    async fn get_alerts(&self, query: &AlertQuery) -> BackendResult<Vec<GettableAlert>> {
        let request = Self::alert_query(self.request(Method::GET, ALERTS_PATH)?, query);
        self.fetch(request).await
    }

    async fn get_alert_groups(&self, query: &AlertQuery) -> BackendResult<Vec<AlertGroup>> {
        let request = Self::alert_query(self.request(Method::GET, ALERT_GROUPS_PATH)?, query);
        self.fetch(request).await
    }

    /// Sanitizes and enqueues alerts. Delivery happens in the background.
    async fn put_alerts(&self, alerts: &[PostableAlert]) -> BackendResult<()> {
        let mut converted = Vec::with_capacity(alerts.len());
        let mut unusable = 0;
        for alert in alerts {
            let labels = sanitize_label_set(
                alert
                    .labels
                    .iter()
                    .filter(|(name, value)| !value.is_empty() && name.as_str() != NAMESPACE_UID_LABEL),
            );
            if labels.is_empty() {
                unusable += 1;
                continue;
            }
            let annotations = alert
                .annotations
                .iter()
                .filter(|(_, value)| !value.is_empty())
                .map(|(name, value)| Label::new(name.clone(), value.clone()))
                .collect();
            converted.push(Alert {
                labels,
                annotations,
                starts_at: alert.starts_at,
                ends_at: alert.ends_at,
                generator_url: alert.generator_url.clone(),
            });
        }

        if unusable > 0 {
            warn!(count = unusable, "Dropping alerts with no usable labels.");
            self.sender.record_rejected(unusable);
        }
        self.sender.send(converted);
        Ok(())
    }

    async fn get_receivers(&self) -> BackendResult<Vec<Receiver>> {
        self.fetch(self.request(Method::GET, RECEIVERS_PATH)?).await
    }

    async fn test_receivers(&self, config: &TestReceiversConfig) -> BackendResult<TestReceiversResult> {
        self.fetch(self.request(Method::POST, RECEIVERS_TEST_PATH)?.json(config))
            .await
    }

    async fn test_template(&self, config: &TestTemplatesConfig) -> BackendResult<TestTemplatesResults> {
        self.fetch(self.request(Method::POST, TEMPLATES_TEST_PATH)?.json(config))
            .await
    }

    async fn clean_up(&self) {}

    async fn stop_and_wait(&self) {
        self.sender.stop().await;
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
