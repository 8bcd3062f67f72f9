//! The in-process Alertmanager.
//!
//! Silences and alerts live in memory. Receivers, grouping and templates
//! come from the applied Grafana-style JSON configuration, which is parsed
//! on every apply and swapped in atomically.

use crate::backend::fingerprint;
use crate::core::{
    AlertConfiguration, AlertGroup, AlertQuery, AlertState, AlertStatus, AlertmanagerStatus,
    Backend, BackendResult, ConfigStore, GettableAlert, GettableSilence, Integration, LabelSet,
    OrgId, PostableAlert, PostableSilence, Receiver, ReceiverRef, SilenceState, SilenceStatus,
    TestIntegrationResult, TestReceiverResult, TestReceiversConfig, TestReceiversResult,
    TestTemplateError, TestTemplateResult, TestTemplatesConfig, TestTemplatesResults,
};
use crate::errors::BackendError;
use crate::matchers::{self, CompiledMatcher};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

/// Alerts without an explicit end are resolved this long after they start.
fn resolve_timeout() -> Duration {
    Duration::minutes(5)
}

/// Integration types a receiver may use.
pub const KNOWN_INTEGRATIONS: &[&str] = &[
    "alertmanager", "dingding", "discord", "email", "googlechat", "kafka", "line", "mqtt",
    "oncall", "opsgenie", "pagerduty", "pushover", "sensugo", "slack", "sns", "teams",
    "telegram", "threema", "victorops", "webex", "webhook", "wecom",
];

// =============================================================================
// Configuration document
// =============================================================================

/// The Grafana Alertmanager configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GrafanaConfig {
    pub template_files: BTreeMap<String, String>,
    pub alertmanager_config: ApiConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub route: Option<Route>,
    pub receivers: Vec<ReceiverConfig>,
    pub templates: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Route {
    pub receiver: String,
    pub group_by: Vec<String>,
    pub routes: Vec<Route>,
}

impl Route {
    fn collect_receivers<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        if !self.receiver.is_empty() {
            out.insert(&self.receiver);
        }
        for child in &self.routes {
            child.collect_receivers(out);
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub name: String,
    pub grafana_managed_receiver_configs: Vec<IntegrationConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    pub uid: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub disable_resolve_message: bool,
    pub settings: serde_json::Value,
}

impl GrafanaConfig {
    /// Parses and validates a raw configuration document.
    pub fn parse(raw: &str) -> BackendResult<Self> {
        let config: GrafanaConfig = serde_json::from_str(raw)
            .map_err(|e| BackendError::InvalidConfig(format!("failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BackendResult<()> {
        let am = &self.alertmanager_config;
        let route = am
            .route
            .as_ref()
            .ok_or_else(|| BackendError::InvalidConfig("no route provided in config".to_string()))?;
        if route.receiver.is_empty() {
            return Err(BackendError::InvalidConfig(
                "root route must specify a default receiver".to_string(),
            ));
        }

        let mut names = BTreeSet::new();
        for receiver in &am.receivers {
            if !names.insert(receiver.name.as_str()) {
                return Err(BackendError::InvalidConfig(format!(
                    "notification config name \"{}\" is not unique",
                    receiver.name
                )));
            }
            for integration in &receiver.grafana_managed_receiver_configs {
                if !KNOWN_INTEGRATIONS.contains(&integration.kind.as_str()) {
                    return Err(BackendError::InvalidConfig(format!(
                        "unknown integration type \"{}\" in receiver \"{}\"",
                        integration.kind, receiver.name
                    )));
                }
            }
        }

        let mut used = BTreeSet::new();
        route.collect_receivers(&mut used);
        if let Some(missing) = used.iter().find(|name| !names.contains(*name)) {
            return Err(BackendError::InvalidConfig(format!(
                "undefined receiver \"{}\" used in route",
                missing
            )));
        }
        Ok(())
    }

    fn root_route(&self) -> Option<&Route> {
        self.alertmanager_config.route.as_ref()
    }
}

/// The configuration in effect, kept with its parsed form.
#[derive(Debug)]
struct Applied {
    config: AlertConfiguration,
    parsed: GrafanaConfig,
}

// =============================================================================
// Stored state
// =============================================================================

#[derive(Debug, Clone)]
struct StoredSilence {
    silence: PostableSilence,
    matchers: Vec<CompiledMatcher>,
    updated_at: DateTime<Utc>,
}

impl StoredSilence {
    fn state(&self, now: DateTime<Utc>) -> SilenceState {
        SilenceState::at(self.silence.starts_at, self.silence.ends_at, now)
    }

    fn to_gettable(&self, id: &str, now: DateTime<Utc>) -> GettableSilence {
        GettableSilence {
            id: id.to_string(),
            matchers: self.silence.matchers.clone(),
            starts_at: self.silence.starts_at,
            ends_at: self.silence.ends_at,
            updated_at: self.updated_at,
            created_by: self.silence.created_by.clone(),
            comment: self.silence.comment.clone(),
            status: SilenceStatus {
                state: self.state(now),
            },
        }
    }

    /// The silence's matchers as a label set, used to evaluate list filters.
    fn matcher_labels(&self) -> LabelSet {
        self.silence
            .matchers
            .iter()
            .map(|m| (m.name.clone(), m.value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone)]
struct StoredAlert {
    labels: LabelSet,
    annotations: LabelSet,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    generator_url: String,
}

// =============================================================================
// Backend
// =============================================================================

/// An Alertmanager that runs inside this process.
pub struct InProcessBackend {
    org_id: OrgId,
    store: Arc<dyn ConfigStore>,
    default_config: String,
    silence_retention: Duration,
    started_at: DateTime<Utc>,
    applied: ArcSwapOption<Applied>,
    silences: RwLock<HashMap<String, StoredSilence>>,
    alerts: RwLock<HashMap<String, StoredAlert>>,
    stopped: AtomicBool,
}

impl InProcessBackend {
    pub fn new(
        org_id: OrgId,
        store: Arc<dyn ConfigStore>,
        default_config: String,
        silence_retention: std::time::Duration,
    ) -> Self {
        Self {
            org_id,
            store,
            default_config,
            silence_retention: Duration::from_std(silence_retention)
                .unwrap_or_else(|_| Duration::hours(120)),
            started_at: Utc::now(),
            applied: ArcSwapOption::empty(),
            silences: RwLock::new(HashMap::new()),
            alerts: RwLock::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// The configuration currently in effect, if any.
    pub fn current_config(&self) -> Option<AlertConfiguration> {
        self.applied.load().as_ref().map(|a| a.config.clone())
    }

    fn applied(&self) -> BackendResult<Arc<Applied>> {
        self.applied.load_full().ok_or(BackendError::NotReady)
    }

    fn apply_parsed(&self, config: &AlertConfiguration, parsed: GrafanaConfig) {
        info!(
            org_id = self.org_id,
            hash = %config.hash,
            receivers = parsed.alertmanager_config.receivers.len(),
            "Applied Alertmanager configuration."
        );
        self.applied.store(Some(Arc::new(Applied {
            config: config.clone(),
            parsed,
        })));
    }

    async fn save_and_apply(&self, config: &AlertConfiguration) -> BackendResult<()> {
        let parsed = GrafanaConfig::parse(&config.raw)?;
        self.store.save_config(config.clone()).await?;
        self.apply_parsed(config, parsed);
        Ok(())
    }

    fn validate_silence(silence: &PostableSilence) -> BackendResult<Vec<CompiledMatcher>> {
        if silence.matchers.is_empty() {
            return Err(BackendError::InvalidSilence("at least one matcher required".to_string()));
        }
        if silence.ends_at <= silence.starts_at {
            return Err(BackendError::InvalidSilence(
                "end time must not be before start time".to_string(),
            ));
        }
        if silence.ends_at <= Utc::now() {
            return Err(BackendError::InvalidSilence("end time can't be in the past".to_string()));
        }
        silence
            .matchers
            .iter()
            .map(|m| {
                if m.name.is_empty() {
                    return Err(BackendError::InvalidSilence("matcher name cannot be empty".to_string()));
                }
                CompiledMatcher::compile(m).map_err(|e| BackendError::InvalidSilence(e.to_string()))
            })
            .collect()
    }

    /// Evaluates stored alerts against the query, returning them sorted by
    /// fingerprint together with the receiver they route to.
    async fn query_alerts(
        &self,
        query: &AlertQuery,
    ) -> BackendResult<(Vec<GettableAlert>, Arc<Applied>)> {
        let applied = self.applied()?;
        let filter = matchers::parse_filter(&query.filter)?;
        let receiver_re = query
            .receiver
            .as_deref()
            .filter(|r| !r.is_empty())
            .map(|r| Regex::new(&format!("^(?:{})$", r)))
            .transpose()
            .map_err(|e| BackendError::InvalidFilter(format!("invalid receiver regex: {}", e)))?;

        let receiver = applied
            .parsed
            .root_route()
            .map(|r| r.receiver.clone())
            .unwrap_or_default();
        if let Some(re) = &receiver_re {
            if !re.is_match(&receiver) {
                return Ok((Vec::new(), applied));
            }
        }

        let now = Utc::now();
        let silences = self.silences.read().await;
        let alerts = self.alerts.read().await;

        let mut out: Vec<GettableAlert> = alerts
            .iter()
            .filter(|(_, a)| a.ends_at > now)
            .filter(|(_, a)| matchers::matches_all(&filter, &a.labels))
            .filter_map(|(fp, a)| {
                let mut silenced_by: Vec<String> = silences
                    .iter()
                    .filter(|(_, s)| s.state(now) == SilenceState::Active)
                    .filter(|(_, s)| matchers::matches_all(&s.matchers, &a.labels))
                    .map(|(id, _)| id.clone())
                    .collect();
                silenced_by.sort();

                let state = if silenced_by.is_empty() {
                    AlertState::Active
                } else {
                    AlertState::Suppressed
                };
                let keep = match state {
                    AlertState::Active => query.active,
                    _ => query.silenced,
                };
                keep.then(|| GettableAlert {
                    labels: a.labels.clone(),
                    annotations: a.annotations.clone(),
                    starts_at: a.starts_at,
                    ends_at: a.ends_at,
                    updated_at: a.updated_at,
                    fingerprint: fp.clone(),
                    receivers: vec![ReceiverRef {
                        name: receiver.clone(),
                    }],
                    status: AlertStatus {
                        state,
                        silenced_by,
                        inhibited_by: Vec::new(),
                    },
                    generator_url: a.generator_url.clone(),
                })
            })
            .collect();
        out.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        Ok((out, applied))
    }
}

#[async_trait]
impl Backend for InProcessBackend {
    #[instrument(skip_all, fields(org_id = self.org_id, hash = %config.hash))]
    async fn apply_config(&self, config: &AlertConfiguration) -> BackendResult<()> {
        let parsed = GrafanaConfig::parse(&config.raw)?;
        self.apply_parsed(config, parsed);
        Ok(())
    }

    async fn save_and_apply_config(&self, config: &AlertConfiguration) -> BackendResult<()> {
        self.save_and_apply(config).await
    }

    async fn save_and_apply_default_config(&self) -> BackendResult<()> {
        let config = AlertConfiguration::default_for(self.org_id, self.default_config.clone());
        self.save_and_apply(&config).await
    }

    async fn get_status(&self) -> BackendResult<AlertmanagerStatus> {
        let applied = self.applied()?;
        let config = serde_json::to_value(&applied.parsed)
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        Ok(AlertmanagerStatus {
            config,
            uptime: self.started_at,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    async fn create_silence(&self, silence: &PostableSilence) -> BackendResult<String> {
        let matchers = Self::validate_silence(silence)?;
        let id = silence
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut stored = silence.clone();
        stored.id = Some(id.clone());
        let previous = self.silences.write().await.insert(
            id.clone(),
            StoredSilence {
                silence: stored,
                matchers,
                updated_at: Utc::now(),
            },
        );
        debug!(id = %id, updated = previous.is_some(), "Stored silence.");
        Ok(id)
    }

    async fn delete_silence(&self, id: &str) -> BackendResult<()> {
        let now = Utc::now();
        let mut silences = self.silences.write().await;
        let stored = silences
            .get_mut(id)
            .ok_or_else(|| BackendError::SilenceNotFound(id.to_string()))?;
        if stored.state(now) == SilenceState::Expired {
            return Ok(());
        }
        if stored.silence.starts_at > now {
            stored.silence.starts_at = now;
        }
        stored.silence.ends_at = now;
        stored.updated_at = now;
        debug!(id, "Expired silence.");
        Ok(())
    }

    async fn get_silence(&self, id: &str) -> BackendResult<GettableSilence> {
        self.silences
            .read()
            .await
            .get(id)
            .map(|s| s.to_gettable(id, Utc::now()))
            .ok_or_else(|| BackendError::SilenceNotFound(id.to_string()))
    }

    async fn list_silences(&self, filter: &[String]) -> BackendResult<Vec<GettableSilence>> {
        let filter = matchers::parse_filter(filter)?;
        let now = Utc::now();
        let mut out: Vec<GettableSilence> = self
            .silences
            .read()
            .await
            .iter()
            .filter(|(_, s)| matchers::matches_all(&filter, &s.matcher_labels()))
            .map(|(id, s)| s.to_gettable(id, now))
            .collect();

        let rank = |state: SilenceState| match state {
            SilenceState::Active => 0,
            SilenceState::Pending => 1,
            SilenceState::Expired => 2,
        };
        out.sort_by(|a, b| {
            rank(a.status.state)
                .cmp(&rank(b.status.state))
                .then(a.ends_at.cmp(&b.ends_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(out)
    }

    async fn get_alerts(&self, query: &AlertQuery) -> BackendResult<Vec<GettableAlert>> {
        Ok(self.query_alerts(query).await?.0)
    }

    async fn get_alert_groups(&self, query: &AlertQuery) -> BackendResult<Vec<AlertGroup>> {
        let (alerts, applied) = self.query_alerts(query).await?;
        let Some(route) = applied.parsed.root_route() else {
            return Ok(Vec::new());
        };
        let group_all = route.group_by.iter().any(|l| l == "...");

        let mut groups: BTreeMap<Vec<(String, String)>, AlertGroup> = BTreeMap::new();
        for alert in alerts {
            let labels: LabelSet = alert
                .labels
                .iter()
                .filter(|(name, _)| group_all || route.group_by.contains(name))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let key = labels.clone().into_iter().collect();
            groups
                .entry(key)
                .or_insert_with(|| AlertGroup {
                    labels,
                    receiver: ReceiverRef {
                        name: route.receiver.clone(),
                    },
                    alerts: Vec::new(),
                })
                .alerts
                .push(alert);
        }
        Ok(groups.into_values().collect())
    }

    async fn put_alerts(&self, alerts: &[PostableAlert]) -> BackendResult<()> {
        let now = Utc::now();
        let mut validated = Vec::with_capacity(alerts.len());
        for alert in alerts {
            if alert.labels.is_empty() {
                return Err(BackendError::InvalidAlert("at least one label pair required".to_string()));
            }
            if let Some(name) = alert.labels.keys().find(|k| k.is_empty()) {
                return Err(BackendError::InvalidAlert(format!("invalid label name {:?}", name)));
            }
            let starts_at = alert.starts_at.unwrap_or(now);
            let ends_at = alert.ends_at.unwrap_or(starts_at + resolve_timeout());
            if ends_at < starts_at {
                return Err(BackendError::InvalidAlert("start time must be before end time".to_string()));
            }
            validated.push(StoredAlert {
                labels: alert.labels.clone(),
                annotations: alert.annotations.clone(),
                starts_at,
                ends_at,
                updated_at: now,
                generator_url: alert.generator_url.clone(),
            });
        }

        let mut stored = self.alerts.write().await;
        for alert in validated {
            let fp = fingerprint(&alert.labels);
            match stored.get_mut(&fp) {
                // An alert that is still firing keeps its original start.
                Some(existing) if existing.ends_at > now => {
                    let starts_at = existing.starts_at.min(alert.starts_at);
                    *existing = StoredAlert { starts_at, ..alert };
                }
                _ => {
                    stored.insert(fp, alert);
                }
            }
        }
        Ok(())
    }

    async fn get_receivers(&self) -> BackendResult<Vec<Receiver>> {
        let applied = self.applied()?;
        let mut used = BTreeSet::new();
        if let Some(route) = applied.parsed.root_route() {
            route.collect_receivers(&mut used);
        }
        Ok(applied
            .parsed
            .alertmanager_config
            .receivers
            .iter()
            .map(|r| Receiver {
                name: r.name.clone(),
                active: used.contains(r.name.as_str()),
                integrations: r
                    .grafana_managed_receiver_configs
                    .iter()
                    .map(|i| Integration {
                        name: i.name.clone(),
                        kind: i.kind.clone(),
                        uid: i.uid.clone(),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn test_receivers(&self, config: &TestReceiversConfig) -> BackendResult<TestReceiversResult> {
        if config.receivers.is_empty() {
            return Err(BackendError::InvalidConfig("no receivers to test".to_string()));
        }
        let alert = config.alert.clone().unwrap_or_else(default_test_alert);

        let receivers = config
            .receivers
            .iter()
            .map(|receiver| TestReceiverResult {
                name: receiver.name.clone(),
                configs: receiver
                    .integrations
                    .iter()
                    .map(|i| {
                        let known = KNOWN_INTEGRATIONS.contains(&i.kind.as_str());
                        TestIntegrationResult {
                            name: i.name.clone(),
                            uid: i.uid.clone(),
                            status: if known { "ok" } else { "failed" }.to_string(),
                            error: (!known)
                                .then(|| format!("unknown integration type \"{}\"", i.kind)),
                        }
                    })
                    .collect(),
            })
            .collect();

        Ok(TestReceiversResult {
            alert,
            receivers,
            notified_at: Utc::now(),
        })
    }

    async fn test_template(&self, config: &TestTemplatesConfig) -> BackendResult<TestTemplatesResults> {
        if config.template.trim().is_empty() {
            return Err(BackendError::InvalidConfig("template cannot be empty".to_string()));
        }
        render_templates(config)
    }

    async fn clean_up(&self) {
        let now = Utc::now();
        let retention = self.silence_retention;

        let mut silences = self.silences.write().await;
        let before = silences.len();
        silences.retain(|_, s| s.silence.ends_at + retention > now);
        let silences_removed = before - silences.len();
        drop(silences);

        let mut alerts = self.alerts.write().await;
        let before = alerts.len();
        alerts.retain(|_, a| a.ends_at > now);
        let alerts_removed = before - alerts.len();

        if silences_removed > 0 || alerts_removed > 0 {
            debug!(silences_removed, alerts_removed, "Garbage collected in-process state.");
        }
    }

    async fn stop_and_wait(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            info!(org_id = self.org_id, "In-process Alertmanager stopped.");
        }
    }

    fn ready(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst) && self.applied.load().is_some()
    }
}

fn default_test_alert() -> PostableAlert {
    let labels = [("alertname", "TestAlert"), ("instance", "Grafana")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let annotations = [("summary", "Notification test")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    PostableAlert {
        labels,
        annotations,
        starts_at: Some(Utc::now()),
        ..Default::default()
    }
}

// =============================================================================
// Template preview
// =============================================================================

/// Renders every `{{ define "name" }}` block in the template, or the whole
/// template under `config.name` when it defines none.
///
/// Supported actions are `.Status`, `len .Alerts`, and
/// `.CommonLabels.<name>`, `.GroupLabels.<name>`,
/// `.CommonAnnotations.<name>`. Anything else is reported as an error.
fn render_templates(config: &TestTemplatesConfig) -> BackendResult<TestTemplatesResults> {
    let mut results = TestTemplatesResults::default();

    let opens = config.template.matches("{{").count();
    let closes = config.template.matches("}}").count();
    if opens != closes {
        results.errors.push(TestTemplateError {
            name: config.name.clone(),
            kind: "invalid_template".to_string(),
            message: "unbalanced action delimiters".to_string(),
        });
        return Ok(results);
    }

    let define_re = template_regex(r#"(?s)\{\{-?\s*define\s+"([^"]+)"\s*-?\}\}(.*?)\{\{-?\s*end\s*-?\}\}"#)?;
    let definitions: Vec<(String, String)> = define_re
        .captures_iter(&config.template)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();
    let definitions = if definitions.is_empty() {
        vec![(config.name.clone(), config.template.clone())]
    } else {
        definitions
    };

    let context = TemplateContext::new(&config.alerts)?;
    for (name, body) in definitions {
        match context.render(&body) {
            Ok(text) => results.results.push(TestTemplateResult { name, text }),
            Err(message) => results.errors.push(TestTemplateError {
                name,
                kind: "execution_error".to_string(),
                message,
            }),
        }
    }
    Ok(results)
}

fn template_regex(pattern: &str) -> BackendResult<Regex> {
    Regex::new(pattern).map_err(|e| BackendError::InvalidConfig(e.to_string()))
}

struct TemplateContext {
    action_re: Regex,
    status: &'static str,
    alert_count: usize,
    common_labels: LabelSet,
    common_annotations: LabelSet,
}

impl TemplateContext {
    fn new(alerts: &[PostableAlert]) -> BackendResult<Self> {
        let now = Utc::now();
        let firing = alerts
            .iter()
            .any(|a| a.ends_at.map_or(true, |end| end > now));
        Ok(Self {
            action_re: template_regex(r"\{\{-?\s*(.*?)\s*-?\}\}")?,
            status: if firing || alerts.is_empty() { "firing" } else { "resolved" },
            alert_count: alerts.len(),
            common_labels: common(alerts.iter().map(|a| &a.labels)),
            common_annotations: common(alerts.iter().map(|a| &a.annotations)),
        })
    }

    fn render(&self, body: &str) -> Result<String, String> {
        let mut out = String::with_capacity(body.len());
        let mut last = 0;
        for caps in self.action_re.captures_iter(body) {
            let whole = caps.get(0).ok_or("malformed action")?;
            out.push_str(&body[last..whole.start()]);
            out.push_str(&self.eval(caps[1].trim())?);
            last = whole.end();
        }
        out.push_str(&body[last..]);
        Ok(out.trim().to_string())
    }

    fn eval(&self, expr: &str) -> Result<String, String> {
        if expr == ".Status" {
            return Ok(self.status.to_string());
        }
        if expr == "len .Alerts" {
            return Ok(self.alert_count.to_string());
        }
        let lookup = |prefix: &str, set: &LabelSet| {
            expr.strip_prefix(prefix)
                .map(|name| set.get(name).cloned().unwrap_or_default())
        };
        lookup(".CommonLabels.", &self.common_labels)
            .or_else(|| lookup(".GroupLabels.", &self.common_labels))
            .or_else(|| lookup(".CommonAnnotations.", &self.common_annotations))
            .ok_or_else(|| format!("unsupported template action \"{}\"", expr))
    }
}

/// Pairs present with the same value in every set.
fn common<'a>(mut sets: impl Iterator<Item = &'a LabelSet>) -> LabelSet {
    let Some(first) = sets.next() else {
        return LabelSet::new();
    };
    let mut common = first.clone();
    for set in sets {
        common.retain(|k, v| set.get(k) == Some(v));
    }
    common
}
