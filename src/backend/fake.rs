//! A scriptable [`Backend`] that records every call, for tests.

use crate::core::{
    AlertConfiguration, AlertGroup, AlertQuery, AlertmanagerStatus, Backend, BackendResult,
    GettableAlert, GettableSilence, PostableAlert, PostableSilence, Receiver, SilenceState,
    SilenceStatus, TestReceiversConfig, TestReceiversResult, TestTemplatesConfig,
    TestTemplatesResults,
};
use crate::errors::BackendError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Records calls as `"operation"` or `"operation:argument"` strings.
///
/// Operations listed with [`FakeBackend::fail`] return an
/// `UnexpectedStatus { status: 500 }` error.
#[derive(Debug)]
pub struct FakeBackend {
    name: &'static str,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
    ready: AtomicBool,
    apply_delay: Mutex<Option<Duration>>,
    next_silence: AtomicUsize,
    silences: Mutex<Vec<PostableSilence>>,
}

impl FakeBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            ready: AtomicBool::new(true),
            apply_delay: Mutex::new(None),
            next_silence: AtomicUsize::new(0),
            silences: Mutex::new(Vec::new()),
        }
    }

    /// Makes `operation` fail from now on.
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Delays every `apply_config` by `delay`.
    pub fn delay_apply(&self, delay: Duration) {
        *self.apply_delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose operation name is `operation`.
    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split(':').next() == Some(operation))
            .collect()
    }

    /// Silences received by `create_silence`, in order.
    pub fn created_silences(&self) -> Vec<PostableSilence> {
        self.silences.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str, argument: Option<&str>) -> BackendResult<()> {
        let call = match argument {
            Some(arg) => format!("{}:{}", operation, arg),
            None => operation.to_string(),
        };
        self.calls.lock().unwrap().push(call);
        if self.failing.lock().unwrap().contains(operation) {
            return Err(BackendError::UnexpectedStatus {
                status: 500,
                body: format!("{} failure from {}", operation, self.name),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn apply_config(&self, config: &AlertConfiguration) -> BackendResult<()> {
        let delay = *self.apply_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.record("apply_config", Some(&config.hash))
    }

    async fn save_and_apply_config(&self, config: &AlertConfiguration) -> BackendResult<()> {
        self.record("save_and_apply_config", Some(&config.hash))
    }

    async fn save_and_apply_default_config(&self) -> BackendResult<()> {
        self.record("save_and_apply_default_config", None)
    }

    async fn get_status(&self) -> BackendResult<AlertmanagerStatus> {
        self.record("get_status", None)?;
        Ok(AlertmanagerStatus {
            config: serde_json::json!({ "backend": self.name }),
            uptime: Utc::now(),
            version: self.name.to_string(),
        })
    }

    async fn create_silence(&self, silence: &PostableSilence) -> BackendResult<String> {
        self.record("create_silence", silence.id.as_deref())?;
        self.silences.lock().unwrap().push(silence.clone());
        Ok(match &silence.id {
            Some(id) => id.clone(),
            None => format!(
                "{}-silence-{}",
                self.name,
                self.next_silence.fetch_add(1, Ordering::SeqCst)
            ),
        })
    }

    async fn delete_silence(&self, id: &str) -> BackendResult<()> {
        self.record("delete_silence", Some(id))
    }

    async fn get_silence(&self, id: &str) -> BackendResult<GettableSilence> {
        self.record("get_silence", Some(id))?;
        let now = Utc::now();
        Ok(GettableSilence {
            id: id.to_string(),
            matchers: Vec::new(),
            starts_at: now,
            ends_at: now + chrono::Duration::hours(1),
            updated_at: now,
            created_by: self.name.to_string(),
            comment: String::new(),
            status: SilenceStatus {
                state: SilenceState::Active,
            },
        })
    }

    async fn list_silences(&self, _filter: &[String]) -> BackendResult<Vec<GettableSilence>> {
        self.record("list_silences", None)?;
        Ok(Vec::new())
    }

    async fn get_alerts(&self, _query: &AlertQuery) -> BackendResult<Vec<GettableAlert>> {
        self.record("get_alerts", None)?;
        Ok(Vec::new())
    }

    async fn get_alert_groups(&self, _query: &AlertQuery) -> BackendResult<Vec<AlertGroup>> {
        self.record("get_alert_groups", None)?;
        Ok(Vec::new())
    }

    async fn put_alerts(&self, alerts: &[PostableAlert]) -> BackendResult<()> {
        self.record("put_alerts", Some(&alerts.len().to_string()))
    }

    async fn get_receivers(&self) -> BackendResult<Vec<Receiver>> {
        self.record("get_receivers", None)?;
        Ok(Vec::new())
    }

    async fn test_receivers(&self, config: &TestReceiversConfig) -> BackendResult<TestReceiversResult> {
        self.record("test_receivers", None)?;
        Ok(TestReceiversResult {
            alert: config.alert.clone().unwrap_or_default(),
            receivers: Vec::new(),
            notified_at: Utc::now(),
        })
    }

    async fn test_template(&self, _config: &TestTemplatesConfig) -> BackendResult<TestTemplatesResults> {
        self.record("test_template", None)?;
        Ok(TestTemplatesResults::default())
    }

    async fn clean_up(&self) {
        let _ = self.record("clean_up", None);
    }

    async fn stop_and_wait(&self) {
        let _ = self.record("stop_and_wait", None);
    }

    fn ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}
