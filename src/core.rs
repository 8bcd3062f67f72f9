//! Core domain types and service traits for alertbridge
//!
//! This module defines the alerting data model shared by both backends and
//! the trait contracts (`Backend`, `ConfigStore`) that every component is
//! wired through.

use crate::errors::{BackendError, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of the organization (tenant) a backend serves.
pub type OrgId = i64;

/// A set of label or annotation pairs keyed by name.
pub type LabelSet = BTreeMap<String, String>;

pub type BackendResult<T> = Result<T, BackendError>;

/// A single name/value pair in an ordered label list.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    pub name: String,
    pub value: String,
}

impl Label {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// A persisted Alertmanager configuration document.
///
/// The document itself is opaque to the orchestration layer; only the
/// in-process backend parses it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertConfiguration {
    pub org_id: OrgId,
    /// The raw JSON configuration document.
    pub raw: String,
    /// Hex MD5 of `raw`.
    pub hash: String,
    pub created_at: DateTime<Utc>,
    /// Whether this is the built-in default configuration.
    pub is_default: bool,
}

impl AlertConfiguration {
    pub fn new(org_id: OrgId, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            org_id,
            hash: format!("{:x}", md5::compute(raw.as_bytes())),
            raw,
            created_at: Utc::now(),
            is_default: false,
        }
    }

    pub fn default_for(org_id: OrgId, raw: impl Into<String>) -> Self {
        Self {
            is_default: true,
            ..Self::new(org_id, raw)
        }
    }
}

// =============================================================================
// Alerts
// =============================================================================

/// An alert as submitted by a producer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct PostableAlert {
    #[serde(default)]
    pub labels: LabelSet,
    #[serde(default)]
    pub annotations: LabelSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Unprocessed,
    Active,
    Suppressed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AlertStatus {
    pub state: AlertState,
    #[serde(default)]
    pub silenced_by: Vec<String>,
    #[serde(default)]
    pub inhibited_by: Vec<String>,
}

/// An alert as reported back by a backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GettableAlert {
    pub labels: LabelSet,
    #[serde(default)]
    pub annotations: LabelSet,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub fingerprint: String,
    #[serde(default)]
    pub receivers: Vec<ReceiverRef>,
    pub status: AlertStatus,
    #[serde(default, rename = "generatorURL")]
    pub generator_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiverRef {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertGroup {
    pub labels: LabelSet,
    pub receiver: ReceiverRef,
    pub alerts: Vec<GettableAlert>,
}

/// Query parameters for `get_alerts` and `get_alert_groups`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertQuery {
    pub active: bool,
    pub silenced: bool,
    pub inhibited: bool,
    /// Matcher expressions such as `severity="critical"`.
    pub filter: Vec<String>,
    /// Regex on the receiver name; `None` matches every receiver.
    pub receiver: Option<String>,
}

impl Default for AlertQuery {
    fn default() -> Self {
        Self {
            active: true,
            silenced: true,
            inhibited: true,
            filter: Vec::new(),
            receiver: None,
        }
    }
}

// =============================================================================
// Silences
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Matcher {
    pub name: String,
    pub value: String,
    pub is_regex: bool,
    #[serde(default = "default_true")]
    pub is_equal: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PostableSilence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub matchers: Vec<Matcher>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub comment: String,
}

/// Lifecycle state of a silence, derived from its time bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SilenceState {
    Pending,
    Active,
    Expired,
}

impl SilenceState {
    pub fn at(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if ends_at <= now {
            SilenceState::Expired
        } else if starts_at > now {
            SilenceState::Pending
        } else {
            SilenceState::Active
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SilenceStatus {
    pub state: SilenceState,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GettableSilence {
    pub id: String,
    pub matchers: Vec<Matcher>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: String,
    #[serde(default)]
    pub comment: String,
    pub status: SilenceStatus,
}

// =============================================================================
// Receivers, status and test payloads
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Integration {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Receiver {
    pub name: String,
    pub active: bool,
    pub integrations: Vec<Integration>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertmanagerStatus {
    /// The configuration currently in effect, as JSON.
    pub config: serde_json::Value,
    pub uptime: DateTime<Utc>,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TestReceiversConfig {
    #[serde(default)]
    pub alert: Option<PostableAlert>,
    pub receivers: Vec<Receiver>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestIntegrationResult {
    pub name: String,
    pub uid: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestReceiverResult {
    pub name: String,
    pub configs: Vec<TestIntegrationResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TestReceiversResult {
    pub alert: PostableAlert,
    pub receivers: Vec<TestReceiverResult>,
    pub notified_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TestTemplatesConfig {
    #[serde(default)]
    pub alerts: Vec<PostableAlert>,
    pub template: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestTemplateResult {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestTemplateError {
    pub name: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TestTemplatesResults {
    pub results: Vec<TestTemplateResult>,
    pub errors: Vec<TestTemplateError>,
}

// =============================================================================
// Service Traits
// =============================================================================

/// The alerting capability both providers implement.
///
/// Every operation is a future; callers cancel an operation by dropping it,
/// and network-backed implementations bound each call with a timeout so no
/// method blocks indefinitely.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Applies a configuration loaded from the store.
    async fn apply_config(&self, config: &AlertConfiguration) -> BackendResult<()>;

    /// Persists a user-supplied configuration and applies it.
    async fn save_and_apply_config(&self, config: &AlertConfiguration) -> BackendResult<()>;

    /// Resets to the built-in default configuration.
    async fn save_and_apply_default_config(&self) -> BackendResult<()>;

    async fn get_status(&self) -> BackendResult<AlertmanagerStatus>;

    /// Creates (or, when `silence.id` is set, replaces) a silence and
    /// returns its id.
    async fn create_silence(&self, silence: &PostableSilence) -> BackendResult<String>;

    async fn delete_silence(&self, id: &str) -> BackendResult<()>;

    async fn get_silence(&self, id: &str) -> BackendResult<GettableSilence>;

    async fn list_silences(&self, filter: &[String]) -> BackendResult<Vec<GettableSilence>>;

    async fn get_alerts(&self, query: &AlertQuery) -> BackendResult<Vec<GettableAlert>>;

    async fn get_alert_groups(&self, query: &AlertQuery) -> BackendResult<Vec<AlertGroup>>;

    async fn put_alerts(&self, alerts: &[PostableAlert]) -> BackendResult<()>;

    async fn get_receivers(&self) -> BackendResult<Vec<Receiver>>;

    async fn test_receivers(&self, config: &TestReceiversConfig)
        -> BackendResult<TestReceiversResult>;

    async fn test_template(&self, config: &TestTemplatesConfig)
        -> BackendResult<TestTemplatesResults>;

    /// Releases state the backend no longer needs.
    async fn clean_up(&self);

    /// Stops background work and waits for it to finish.
    async fn stop_and_wait(&self);

    /// Reports readiness. Never fails; an unreachable backend is simply not ready.
    fn ready(&self) -> bool;
}

/// Persistence for Alertmanager configuration documents.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Returns the most recently saved configuration for `org_id`.
    async fn get_latest_config(&self, org_id: OrgId) -> Result<AlertConfiguration, StoreError>;

    async fn save_config(&self, config: AlertConfiguration) -> Result<(), StoreError>;
}
