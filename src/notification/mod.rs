//! Delivery of alerts to the remote Alertmanager.
//!
//! `sender` owns the bounded queue and the dispatch loop; `client` is the
//! transport the loop posts batches through.

pub mod client;
pub mod sender;

use crate::core::Label;
use chrono::{DateTime, Utc};
use serde::ser::Serializer;
use serde::Serialize;

/// An alert queued for delivery, with sanitized and relabeled labels.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(serialize_with = "serialize_labels")]
    pub labels: Vec<Label>,
    #[serde(serialize_with = "serialize_labels")]
    pub annotations: Vec<Label>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(rename = "generatorURL", skip_serializing_if = "String::is_empty")]
    pub generator_url: String,
}

impl Alert {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }
}

/// Serializes an ordered label list as a JSON object.
fn serialize_labels<S: Serializer>(labels: &[Label], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_map(labels.iter().map(|l| (&l.name, &l.value)))
}
