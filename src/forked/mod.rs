//! # Forked Notifier
//!
//! Presents one [`Backend`] over an in-process and a remote Alertmanager.
//! The [`Mode`] decides which of the two is authoritative; it is chosen once
//! at construction and selects one of two concrete notifier types:
//!
//! - **`Mode::Secondary`** ([`SecondaryForkedNotifier`]): the in-process
//!   backend serves everything. The remote copy is refreshed by interval-gated
//!   configuration pushes and a final hand-off on shutdown.
//! - **`Mode::Primary`** ([`PrimaryForkedNotifier`]): the remote backend
//!   serves reads and alerts. Configuration and silence writes are shadowed
//!   to the in-process backend so it stays warm for a rollback.
//!
//! Errors from the non-authoritative side are logged and counted, never
//! returned.

mod primary;
mod secondary;

pub use primary::PrimaryForkedNotifier;
pub use secondary::SecondaryForkedNotifier;

use crate::core::{Backend, ConfigStore, OrgId};
use crate::errors::BackendError;
use crate::internal_metrics::ForkedMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Which backend is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// The remote Alertmanager is authoritative.
    Primary,
    /// The in-process Alertmanager is authoritative.
    Secondary,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Primary => "primary",
            Mode::Secondary => "secondary",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings shared by both notifier types.
#[derive(Debug, Clone)]
pub struct ForkedOptions {
    pub org_id: OrgId,
    /// Minimum time between background pushes in secondary mode.
    pub sync_interval: Duration,
}

/// Builds the notifier for `mode`.
pub fn new_forked_notifier(
    mode: Mode,
    internal: Arc<dyn Backend>,
    remote: Arc<dyn Backend>,
    store: Arc<dyn ConfigStore>,
    options: ForkedOptions,
) -> Arc<dyn Backend> {
    match mode {
        Mode::Primary => Arc::new(PrimaryForkedNotifier::new(internal, remote, options)),
        Mode::Secondary => Arc::new(SecondaryForkedNotifier::new(internal, remote, store, options)),
    }
}

/// Logs and counts a failure on the non-authoritative backend.
fn shadow_error(metrics: &ForkedMetrics, operation: &'static str, err: &BackendError) {
    metrics.increment_shadow_error(operation);
    warn!(operation, error = %err, "Non-authoritative backend failed, continuing.");
}
