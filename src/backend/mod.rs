//! The two interchangeable [`Backend`](crate::core::Backend) providers.
//!
//! - **`InProcessBackend`**: keeps silences and alerts in memory and
//!   derives receivers and grouping from the parsed configuration.
//! - **`RemoteBackend`**: talks to a remote Alertmanager over HTTP and
//!   delivers alerts through a `NotificationSender`.

#[cfg(any(test, feature = "test-utils"))]
pub mod fake;
pub mod inprocess;
pub mod remote;

pub use inprocess::InProcessBackend;
pub use remote::{RemoteBackend, RemoteBackendConfig};

use crate::core::LabelSet;

/// The configuration applied when an organization has none of its own.
pub const DEFAULT_CONFIG: &str = r#"{
  "alertmanager_config": {
    "route": {
      "receiver": "grafana-default-email",
      "group_by": ["grafana_folder", "alertname"]
    },
    "receivers": [
      {
        "name": "grafana-default-email",
        "grafana_managed_receiver_configs": [
          {
            "uid": "",
            "name": "email receiver",
            "type": "email",
            "settings": { "addresses": "<example@email.com>" }
          }
        ]
      }
    ]
  }
}"#;

/// Loads the default configuration document, falling back to
/// [`DEFAULT_CONFIG`] when no path is configured.
pub fn load_default_config(path: Option<&std::path::Path>) -> anyhow::Result<String> {
    use anyhow::Context;
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read default configuration {}", path.display())),
        None => Ok(DEFAULT_CONFIG.to_string()),
    }
}

/// A stable identifier for a label set: hex MD5 over the sorted pairs.
pub fn fingerprint(labels: &LabelSet) -> String {
    let mut ctx = md5::Context::new();
    for (name, value) in labels {
        ctx.consume(name.as_bytes());
        ctx.consume(b"\xff");
        ctx.consume(value.as_bytes());
        ctx.consume(b"\xff");
    }
    let digest = format!("{:x}", ctx.compute());
    digest[..16].to_string()
}
