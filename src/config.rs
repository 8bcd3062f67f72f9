//! Configuration management for alertbridge
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, an `alertbridge.toml` file, `ALERTBRIDGE_`
//! environment variables and command-line flags.

use crate::cli::Cli;
use crate::core::{LabelSet, OrgId};
use crate::forked::Mode;
use crate::relabel::RelabelConfig;
use anyhow::{bail, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// The organization (tenant) this instance serves.
    pub org_id: OrgId,
    pub forking: ForkingConfig,
    pub remote: RemoteConfig,
    pub sender: SenderConfig,
    pub internal: InternalConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

/// Which backend is authoritative and how often the replica is synced.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ForkingConfig {
    pub mode: Mode,
    /// Minimum time between background configuration pushes to the remote
    /// Alertmanager in secondary mode.
    pub sync_interval_seconds: u64,
}

/// Connection settings for the remote Alertmanager.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RemoteConfig {
    pub url: String,
    /// Sent as `X-Scope-OrgID` and used as the basic-auth user.
    pub tenant_id: String,
    /// Enables basic auth when non-empty.
    #[serde(default)]
    pub basic_auth_password: String,
    /// Upper bound for any single request.
    pub timeout_seconds: u64,
    /// Marks pushed configurations as promoted.
    #[serde(default)]
    pub promote_config: bool,
    #[serde(default)]
    pub external_url: String,
}

/// Settings for the notification sender's queue and delivery.
#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct SenderConfig {
    pub queue_capacity: usize,
    pub max_batch_size: usize,
    pub send_timeout_seconds: u64,
    /// Labels added to every alert that does not already define them.
    pub external_labels: LabelSet,
    pub relabel_configs: Vec<RelabelConfig>,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            max_batch_size: 64,
            send_timeout_seconds: 10,
            external_labels: LabelSet::new(),
            relabel_configs: Vec::new(),
        }
    }
}

/// Settings for the in-process Alertmanager.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct InternalConfig {
    /// A JSON document used as the default configuration. The built-in
    /// default is used when unset.
    #[serde(default)]
    pub default_config_path: Option<PathBuf>,
    /// How long expired silences are kept before garbage collection.
    pub silence_retention_hours: u64,
    /// How often the stored configuration is re-applied.
    pub config_poll_interval_seconds: u64,
    /// How often expired silences and resolved alerts are collected.
    pub maintenance_interval_seconds: u64,
}

/// Configuration for the operator HTTP API.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
}

/// Configuration for the Prometheus exporter.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_address: SocketAddr,
    pub system_metrics_enabled: bool,
}

impl Config {
    /// Loads the application configuration from the specified file.
    ///
    /// # Arguments
    /// * `config_path` - The path to the TOML configuration file.
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        Self::figment(config_path).extract::<Config>()?.validated()
    }

    /// Loads the configuration with command-line flags layered on top.
    pub fn load_with_cli(cli: &Cli) -> Result<Self> {
        let path = cli
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("alertbridge.toml"));
        Self::figment(path)
            .merge(cli)
            .extract::<Config>()?
            .validated()
    }

    fn figment(config_path: impl AsRef<Path>) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path.as_ref()))
            // e.g. ALERTBRIDGE_SENDER__QUEUE_CAPACITY=500
            .merge(Env::prefixed("ALERTBRIDGE_").split("__"))
    }

    fn validated(self) -> Result<Self> {
        if self.sender.queue_capacity == 0 {
            bail!("sender.queue_capacity must be greater than zero");
        }
        if self.sender.max_batch_size == 0 {
            bail!("sender.max_batch_size must be greater than zero");
        }
        if self.remote.timeout_seconds == 0 {
            bail!("remote.timeout_seconds must be greater than zero");
        }
        if self.internal.config_poll_interval_seconds == 0
            || self.internal.maintenance_interval_seconds == 0
        {
            bail!("internal intervals must be greater than zero");
        }
        Ok(self)
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            org_id: 1,
            forking: ForkingConfig {
                mode: Mode::Secondary,
                sync_interval_seconds: 300,
            },
            remote: RemoteConfig {
                url: "http://localhost:9009".to_string(),
                tenant_id: "1".to_string(),
                basic_auth_password: String::new(),
                timeout_seconds: 30,
                promote_config: false,
                external_url: String::new(),
            },
            sender: SenderConfig::default(),
            internal: InternalConfig {
                default_config_path: None,
                silence_retention_hours: 120,
                config_poll_interval_seconds: 60,
                maintenance_interval_seconds: 900,
            },
            api: ApiConfig {
                enabled: true,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 9094)),
            },
            metrics: MetricsConfig {
                enabled: true,
                listen_address: SocketAddr::from(([127, 0, 0, 1], 9095)),
                system_metrics_enabled: true,
            },
        }
    }
}
