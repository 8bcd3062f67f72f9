//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged over
//! the configuration from the `alertbridge.toml` file and environment variables.

use crate::forked::Mode;
use clap::Parser;
use figment::{
    value::{Dict, Map, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Forks Alertmanager traffic between an in-process and a remote backend.
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Which backend is authoritative.
    #[arg(long, value_enum)]
    pub mode: Option<Mode>,

    /// Base URL of the remote Alertmanager.
    #[arg(long, value_name = "URL")]
    pub remote_url: Option<String>,

    /// Log level filter, e.g. `info` or `alertbridge=debug`.
    #[arg(long, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Capacity of the notification queue.
    #[arg(long, value_name = "N")]
    pub queue_capacity: Option<usize>,
}

impl Provider for Cli {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(level) = &self.log_level {
            dict.insert("log_level".into(), Value::from(level.clone()));
        }

        let mut forking = Dict::new();
        if let Some(mode) = self.mode {
            forking.insert("mode".into(), Value::from(mode.as_str()));
        }
        if !forking.is_empty() {
            dict.insert("forking".into(), Value::from(forking));
        }

        let mut remote = Dict::new();
        if let Some(url) = &self.remote_url {
            remote.insert("url".into(), Value::from(url.clone()));
        }
        if !remote.is_empty() {
            dict.insert("remote".into(), Value::from(remote));
        }

        let mut sender = Dict::new();
        if let Some(capacity) = self.queue_capacity {
            sender.insert("queue_capacity".into(), Value::from(capacity));
        }
        if !sender.is_empty() {
            dict.insert("sender".into(), Value::from(sender));
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
