//! alertbridge - forks Alertmanager traffic between an in-process
//! Alertmanager and a remote one.
//!
//! This library provides the backends, the forking layer that decides which
//! one is authoritative, and the notification sender that delivers alerts to
//! the remote Alertmanager.

pub mod api;
pub mod app;
pub mod backend;
pub mod cli;
pub mod config;
pub mod core;
pub mod errors;
pub mod forked;
pub mod internal_metrics;
pub mod matchers;
pub mod notification;
pub mod relabel;
pub mod sanitize;
pub mod store;
pub mod task_manager;

// Re-export core types for convenience
pub use core::*;
