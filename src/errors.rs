//! Error types shared by the backends, the configuration store and the
//! label sanitizer.

use crate::core::OrgId;
use thiserror::Error;

/// Errors returned by a [`Backend`](crate::core::Backend) operation.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("silence not found: {0}")]
    SilenceNotFound(String),

    #[error("invalid silence: {0}")]
    InvalidSilence(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid alert: {0}")]
    InvalidAlert(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Alertmanager is not ready")]
    NotReady,

    #[error("request to remote Alertmanager failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("remote Alertmanager responded with status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors returned by a [`ConfigStore`](crate::core::ConfigStore).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    #[error("no configuration found for org {0}")]
    NotFound(OrgId),

    #[error("configuration store unavailable: {0}")]
    Unavailable(String),
}

/// Errors produced while sanitizing a single label name.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SanitizeError {
    #[error("label name cannot be empty")]
    Empty,

    #[error("label name '{0}' is empty after removing invalid characters")]
    EmptyAfterSanitization(String),
}
