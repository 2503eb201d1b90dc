//! Error types for Synheart Pulse
//!
//! Tracking calls never return errors to the host. These types only surface
//! from construction, configuration, replay parsing, and from the store
//! collaborator (where the tracker logs and drops them).

use std::time::Duration;

use thiserror::Error;

/// Errors raised while building or driving a tracker
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("No tokio runtime available; construct the tracker inside a runtime")]
    NoRuntime,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid replay script: {0}")]
    Validation(#[from] crate::replay::ValidationError),
}

/// Errors returned by a [`SessionStore`](crate::store::SessionStore)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store rejected the write: {0}")]
    Rejected(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
