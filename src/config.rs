//! Tracker configuration
//!
//! Defaults match the production tracker: a 30 second heartbeat and a one
//! second minimum page-view duration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TrackerError;

/// Default heartbeat interval in seconds
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default minimum page-view duration in seconds
pub const DEFAULT_MIN_PAGE_VIEW_SECS: u64 = 1;

/// Default upper bound for a single store call in seconds
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;

/// Tracker settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Seconds between periodic heartbeats
    pub heartbeat_interval_secs: u64,
    /// Views shorter than this are discarded (never below 1)
    pub min_page_view_secs: u64,
    /// Each store call is abandoned after this many seconds
    pub store_timeout_secs: u64,
    /// Open a page-view for the host's current path when a session starts
    pub track_initial_page: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            min_page_view_secs: DEFAULT_MIN_PAGE_VIEW_SECS,
            store_timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
            track_initial_page: true,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, TrackerError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, TrackerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_secs = interval.as_secs();
        self
    }

    pub fn with_min_page_view_secs(mut self, secs: u64) -> Self {
        self.min_page_view_secs = secs;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_initial_page(mut self, track: bool) -> Self {
        self.track_initial_page = track;
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    /// Effective minimum duration; a zero setting still drops sub-second views
    pub fn min_page_view_secs(&self) -> u64 {
        self.min_page_view_secs.max(1)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.heartbeat_interval_secs == 0 {
            return Err(TrackerError::InvalidConfig(
                "heartbeat_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.store_timeout_secs == 0 {
            return Err(TrackerError::InvalidConfig(
                "store_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
