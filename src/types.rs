//! Session data types
//!
//! This module defines the records that flow from the tracker to the
//! session store: session creation, cumulative session updates, page-view
//! summaries and ad hoc events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Arbitrary event properties
pub type Properties = serde_json::Map<String, serde_json::Value>;

/// Environment facts captured once when a session starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    /// Host agent string (browser user agent, app build string, ...)
    pub user_agent: String,
    /// Host platform (e.g. "ios", "android", "macos")
    pub platform: String,
    /// Screen width in pixels
    pub screen_width: u32,
    /// Screen height in pixels
    pub screen_height: u32,
}

impl Default for ClientMetadata {
    fn default() -> Self {
        Self {
            user_agent: "unknown".to_string(),
            platform: "unknown".to_string(),
            screen_width: 0,
            screen_height: 0,
        }
    }
}

/// The page-view currently open in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    /// Page identifier or path
    pub page: String,
    /// When the page was entered
    pub entered_at: DateTime<Utc>,
    /// Maximum scroll depth reached so far (0-100)
    pub scroll_depth_percent: u8,
}

impl PageView {
    pub fn open(page: impl Into<String>, entered_at: DateTime<Utc>) -> Self {
        Self {
            page: page.into(),
            entered_at,
            scroll_depth_percent: 0,
        }
    }

    /// Whole seconds spent on the page at `now`, rounded to nearest.
    ///
    /// Negative when the clock moved backwards.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> i64 {
        let millis = (now - self.entered_at).num_milliseconds();
        (millis as f64 / 1000.0).round() as i64
    }

    /// Summarize this view as of `now`.
    ///
    /// Returns `None` when the view is shorter than `min_secs`.
    pub fn summarize(&self, now: DateTime<Utc>, min_secs: u64) -> Option<PageViewRecord> {
        let elapsed = self.elapsed_seconds(now);
        if elapsed < 0 || (elapsed as u64) < min_secs.max(1) {
            return None;
        }
        Some(PageViewRecord {
            page: self.page.clone(),
            duration_seconds: elapsed as u64,
            scroll_depth_percent: self.scroll_depth_percent,
        })
    }
}

/// A persisted page-view summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageViewRecord {
    /// Page identifier or path
    pub page: String,
    /// Time on page in seconds
    pub duration_seconds: u64,
    /// Maximum scroll depth reached (0-100)
    pub scroll_depth_percent: u8,
}

/// Payload for creating a session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewSession {
    pub session_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub client_metadata: ClientMetadata,
}

/// Cumulative upsert for a session record, keyed by `(session_id, user_id)`.
///
/// `page_views` always carries the full history to date, never a delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub session_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_views: Option<Vec<PageViewRecord>>,
}

impl SessionUpdate {
    /// Whether this update closes the session
    pub fn is_final(&self) -> bool {
        self.ended_at.is_some()
    }
}

/// A named occurrence reported outside page-view aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub user_id: String,
    pub session_id: String,
    pub event_name: String,
    #[serde(default)]
    pub properties: Properties,
    pub timestamp: DateTime<Utc>,
}

/// Point-in-time view of the active session, for host diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub client_metadata: ClientMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<String>,
    /// Finalized views plus the live view when it meets the duration threshold
    pub page_views: Vec<PageViewRecord>,
}
