//! pulse.host_signal.v1 replay scripts
//!
//! A replay script is a time-ordered list of host signals (session starts,
//! navigations, scroll ticks, lifecycle signals, events). [`Replayer`] drives
//! a tracker through the script on a virtual clock, firing interval
//! heartbeats at the virtual times the timer would have fired.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::ManualClock;
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::host::{HostBus, HostSignal, ScrollPosition, Visibility};
use crate::store::SessionStore;
use crate::tracker::Tracker;
use crate::types::{ClientMetadata, Properties};

/// Current replay schema version
pub const REPLAY_SCHEMA_VERSION: &str = "pulse.host_signal.v1";

/// One host action in a replay script
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplaySignal {
    StartSession {
        user_id: String,
        /// Environment facts reported for this session
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_metadata: Option<ClientMetadata>,
    },
    PageView {
        path: String,
    },
    Scroll {
        scroll_top: f64,
        scroll_height: f64,
        viewport_height: f64,
    },
    Visibility {
        state: Visibility,
    },
    Unload,
    Event {
        name: String,
        #[serde(default, skip_serializing_if = "Properties::is_empty")]
        properties: Properties,
    },
    Heartbeat,
    EndSession,
}

impl ReplaySignal {
    pub fn type_name(&self) -> &'static str {
        match self {
            ReplaySignal::StartSession { .. } => "start_session",
            ReplaySignal::PageView { .. } => "page_view",
            ReplaySignal::Scroll { .. } => "scroll",
            ReplaySignal::Visibility { .. } => "visibility",
            ReplaySignal::Unload => "unload",
            ReplaySignal::Event { .. } => "event",
            ReplaySignal::Heartbeat => "heartbeat",
            ReplaySignal::EndSession => "end_session",
        }
    }
}

/// A timestamped replay record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    /// Schema version identifier
    pub schema_version: String,
    /// Virtual time at which the signal happens
    pub at: DateTime<Utc>,
    pub signal: ReplaySignal,
}

impl ReplayRecord {
    pub fn new(at: DateTime<Utc>, signal: ReplaySignal) -> Self {
        Self {
            schema_version: REPLAY_SCHEMA_VERSION.to_string(),
            at,
            signal,
        }
    }

    /// Validate a single record
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != REPLAY_SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: REPLAY_SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }
        match &self.signal {
            ReplaySignal::StartSession { user_id, .. } if user_id.trim().is_empty() => {
                Err(ValidationError::MissingField("user_id".to_string()))
            }
            ReplaySignal::PageView { path } if path.is_empty() => {
                Err(ValidationError::MissingField("path".to_string()))
            }
            ReplaySignal::Event { name, .. } if name.trim().is_empty() => {
                Err(ValidationError::MissingField("name".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Validation errors for replay records
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Record {index} at {at} is earlier than the previous record at {previous}")]
    OutOfOrder {
        index: usize,
        at: DateTime<Utc>,
        previous: DateTime<Utc>,
    },
}

/// Parse a JSON array of replay records
pub fn parse_array(json: &str) -> Result<Vec<ReplayRecord>, TrackerError> {
    let records: Vec<ReplayRecord> = serde_json::from_str(json)?;
    Ok(records)
}

/// Parse NDJSON (one replay record per line)
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<ReplayRecord>, TrackerError> {
    let mut records = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ReplayRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                return Err(TrackerError::ParseError(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(records)
}

/// Validate every record and check that time never goes backwards
pub fn validate_script(records: &[ReplayRecord]) -> Result<(), ValidationError> {
    let mut previous: Option<DateTime<Utc>> = None;
    for (index, record) in records.iter().enumerate() {
        record.validate()?;
        if let Some(previous) = previous {
            if record.at < previous {
                return Err(ValidationError::OutOfOrder {
                    index,
                    at: record.at,
                    previous,
                });
            }
        }
        previous = Some(record.at);
    }
    Ok(())
}

/// Counters from one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    pub records: usize,
    pub sessions_started: usize,
    pub interval_heartbeats: usize,
    /// Whether a session was still open when the script ended
    pub session_open: bool,
}

/// Drives a tracker through a replay script on a virtual clock
pub struct Replayer {
    tracker: Tracker,
    bus: HostBus,
    clock: ManualClock,
    interval: Duration,
}

impl Replayer {
    /// Build a replayer whose tracker writes to `store`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(store: Arc<dyn SessionStore>, config: TrackerConfig) -> Result<Self, TrackerError> {
        let bus = HostBus::default();
        let clock = ManualClock::new();
        let interval = Duration::seconds(config.heartbeat_interval_secs as i64);
        let tracker = Tracker::builder(store, Arc::new(bus.clone()))
            .config(config)
            .clock(Arc::new(clock.clone()))
            .build()?;
        Ok(Self {
            tracker,
            bus,
            clock,
            interval,
        })
    }

    /// Replay `records` and wait for every resulting store write.
    ///
    /// With `end_at_eof`, a session still open after the last record is
    /// ended at that record's time.
    pub async fn run(
        &self,
        records: &[ReplayRecord],
        end_at_eof: bool,
    ) -> Result<ReplaySummary, TrackerError> {
        validate_script(records)?;

        let mut summary = ReplaySummary::default();
        let mut session_id = self.tracker.session_id();
        let mut next_beat: Option<DateTime<Utc>> = None;

        for record in records {
            summary.interval_heartbeats += self.beat_until(&mut next_beat, record.at);
            self.clock.set(record.at);
            self.apply(&record.signal);
            summary.records += 1;

            let current = self.tracker.session_id();
            if current != session_id {
                next_beat = current.as_ref().map(|_| record.at + self.interval);
                if current.is_some() {
                    summary.sessions_started += 1;
                }
                session_id = current;
            }
        }

        if end_at_eof {
            self.tracker.end_session();
        }
        summary.session_open = self.tracker.is_session_active();
        self.tracker.drained().await;
        Ok(summary)
    }

    /// Fire the interval heartbeats that fall due up to `until`
    fn beat_until(&self, next_beat: &mut Option<DateTime<Utc>>, until: DateTime<Utc>) -> usize {
        let mut fired = 0;
        while let Some(due) = *next_beat {
            if due > until {
                break;
            }
            self.clock.set(due);
            self.tracker.heartbeat();
            fired += 1;
            *next_beat = Some(due + self.interval);
        }
        fired
    }

    fn apply(&self, signal: &ReplaySignal) {
        debug!(signal = signal.type_name(), "replay");
        match signal {
            ReplaySignal::StartSession {
                user_id,
                client_metadata,
            } => {
                if let Some(metadata) = client_metadata {
                    self.bus.set_client_metadata(metadata.clone());
                }
                self.tracker.start_session(user_id);
            }
            ReplaySignal::PageView { path } => {
                self.bus.set_current_path(Some(path.clone()));
                self.tracker.track_page_view(path);
            }
            ReplaySignal::Scroll {
                scroll_top,
                scroll_height,
                viewport_height,
            } => {
                self.bus.emit(HostSignal::Scroll(ScrollPosition {
                    scroll_top: *scroll_top,
                    scroll_height: *scroll_height,
                    viewport_height: *viewport_height,
                }));
            }
            ReplaySignal::Visibility { state } => {
                self.bus.emit(HostSignal::Visibility(*state));
            }
            ReplaySignal::Unload => {
                self.bus.emit(HostSignal::Unload);
            }
            ReplaySignal::Event { name, properties } => {
                self.tracker.track_event(name, Some(properties.clone()));
            }
            ReplaySignal::Heartbeat => self.tracker.heartbeat(),
            ReplaySignal::EndSession => self.tracker.end_session(),
        }
    }
}
