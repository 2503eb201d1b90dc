//! Synheart Pulse - On-device session and engagement tracker
//!
//! Pulse observes a user's activity inside a running application, groups it
//! into sessions and page-views, and reliably reports progress to a session
//! store: scroll depth → page-view aggregation → cumulative heartbeats →
//! final flush on session end.
//!
//! ## Modules
//!
//! - **Tracker**: Session lifecycle and ad hoc events, the host-facing surface
//! - **Aggregator / Scroll**: Page-view durations and scroll depth
//! - **Heartbeat**: Interval and page-lifecycle flushes
//! - **Store**: Persistence collaborator trait and bundled stores
//! - **Replay**: Drive a tracker from a recorded signal script

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod host;
pub mod replay;
pub mod scroll;
pub mod store;
pub mod tracker;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::TrackerConfig;
pub use error::{StoreError, TrackerError};
pub use host::{HostBus, HostEnvironment, HostSignal, ScrollPosition, Subscription, Visibility};
pub use store::{MemoryStore, NdjsonStore, SessionStore, StoreCall};
pub use tracker::{Tracker, TrackerBuilder};
pub use types::{
    ClientMetadata, EventRecord, NewSession, PageViewRecord, Properties, SessionSnapshot,
    SessionUpdate,
};

// Replay exports
pub use replay::{ReplayRecord, ReplaySignal, Replayer, REPLAY_SCHEMA_VERSION};

/// Pulse version
pub const PULSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "synheart-pulse";
