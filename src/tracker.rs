//! Session lifecycle and event tracking
//!
//! [`Tracker`] is the only surface the host application talks to. It owns the
//! session state, the page-view aggregator and the heartbeat scheduler, and
//! queues every store write without waiting for it. No tracking call returns
//! an error; store failures are logged and the next heartbeat resends the
//! cumulative state.
//!
//! Session state machine:
//!
//! ```text
//! NoSession --start(u)--> Active(u)
//! Active(u) --start(u)--> Active(u)            (no-op)
//! Active(u) --start(v)--> end, then Active(v)
//! Active(u) --end-------> NoSession
//! ```

use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregator::PageViewAggregator;
use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::dispatch::Dispatcher;
use crate::error::TrackerError;
use crate::heartbeat::{HeartbeatFn, HeartbeatScheduler, HeartbeatTrigger};
use crate::host::HostEnvironment;
use crate::store::{SessionStore, StoreCall};
use crate::types::{
    ClientMetadata, EventRecord, NewSession, Properties, SessionSnapshot, SessionUpdate,
};

/// Explicit session state, checked once at the top of each operation
enum SessionState {
    NoSession,
    Active(ActiveSession),
}

struct ActiveSession {
    session_id: String,
    user_id: String,
    started_at: DateTime<Utc>,
    client_metadata: ClientMetadata,
    last_heartbeat_at: Option<DateTime<Utc>>,
    page_views: PageViewAggregator,
    heartbeat: HeartbeatScheduler,
}

struct TrackerInner {
    config: TrackerConfig,
    host: Arc<dyn HostEnvironment>,
    clock: Arc<dyn Clock>,
    runtime: Handle,
    writer: Dispatcher,
    state: Mutex<SessionState>,
}

/// Session and engagement tracker.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct Tracker {
    inner: Arc<TrackerInner>,
}

/// Builder for [`Tracker`]
pub struct TrackerBuilder {
    store: Arc<dyn SessionStore>,
    host: Arc<dyn HostEnvironment>,
    config: TrackerConfig,
    clock: Arc<dyn Clock>,
    runtime: Option<Handle>,
}

impl TrackerBuilder {
    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runtime for the heartbeat timer and store writer.
    ///
    /// Defaults to the runtime the builder is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn build(self) -> Result<Tracker, TrackerError> {
        self.config.validate()?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| TrackerError::NoRuntime)?,
        };
        let writer = Dispatcher::spawn(&runtime, self.store, self.config.store_timeout());

        Ok(Tracker {
            inner: Arc::new(TrackerInner {
                config: self.config,
                host: self.host,
                clock: self.clock,
                runtime,
                writer,
                state: Mutex::new(SessionState::NoSession),
            }),
        })
    }
}

impl Tracker {
    /// Tracker with default configuration and the system clock
    pub fn new(
        store: Arc<dyn SessionStore>,
        host: Arc<dyn HostEnvironment>,
    ) -> Result<Self, TrackerError> {
        Self::builder(store, host).build()
    }

    pub fn builder(store: Arc<dyn SessionStore>, host: Arc<dyn HostEnvironment>) -> TrackerBuilder {
        TrackerBuilder {
            store,
            host,
            config: TrackerConfig::default(),
            clock: Arc::new(SystemClock),
            runtime: None,
        }
    }

    /// Begin a session for `user_id`.
    ///
    /// No-op if this user already has the active session. A session for a
    /// different user is ended first.
    pub fn start_session(&self, user_id: &str) {
        // Host facts are read before the state lock is taken
        let client_metadata = self.inner.host.client_metadata();
        let initial_path = if self.inner.config.track_initial_page {
            self.inner.host.current_path()
        } else {
            None
        };

        let mut state = self.inner.state.lock();
        if let SessionState::Active(active) = &*state {
            if active.user_id == user_id {
                debug!(session_id = %active.session_id, user_id, "session already active");
                return;
            }
            info!(
                session_id = %active.session_id,
                from = %active.user_id,
                to = user_id,
                "user changed, ending previous session"
            );
        }
        self.inner.end_locked(&mut state);
        self.inner.begin_locked(&mut state, user_id, client_metadata, initial_path);
    }

    /// End the active session with a final flush; no-op without one.
    pub fn end_session(&self) {
        let mut state = self.inner.state.lock();
        self.inner.end_locked(&mut state);
    }

    /// Finalize the current page-view and open `path`; no-op without a session.
    pub fn track_page_view(&self, path: &str) {
        let mut state = self.inner.state.lock();
        let SessionState::Active(active) = &mut *state else {
            return;
        };
        let now = self.inner.clock.now();
        self.inner.open_page_view(active, path, now);
    }

    /// Report a named event; no-op without a session.
    pub fn track_event(&self, name: &str, properties: Option<Properties>) {
        let record = {
            let state = self.inner.state.lock();
            let SessionState::Active(active) = &*state else {
                return;
            };
            EventRecord {
                user_id: active.user_id.clone(),
                session_id: active.session_id.clone(),
                event_name: name.to_string(),
                properties: properties.unwrap_or_default(),
                timestamp: self.inner.clock.now(),
            }
        };
        debug!(session_id = %record.session_id, event = name, "event tracked");
        self.inner.writer.send(StoreCall::AppendEvent(record));
    }

    /// Flush the cumulative snapshot now, outside the timer schedule
    pub fn heartbeat(&self) {
        self.inner.fire_heartbeat(None, HeartbeatTrigger::Manual);
    }

    pub fn is_session_active(&self) -> bool {
        matches!(*self.inner.state.lock(), SessionState::Active(_))
    }

    pub fn session_id(&self) -> Option<String> {
        match &*self.inner.state.lock() {
            SessionState::Active(active) => Some(active.session_id.clone()),
            SessionState::NoSession => None,
        }
    }

    pub fn user_id(&self) -> Option<String> {
        match &*self.inner.state.lock() {
            SessionState::Active(active) => Some(active.user_id.clone()),
            SessionState::NoSession => None,
        }
    }

    /// Current session state as a heartbeat would report it
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        let state = self.inner.state.lock();
        let SessionState::Active(active) = &*state else {
            return None;
        };
        let now = self.inner.clock.now();
        Some(SessionSnapshot {
            session_id: active.session_id.clone(),
            user_id: active.user_id.clone(),
            started_at: active.started_at,
            last_heartbeat_at: active.last_heartbeat_at,
            client_metadata: active.client_metadata.clone(),
            current_page: active.page_views.current().map(|view| view.page.clone()),
            page_views: active.page_views.capture_snapshot(now),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    /// Wait until every store write queued so far has completed or failed
    pub async fn drained(&self) {
        self.inner.writer.drained().await;
    }
}

impl TrackerInner {
    fn begin_locked(
        self: &Arc<Self>,
        state: &mut SessionState,
        user_id: &str,
        client_metadata: ClientMetadata,
        initial_path: Option<String>,
    ) {
        let now = self.clock.now();
        let session_id = Uuid::new_v4().to_string();

        info!(session_id = %session_id, user_id, "session started");
        self.writer.send(StoreCall::CreateSession(NewSession {
            session_id: session_id.clone(),
            user_id: user_id.to_string(),
            started_at: now,
            client_metadata: client_metadata.clone(),
        }));

        let mut active = ActiveSession {
            session_id,
            user_id: user_id.to_string(),
            started_at: now,
            client_metadata,
            last_heartbeat_at: None,
            page_views: PageViewAggregator::new(self.config.min_page_view_secs()),
            heartbeat: HeartbeatScheduler::new(),
        };

        active.heartbeat.start(
            &self.runtime,
            self.host.as_ref(),
            self.config.heartbeat_interval(),
            self.heartbeat_callback(&active.session_id),
        );

        if let Some(path) = initial_path {
            self.open_page_view(&mut active, &path, now);
        }

        *state = SessionState::Active(active);
    }

    /// Tear down timers and listeners, then issue the final update.
    fn end_locked(&self, state: &mut SessionState) {
        let SessionState::Active(mut active) = std::mem::replace(state, SessionState::NoSession)
        else {
            return;
        };

        active.heartbeat.stop();
        let now = self.clock.now();
        let page_views = active.page_views.finish(now);

        info!(
            session_id = %active.session_id,
            user_id = %active.user_id,
            page_views = page_views.len(),
            "session ended"
        );
        self.writer.send(StoreCall::UpdateSession(SessionUpdate {
            session_id: active.session_id,
            user_id: active.user_id,
            last_heartbeat_at: None,
            ended_at: Some(now),
            page_views: Some(page_views),
        }));
    }

    fn open_page_view(
        self: &Arc<Self>,
        active: &mut ActiveSession,
        path: &str,
        now: DateTime<Utc>,
    ) {
        let tracker = Arc::downgrade(self);
        let session_id = active.session_id.clone();
        active
            .page_views
            .track(path, now, self.host.as_ref(), move |generation, depth| {
                if let Some(inner) = tracker.upgrade() {
                    inner.record_scroll(&session_id, generation, depth);
                }
            });
    }

    fn record_scroll(&self, session_id: &str, generation: u64, depth: u8) {
        let mut state = self.state.lock();
        if let SessionState::Active(active) = &mut *state {
            if active.session_id == session_id {
                active.page_views.record_scroll(generation, depth);
            }
        }
    }

    fn heartbeat_callback(self: &Arc<Self>, session_id: &str) -> HeartbeatFn {
        let tracker: Weak<TrackerInner> = Arc::downgrade(self);
        let session_id = session_id.to_string();
        Arc::new(move |trigger| {
            if let Some(inner) = tracker.upgrade() {
                inner.fire_heartbeat(Some(&session_id), trigger);
            }
        })
    }

    /// Send `last_heartbeat_at` and the full page-view snapshot.
    ///
    /// `expected_session` guards against a timer or listener that belonged
    /// to a session which has since ended.
    fn fire_heartbeat(&self, expected_session: Option<&str>, trigger: HeartbeatTrigger) {
        let mut state = self.state.lock();
        let SessionState::Active(active) = &mut *state else {
            return;
        };
        if expected_session.is_some_and(|expected| expected != active.session_id) {
            debug!(trigger = trigger.as_str(), "heartbeat for ended session ignored");
            return;
        }

        let now = self.clock.now();
        let page_views = active.page_views.capture_snapshot(now);
        active.last_heartbeat_at = Some(now);

        debug!(
            session_id = %active.session_id,
            trigger = trigger.as_str(),
            page_views = page_views.len(),
            "heartbeat"
        );
        self.writer.send(StoreCall::UpdateSession(SessionUpdate {
            session_id: active.session_id.clone(),
            user_id: active.user_id.clone(),
            last_heartbeat_at: Some(now),
            ended_at: None,
            page_views: Some(page_views),
        }));
    }
}
