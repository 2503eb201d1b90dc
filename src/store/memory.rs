//! In-memory session store
//!
//! Applies writes with last-write-wins semantics and keeps an ordered log of
//! every call it received. Failures can be injected to exercise the
//! tracker's log-and-continue behavior.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::{SessionStore, StoreCall};
use crate::error::StoreError;
use crate::types::{ClientMetadata, EventRecord, NewSession, PageViewRecord, SessionUpdate};

/// Stored state of one session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub session_id: String,
    pub user_id: String,
    /// Unset when the record was first seen through an update
    pub started_at: Option<DateTime<Utc>>,
    pub client_metadata: Option<ClientMetadata>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub page_views: Vec<PageViewRecord>,
}

impl StoredSession {
    fn empty(session_id: &str, user_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            started_at: None,
            client_metadata: None,
            last_heartbeat_at: None,
            ended_at: None,
            page_views: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    calls: Vec<StoreCall>,
    sessions: HashMap<(String, String), StoredSession>,
    events: Vec<EventRecord>,
    fail_next: usize,
    unavailable: bool,
}

impl MemoryInner {
    /// Log the call and decide whether it fails
    fn admit(&mut self, call: StoreCall) -> Result<(), StoreError> {
        let op = call.op_name();
        self.calls.push(call);
        if self.unavailable {
            return Err(StoreError::Unavailable(format!("{op}: store offline")));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(StoreError::Unavailable(format!("{op}: injected failure")));
        }
        Ok(())
    }
}

/// Shared in-memory store; clones observe the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call received, in arrival order, including failed ones
    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner.lock().calls.clone()
    }

    /// Only the session updates, in arrival order
    pub fn updates(&self) -> Vec<SessionUpdate> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                StoreCall::UpdateSession(update) => Some(update.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.inner.lock().calls.len()
    }

    /// Stored record for `session_id`, if any write for it succeeded
    pub fn session(&self, session_id: &str) -> Option<StoredSession> {
        self.inner
            .lock()
            .sessions
            .values()
            .find(|s| s.session_id == session_id)
            .cloned()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Successfully appended events
    pub fn events(&self) -> Vec<EventRecord> {
        self.inner.lock().events.clone()
    }

    /// Fail the next `n` calls with [`StoreError::Unavailable`]
    pub fn fail_next(&self, n: usize) {
        self.inner.lock().fail_next = n;
    }

    /// Fail every call until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, session: &NewSession) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.admit(StoreCall::CreateSession(session.clone()))?;

        let key = (session.session_id.clone(), session.user_id.clone());
        if inner.sessions.contains_key(&key) {
            return Err(StoreError::Rejected(format!(
                "session {} already exists",
                session.session_id
            )));
        }

        let mut stored = StoredSession::empty(&session.session_id, &session.user_id);
        stored.started_at = Some(session.started_at);
        stored.client_metadata = Some(session.client_metadata.clone());
        inner.sessions.insert(key, stored);
        Ok(())
    }

    async fn update_session(&self, update: &SessionUpdate) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.admit(StoreCall::UpdateSession(update.clone()))?;

        let key = (update.session_id.clone(), update.user_id.clone());
        let stored = inner
            .sessions
            .entry(key)
            .or_insert_with(|| StoredSession::empty(&update.session_id, &update.user_id));

        if let Some(at) = update.last_heartbeat_at {
            stored.last_heartbeat_at = Some(at);
        }
        if let Some(at) = update.ended_at {
            stored.ended_at = Some(at);
        }
        if let Some(views) = &update.page_views {
            stored.page_views = views.clone();
        }
        Ok(())
    }

    async fn append_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.admit(StoreCall::AppendEvent(event.clone()))?;
        inner.events.push(event.clone());
        Ok(())
    }
}
