//! Session store collaborator
//!
//! The tracker persists through a [`SessionStore`]: create a session record,
//! upsert it with cumulative state, and append ad hoc events. Updates carry
//! the full page-view history, so a store should treat them as
//! last-write-wins keyed by `(session_id, user_id)`.

mod memory;
mod ndjson;

pub use memory::{MemoryStore, StoredSession};
pub use ndjson::NdjsonStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{EventRecord, NewSession, SessionUpdate};

/// Persistence backend for session and event records
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the session record; fails if it cannot be created
    async fn create_session(&self, session: &NewSession) -> Result<(), StoreError>;

    /// Idempotent upsert keyed by `(session_id, user_id)`
    async fn update_session(&self, update: &SessionUpdate) -> Result<(), StoreError>;

    /// Append-only insert of one event
    async fn append_event(&self, event: &EventRecord) -> Result<(), StoreError>;
}

/// One store operation, as logged by [`MemoryStore`] and written by [`NdjsonStore`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StoreCall {
    CreateSession(NewSession),
    UpdateSession(SessionUpdate),
    AppendEvent(EventRecord),
}

impl StoreCall {
    pub fn op_name(&self) -> &'static str {
        match self {
            StoreCall::CreateSession(_) => "create_session",
            StoreCall::UpdateSession(_) => "update_session",
            StoreCall::AppendEvent(_) => "append_event",
        }
    }

    pub fn session_id(&self) -> &str {
        match self {
            StoreCall::CreateSession(s) => &s.session_id,
            StoreCall::UpdateSession(u) => &u.session_id,
            StoreCall::AppendEvent(e) => &e.session_id,
        }
    }

    /// Dispatch this call to `store`
    pub async fn apply(&self, store: &dyn SessionStore) -> Result<(), StoreError> {
        match self {
            StoreCall::CreateSession(session) => store.create_session(session).await,
            StoreCall::UpdateSession(update) => store.update_session(update).await,
            StoreCall::AppendEvent(event) => store.append_event(event).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientMetadata;

    #[test]
    fn test_store_call_is_tagged_by_op() {
        let call = StoreCall::CreateSession(NewSession {
            session_id: "s-1".to_string(),
            user_id: "u-1".to_string(),
            started_at: "2024-01-15T14:00:00Z".parse().unwrap(),
            client_metadata: ClientMetadata::default(),
        });

        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["op"], "create_session");
        assert_eq!(json["session_id"], "s-1");

        let parsed: StoreCall = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.op_name(), "create_session");
        assert_eq!(parsed.session_id(), "s-1");
    }
}
