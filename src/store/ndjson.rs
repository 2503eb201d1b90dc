//! NDJSON session store
//!
//! Writes each store call as one JSON line to a writer. Used by the `pulse`
//! CLI to print the write stream of a replayed session.

use std::io::Write;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{SessionStore, StoreCall};
use crate::error::StoreError;
use crate::types::{EventRecord, NewSession, SessionUpdate};

/// Store that serializes every call as a JSON line
pub struct NdjsonStore<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> NdjsonStore<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_call(&self, call: &StoreCall) -> Result<(), StoreError> {
        let line = serde_json::to_string(call)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send> SessionStore for NdjsonStore<W> {
    async fn create_session(&self, session: &NewSession) -> Result<(), StoreError> {
        self.write_call(&StoreCall::CreateSession(session.clone()))
    }

    async fn update_session(&self, update: &SessionUpdate) -> Result<(), StoreError> {
        self.write_call(&StoreCall::UpdateSession(update.clone()))
    }

    async fn append_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        self.write_call(&StoreCall::AppendEvent(event.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageViewRecord;

    #[tokio::test]
    async fn test_writes_one_line_per_call() {
        let store = NdjsonStore::new(Vec::new());
        let update = SessionUpdate {
            session_id: "s-1".to_string(),
            user_id: "u-1".to_string(),
            last_heartbeat_at: None,
            ended_at: Some("2024-01-15T14:05:00Z".parse().unwrap()),
            page_views: Some(vec![PageViewRecord {
                page: "/a".to_string(),
                duration_seconds: 3,
                scroll_depth_percent: 40,
            }]),
        };
        store.update_session(&update).await.unwrap();
        store.update_session(&update).await.unwrap();

        let output = String::from_utf8(store.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: StoreCall = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed, StoreCall::UpdateSession(update));
    }
}
