//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemoryHistoryStore` and `MemorySessionStore` that satisfy the
//! trait contracts without touching disk or a database.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemoryHistoryStore
// ---------------------------------------------------------------------------

/// In-memory history store backed by a `BTreeMap<agent, record>`.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    records: Mutex<BTreeMap<String, AgentHistoryRecord>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load_history(&self, agent_name: &str) -> StorageResult<Option<AgentHistoryRecord>> {
        validate_key(HISTORY_COLLECTION, agent_name)?;
        let records = self.records.lock().unwrap();
        Ok(records.get(agent_name).cloned())
    }

    async fn save_history(&self, record: &AgentHistoryRecord) -> StorageResult<()> {
        validate_key(HISTORY_COLLECTION, &record.agent_name)?;
        let mut records = self.records.lock().unwrap();
        records.insert(record.agent_name.clone(), record.clone());
        Ok(())
    }

    async fn list_agents(&self) -> StorageResult<Vec<String>> {
        let records = self.records.lock().unwrap();
        Ok(records.keys().cloned().collect())
    }

    async fn delete_history(&self, agent_name: &str) -> StorageResult<()> {
        validate_key(HISTORY_COLLECTION, agent_name)?;
        let mut records = self.records.lock().unwrap();
        records.remove(agent_name);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySessionStore
// ---------------------------------------------------------------------------

/// In-memory session store backed by a `BTreeMap<session_id, record>`.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<BTreeMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn save_session(&self, record: &SessionRecord) -> StorageResult<()> {
        validate_key(SESSION_COLLECTION, &record.session_id)?;
        let mut sessions = self.sessions.lock().unwrap();
        sessions.insert(record.session_id.clone(), record.clone());
        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> StorageResult<SessionRecord> {
        let sessions = self.sessions.lock().unwrap();
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                collection: SESSION_COLLECTION.to_string(),
                key: session_id.to_string(),
            })
    }

    async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions.keys().cloned().collect())
    }
}
