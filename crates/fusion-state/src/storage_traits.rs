//! Storage trait definitions for Fusion
//!
//! These traits define the persistence seams of the orchestration core:
//! - `HistoryStore`: per-agent capped interaction history plus running stats
//! - `SessionStore`: telemetry sessions (event list + computed summary)
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Collection name used in errors and by backends for agent histories.
pub const HISTORY_COLLECTION: &str = "memory";

/// Collection name used in errors and by backends for telemetry sessions.
pub const SESSION_COLLECTION: &str = "telemetry";

/// Reject keys that cannot safely name a record on every backend.
///
/// Keys end up as file names in [`crate::FsStateStore`], so path separators,
/// parent references and control characters are refused.
pub fn validate_key(collection: &str, key: &str) -> StorageResult<()> {
    let bad = key.is_empty()
        || key == "."
        || key == ".."
        || key
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '\0' || c.is_control());
    if bad {
        return Err(StorageError::InvalidKey {
            collection: collection.to_string(),
            key: key.to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// HistoryStore — per-agent memory persistence
// ---------------------------------------------------------------------------

/// One stored interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub input: String,
    pub output: String,
    /// Free-form metadata (success flag, confidence, fallback pattern, ...)
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Running statistics that outlive history eviction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total_runs: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub success_rate: f64,
    #[serde(default)]
    pub successes: u64,
    #[serde(default)]
    pub confidence_sum: f64,
    #[serde(default)]
    pub confidence_samples: u64,
    #[serde(default)]
    pub fallback_count: u64,
}

/// Persisted memory document for a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHistoryRecord {
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    /// Capped history, oldest first.
    pub history: Vec<HistoryEntry>,
    pub summary: HistorySummary,
}

impl AgentHistoryRecord {
    /// Empty record stamped with the current time.
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            created_at: Utc::now(),
            history: Vec::new(),
            summary: HistorySummary::default(),
        }
    }
}

/// Agent history persistence.
///
/// Guarantees:
/// - `save_history` replaces the whole record for `record.agent_name`.
/// - `load_history` returns `None` for agents never saved.
/// - `list_agents` is sorted by name.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the record for `agent_name`, if any.
    async fn load_history(&self, agent_name: &str) -> StorageResult<Option<AgentHistoryRecord>>;

    /// Write (create or replace) the record.
    async fn save_history(&self, record: &AgentHistoryRecord) -> StorageResult<()>;

    /// Names of all agents with a stored record.
    async fn list_agents(&self) -> StorageResult<Vec<String>>;

    /// Remove the record. No-op if absent.
    async fn delete_history(&self, agent_name: &str) -> StorageResult<()>;
}

// ---------------------------------------------------------------------------
// SessionStore — telemetry session persistence
// ---------------------------------------------------------------------------

/// A single event in a stored telemetry session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Monotonic sequence number within the session
    pub seq: u64,
    /// Event kind (e.g. "single", "parallel", "evaluation")
    pub kind: String,
    /// Event payload
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Persisted telemetry session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub saved_at: DateTime<Utc>,
    pub events: Vec<SessionEvent>,
    /// Summary computed at save time
    pub summary: serde_json::Value,
}

/// Telemetry session persistence.
///
/// Saving a session id twice overwrites the earlier record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn save_session(&self, record: &SessionRecord) -> StorageResult<()>;

    /// Returns `StorageError::NotFound` if absent.
    async fn load_session(&self, session_id: &str) -> StorageResult<SessionRecord>;

    /// Stored session ids, sorted.
    async fn list_sessions(&self) -> StorageResult<Vec<String>>;
}
