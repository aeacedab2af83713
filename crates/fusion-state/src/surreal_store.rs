//! SurrealDB-backed HistoryStore / SessionStore implementation
//!
//! Documents are stored as serialised JSON strings next to their key, so the
//! record shape can evolve without schema changes and round-trips exactly.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::storage_traits::*;

const NAMESPACE: &str = "fusion";
const DATABASE: &str = "main";

#[derive(Debug, Serialize, Deserialize)]
struct HistoryRow {
    agent_name: String,
    document: String,
    updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionRow {
    session_id: String,
    document: String,
    updated_at: String,
}

#[derive(Debug, Deserialize)]
struct AgentKeyRow {
    agent_name: String,
}

#[derive(Debug, Deserialize)]
struct SessionKeyRow {
    session_id: String,
}

fn backend(e: surrealdb::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// SurrealDB-backed implementation of [`HistoryStore`] and [`SessionStore`].
pub struct SurrealStateStore {
    db: Surreal<Any>,
}

impl SurrealStateStore {
    /// Create an in-memory instance for testing.
    ///
    /// Connects to `mem://`, selects `fusion/main`, and runs `init_schema`.
    pub async fn in_memory() -> crate::Result<Self> {
        Self::connect("mem://").await
    }

    /// Connect to any SurrealDB endpoint (`mem://`, `surrealkv://path`, `ws://host`).
    pub async fn connect(url: &str) -> crate::Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(NAMESPACE)
            .use_db(DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;

        info!(url = %url, "SurrealStateStore connected");
        Ok(Self { db })
    }

    /// Open a local embedded store under `dir` (created if missing).
    pub async fn open_local(dir: &std::path::Path) -> crate::Result<Self> {
        std::fs::create_dir_all(dir)?;
        Self::connect(&format!("surrealkv://{}", dir.display())).await
    }
}

#[async_trait]
impl HistoryStore for SurrealStateStore {
    async fn load_history(&self, agent_name: &str) -> StorageResult<Option<AgentHistoryRecord>> {
        validate_key(HISTORY_COLLECTION, agent_name)?;

        let mut res = self
            .db
            .query("SELECT agent_name, document, updated_at FROM agent_memory WHERE agent_name = $name")
            .bind(("name", agent_name.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<HistoryRow> = res.take(0).map_err(backend)?;
        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_str(&row.document)?)),
            None => Ok(None),
        }
    }

    async fn save_history(&self, record: &AgentHistoryRecord) -> StorageResult<()> {
        validate_key(HISTORY_COLLECTION, &record.agent_name)?;

        let row = HistoryRow {
            agent_name: record.agent_name.clone(),
            document: serde_json::to_string(record)?,
            updated_at: Utc::now().to_rfc3339(),
        };

        debug!(agent = %record.agent_name, "saving agent history");

        self.db
            .query(
                "BEGIN TRANSACTION;
                 DELETE agent_memory WHERE agent_name = $name;
                 CREATE agent_memory CONTENT $row;
                 COMMIT TRANSACTION;",
            )
            .bind(("name", record.agent_name.clone()))
            .bind(("row", row))
            .await
            .and_then(|r| r.check())
            .map_err(backend)?;

        Ok(())
    }

    async fn list_agents(&self) -> StorageResult<Vec<String>> {
        let mut res = self
            .db
            .query("SELECT agent_name FROM agent_memory ORDER BY agent_name ASC")
            .await
            .map_err(backend)?;

        let rows: Vec<AgentKeyRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(|r| r.agent_name).collect())
    }

    async fn delete_history(&self, agent_name: &str) -> StorageResult<()> {
        validate_key(HISTORY_COLLECTION, agent_name)?;

        self.db
            .query("DELETE agent_memory WHERE agent_name = $name")
            .bind(("name", agent_name.to_string()))
            .await
            .and_then(|r| r.check())
            .map_err(backend)?;

        Ok(())
    }
}

#[async_trait]
impl SessionStore for SurrealStateStore {
    async fn save_session(&self, record: &SessionRecord) -> StorageResult<()> {
        validate_key(SESSION_COLLECTION, &record.session_id)?;

        let row = SessionRow {
            session_id: record.session_id.clone(),
            document: serde_json::to_string(record)?,
            updated_at: Utc::now().to_rfc3339(),
        };

        debug!(session_id = %record.session_id, events = record.events.len(), "saving session");

        self.db
            .query(
                "BEGIN TRANSACTION;
                 DELETE telemetry_sessions WHERE session_id = $sid;
                 CREATE telemetry_sessions CONTENT $row;
                 COMMIT TRANSACTION;",
            )
            .bind(("sid", record.session_id.clone()))
            .bind(("row", row))
            .await
            .and_then(|r| r.check())
            .map_err(backend)?;

        Ok(())
    }

    async fn load_session(&self, session_id: &str) -> StorageResult<SessionRecord> {
        let mut res = self
            .db
            .query("SELECT session_id, document, updated_at FROM telemetry_sessions WHERE session_id = $sid")
            .bind(("sid", session_id.to_string()))
            .await
            .map_err(backend)?;

        let rows: Vec<SessionRow> = res.take(0).map_err(backend)?;
        let row = rows.into_iter().next().ok_or_else(|| StorageError::NotFound {
            collection: SESSION_COLLECTION.to_string(),
            key: session_id.to_string(),
        })?;
        Ok(serde_json::from_str(&row.document)?)
    }

    async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        let mut res = self
            .db
            .query("SELECT session_id FROM telemetry_sessions ORDER BY session_id ASC")
            .await
            .map_err(backend)?;

        let rows: Vec<SessionKeyRow> = res.take(0).map_err(backend)?;
        Ok(rows.into_iter().map(|r| r.session_id).collect())
    }
}
