//! SurrealDB schema initialization
//!
//! Defines the two tables used by [`crate::SurrealStateStore`]. Every
//! statement uses `IF NOT EXISTS`, so calling [`init_schema`] on an already
//! initialised database is a no-op.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all Fusion tables in SurrealDB
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing Fusion SurrealDB schema");

    init_agent_memory_table(db).await?;
    init_telemetry_sessions_table(db).await?;

    info!("Fusion schema initialization complete");
    Ok(())
}

/// Initialize `agent_memory` table
///
/// Schema:
/// ```text
/// TABLE agent_memory {
///   agent_name:  STRING (unique)
///   document:    STRING (serialised AgentHistoryRecord)
///   updated_at:  STRING (RFC 3339)
/// }
/// ```
async fn init_agent_memory_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing agent_memory table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS agent_memory SCHEMALESS;

        -- One document per agent
        DEFINE INDEX IF NOT EXISTS idx_agent_name ON TABLE agent_memory COLUMNS agent_name UNIQUE;
    "#;

    db.query(sql)
        .await
        .and_then(|r| r.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    info!("agent_memory table initialized");
    Ok(())
}

/// Initialize `telemetry_sessions` table
///
/// Schema:
/// ```text
/// TABLE telemetry_sessions {
///   session_id:  STRING (unique)
///   document:    STRING (serialised SessionRecord)
///   updated_at:  STRING (RFC 3339)
/// }
/// ```
async fn init_telemetry_sessions_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing telemetry_sessions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS telemetry_sessions SCHEMALESS;

        DEFINE INDEX IF NOT EXISTS idx_session_id ON TABLE telemetry_sessions COLUMNS session_id UNIQUE;
    "#;

    db.query(sql)
        .await
        .and_then(|r| r.check())
        .map_err(|e| StateError::SchemaSetup(e.to_string()))?;
    info!("telemetry_sessions table initialized");
    Ok(())
}
