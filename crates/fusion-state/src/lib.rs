//! Fusion-State: persistence for agent memory and telemetry sessions
//!
//! The orchestration core never touches disk or a database directly. It talks
//! to the async traits in [`storage_traits`], which have three backends:
//!
//! - [`fakes`]: in-memory maps, for tests
//! - [`FsStateStore`]: one JSON document per key, atomic rename on write
//! - [`SurrealStateStore`]: SurrealDB (embedded `mem://` / `surrealkv://` or remote)

mod error;
pub mod fakes;
mod fs_store;
pub mod migrations;
pub mod storage_traits;
pub mod surreal_store;

pub use error::{StateError, StorageError};
pub use fs_store::FsStateStore;
pub use storage_traits::{
    validate_key, AgentHistoryRecord, HistoryEntry, HistoryStore, HistorySummary, SessionEvent,
    SessionRecord, SessionStore, StorageResult,
};
pub use surreal_store::SurrealStateStore;

/// Result type for fusion-state setup operations
pub type Result<T> = std::result::Result<T, StateError>;
