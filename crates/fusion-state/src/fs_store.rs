use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{StateError, StorageError};
use crate::storage_traits::*;

/// Filesystem-backed store writing one pretty-printed JSON document per key.
///
/// Layout:
/// - `<root>/memory/<agent_name>.json`
/// - `<root>/telemetry/<session_id>.json`
///
/// Every write goes to a temp file in the target directory and is renamed
/// into place, so readers never observe a half-written document.
pub struct FsStateStore {
    memory_dir: PathBuf,
    telemetry_dir: PathBuf,
}

impl FsStateStore {
    /// Create a store rooted at `root`, creating both sub-directories.
    pub fn new(root: impl AsRef<Path>) -> crate::Result<Self> {
        let memory_dir = root.as_ref().join(HISTORY_COLLECTION);
        let telemetry_dir = root.as_ref().join(SESSION_COLLECTION);
        fs::create_dir_all(&memory_dir).map_err(StateError::Io)?;
        fs::create_dir_all(&telemetry_dir).map_err(StateError::Io)?;
        Ok(Self {
            memory_dir,
            telemetry_dir,
        })
    }

    fn history_path(&self, agent_name: &str) -> PathBuf {
        self.memory_dir.join(format!("{agent_name}.json"))
    }

    fn session_path(&self, session_id: &str) -> PathBuf {
        self.telemetry_dir.join(format!("{session_id}.json"))
    }
}

fn write_atomic<T: Serialize>(dir: &Path, path: &Path, value: &T) -> StorageResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&bytes)?;
    tmp.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), bytes = bytes.len(), "document written");
    Ok(())
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Sorted file stems of `*.json` documents in `dir`.
fn list_stems(dir: &Path) -> StorageResult<Vec<String>> {
    let mut stems = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            stems.push(stem.to_string());
        }
    }
    stems.sort();
    Ok(stems)
}

#[async_trait]
impl HistoryStore for FsStateStore {
    async fn load_history(&self, agent_name: &str) -> StorageResult<Option<AgentHistoryRecord>> {
        validate_key(HISTORY_COLLECTION, agent_name)?;
        read_optional(&self.history_path(agent_name))
    }

    async fn save_history(&self, record: &AgentHistoryRecord) -> StorageResult<()> {
        validate_key(HISTORY_COLLECTION, &record.agent_name)?;
        write_atomic(
            &self.memory_dir,
            &self.history_path(&record.agent_name),
            record,
        )
    }

    async fn list_agents(&self) -> StorageResult<Vec<String>> {
        list_stems(&self.memory_dir)
    }

    async fn delete_history(&self, agent_name: &str) -> StorageResult<()> {
        validate_key(HISTORY_COLLECTION, agent_name)?;
        match fs::remove_file(self.history_path(agent_name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl SessionStore for FsStateStore {
    async fn save_session(&self, record: &SessionRecord) -> StorageResult<()> {
        validate_key(SESSION_COLLECTION, &record.session_id)?;
        write_atomic(
            &self.telemetry_dir,
            &self.session_path(&record.session_id),
            record,
        )
    }

    async fn load_session(&self, session_id: &str) -> StorageResult<SessionRecord> {
        validate_key(SESSION_COLLECTION, session_id)?;
        read_optional(&self.session_path(session_id))?.ok_or_else(|| StorageError::NotFound {
            collection: SESSION_COLLECTION.to_string(),
            key: session_id.to_string(),
        })
    }

    async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        list_stems(&self.telemetry_dir)
    }
}
