//! Error types for fusion-state

use thiserror::Error;

/// Errors raised while connecting to or preparing a backend.
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),

    /// Filesystem error while preparing a store root
    #[error("Store root unavailable: {0}")]
    Io(#[from] std::io::Error),
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        StateError::Connection(err.to_string())
    }
}

/// Errors returned by store trait operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// No record exists under the requested key
    #[error("{collection} record not found: {key}")]
    NotFound { collection: String, key: String },

    /// Key cannot be used as a record identifier
    #[error("invalid {collection} key: {key:?}")]
    InvalidKey { collection: String, key: String },

    /// Backend-specific failure (query, transaction, connection loss)
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Filesystem failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
