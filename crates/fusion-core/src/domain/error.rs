//! Error taxonomy for the orchestration core.
//!
//! Only chain lookup and setup paths return these to callers. Failures inside
//! a single invocation are captured into `AgentResult::error` instead.

/// Fusion core errors.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    #[error("chain not found: {name} (available: {available})")]
    ChainNotFound { name: String, available: String },

    #[error("agent not registered: {0}")]
    AgentNotRegistered(String),

    #[error("agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("agent {agent} failed: {message}")]
    AgentExecution { agent: String, message: String },

    #[error("risk assessment failed: {0}")]
    RiskAssessment(String),

    #[error("failed to load configuration from {path}: {reason}")]
    ConfigurationLoad { path: String, reason: String },

    #[error("storage error: {0}")]
    Storage(#[from] fusion_state::StorageError),

    #[error("state backend error: {0}")]
    State(#[from] fusion_state::StateError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("telemetry export failed: {0}")]
    Export(String),
}

/// Result type for Fusion core operations.
pub type FusionResult<T> = std::result::Result<T, FusionError>;
