//! Memory entries and their persisted form.

use chrono::{DateTime, Utc};
use fusion_state::HistoryEntry;
use serde::{Deserialize, Serialize};

use crate::domain::AgentResult;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryMetadata {
    pub success: bool,
    pub confidence: Option<f64>,
    pub risk_score: f64,
    pub fallback_pattern: Option<String>,
    pub execution_time_ms: u64,
    pub error: Option<String>,
}

/// One remembered interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub agent_name: String,
    pub input_text: String,
    pub output_text: String,
    pub metadata: EntryMetadata,
    pub timestamp: DateTime<Utc>,
}

impl MemoryEntry {
    /// Failed invocations are remembered with `Error: <message>` as output.
    pub fn from_result(result: &AgentResult) -> Self {
        let output_text = match (&result.error, result.success) {
            (Some(err), false) => format!("Error: {err}"),
            _ => result.output_text.clone(),
        };
        Self {
            agent_name: result.agent_name.clone(),
            input_text: result.input_text.clone(),
            output_text,
            metadata: EntryMetadata {
                success: result.success,
                confidence: result.confidence,
                risk_score: result.risk.risk_score,
                fallback_pattern: result.fallback_applied.clone(),
                execution_time_ms: result.execution_time_ms,
                error: result.error.clone(),
            },
            timestamp: Utc::now(),
        }
    }

    pub fn to_history(&self) -> HistoryEntry {
        HistoryEntry {
            input: self.input_text.clone(),
            output: self.output_text.clone(),
            metadata: serde_json::to_value(&self.metadata).unwrap_or_default(),
            timestamp: self.timestamp,
        }
    }

    /// Unknown or partial metadata falls back to defaults field by field.
    pub fn from_history(agent_name: &str, entry: &HistoryEntry) -> Self {
        let metadata = serde_json::from_value(entry.metadata.clone()).unwrap_or_default();
        Self {
            agent_name: agent_name.to_string(),
            input_text: entry.input.clone(),
            output_text: entry.output.clone(),
            metadata,
            timestamp: entry.timestamp,
        }
    }

    /// Case-insensitive substring match on input or output.
    pub fn matches(&self, lowered_query: &str) -> bool {
        self.input_text.to_lowercase().contains(lowered_query)
            || self.output_text.to_lowercase().contains(lowered_query)
    }
}
