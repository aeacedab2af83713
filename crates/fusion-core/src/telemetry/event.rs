//! Telemetry event shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::AgentResult;

/// Excerpts keep at most this many characters before the `...` marker.
pub const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Single,
    Parallel,
    Evaluation,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Single => "single",
            EventKind::Parallel => "parallel",
            EventKind::Evaluation => "evaluation",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only telemetry record.
///
/// `seq` is assigned by the logger at append time; events built by the
/// constructors below start at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub agent_name: String,
    pub input_excerpt: String,
    pub output_excerpt: String,
    /// SHA-256 hex of the full input.
    pub input_digest: String,
    pub execution_time_ms: u64,
    pub confidence: Option<f64>,
    pub score: Option<f64>,
    pub fallback_pattern: Option<String>,
    pub success: bool,
}

impl TelemetryEvent {
    /// Event for one agent invocation, successful or not.
    pub fn single(result: &AgentResult) -> Self {
        let output = match (&result.error, result.success) {
            (Some(err), false) => format!("Error: {err}"),
            _ => result.output_text.clone(),
        };
        Self {
            seq: 0,
            timestamp: Utc::now(),
            kind: EventKind::Single,
            agent_name: result.agent_name.clone(),
            input_excerpt: excerpt(&result.input_text),
            output_excerpt: excerpt(&output),
            input_digest: input_digest(&result.input_text),
            execution_time_ms: result.execution_time_ms,
            confidence: result.confidence,
            score: None,
            fallback_pattern: result.fallback_applied.clone(),
            success: result.success,
        }
    }

    /// Aggregate event for a parallel batch.
    ///
    /// `agent_name` joins the participating agents with commas. Confidence is
    /// left unset so batch events do not double count the per-agent ones.
    pub fn parallel(input: &str, results: &[AgentResult], duration_ms: u64) -> Self {
        let agents: Vec<&str> = results.iter().map(|r| r.agent_name.as_str()).collect();
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            seq: 0,
            timestamp: Utc::now(),
            kind: EventKind::Parallel,
            agent_name: agents.join(","),
            input_excerpt: excerpt(input),
            output_excerpt: format!("{succeeded}/{} agents succeeded", results.len()),
            input_digest: input_digest(input),
            execution_time_ms: duration_ms,
            confidence: None,
            score: None,
            fallback_pattern: None,
            success: succeeded > 0,
        }
    }

    /// Evaluator verdict for one agent's output.
    pub fn evaluation(agent_name: &str, score: f64) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            kind: EventKind::Evaluation,
            agent_name: agent_name.to_string(),
            input_excerpt: String::new(),
            output_excerpt: format!("score: {score:.3}"),
            input_digest: input_digest(""),
            execution_time_ms: 0,
            confidence: None,
            score: Some(score),
            fallback_pattern: None,
            success: true,
        }
    }
}

/// First [`EXCERPT_CHARS`] characters, with `...` appended when cut.
pub fn excerpt(text: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn input_digest(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}
