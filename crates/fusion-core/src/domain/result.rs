//! Outcome records for single invocations, chains and parallel batches.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Risk attached to one invocation's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Always in `[0.0, 1.0]`.
    pub risk_score: f64,
    #[serde(default)]
    pub rationale_notes: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

impl RiskAssessment {
    /// Scores outside `[0, 1]` are clamped; NaN is treated as no risk.
    pub fn new(risk_score: f64) -> Self {
        let risk_score = if risk_score.is_nan() {
            0.0
        } else {
            risk_score.clamp(0.0, 1.0)
        };
        Self {
            risk_score,
            rationale_notes: Vec::new(),
            open_questions: Vec::new(),
        }
    }

    pub fn none() -> Self {
        Self::new(0.0)
    }

    /// Re-apply the `[0, 1]` clamp to a score that may have been set directly.
    pub fn normalized(self) -> Self {
        Self {
            risk_score: Self::new(self.risk_score).risk_score,
            ..self
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.rationale_notes.push(note.into());
        self
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.open_questions.push(question.into());
        self
    }
}

impl Default for RiskAssessment {
    fn default() -> Self {
        Self::none()
    }
}

/// Record of one agent invocation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub agent_name: String,
    /// Input as handed to the step, before any fallback rewrite.
    pub input_text: String,
    /// Input the agent actually received.
    pub effective_input: String,
    pub output_text: String,
    pub confidence: Option<f64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub success: bool,
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub risk: RiskAssessment,
    pub fallback_applied: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Why a chain stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    RiskExceeded,
    AgentError,
    AgentNotRegistered,
}

impl AbortReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AbortReason::RiskExceeded => "risk_exceeded",
            AbortReason::AgentError => "agent_error",
            AbortReason::AgentNotRegistered => "agent_not_registered",
        }
    }
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of running a named chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainExecutionResult {
    pub chain_name: String,
    pub original_input: String,
    pub steps: Vec<AgentResult>,
    pub skipped_agents: Vec<String>,
    pub aborted: bool,
    pub abort_reason: Option<AbortReason>,
    pub total_duration_ms: u64,
}

impl ChainExecutionResult {
    /// Output of the last successful step, or the original input when no
    /// step succeeded.
    pub fn final_output(&self) -> &str {
        self.steps
            .iter()
            .rev()
            .find(|s| s.success)
            .map(|s| s.output_text.as_str())
            .unwrap_or(self.original_input.as_str())
    }

    pub fn succeeded(&self) -> bool {
        !self.aborted && self.steps.iter().all(|s| s.success)
    }
}

/// Outcome of a parallel fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelExecutionResult {
    pub input_text: String,
    /// Invocation order.
    pub results: Vec<AgentResult>,
    /// Best first.
    pub ranked: Vec<AgentResult>,
    pub evaluation_scores: BTreeMap<String, f64>,
    pub evaluated: bool,
    pub total_duration_ms: u64,
}

impl ParallelExecutionResult {
    pub fn empty(input_text: impl Into<String>) -> Self {
        Self {
            input_text: input_text.into(),
            results: Vec::new(),
            ranked: Vec::new(),
            evaluation_scores: BTreeMap::new(),
            evaluated: false,
            total_duration_ms: 0,
        }
    }

    pub fn top(&self) -> Option<&AgentResult> {
        self.ranked.first()
    }

    pub fn successful(&self) -> impl Iterator<Item = &AgentResult> {
        self.results.iter().filter(|r| r.success)
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
