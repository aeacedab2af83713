//! Risk assessment seam.
//!
//! Real scoring lives outside the core. The assessors here are fixed-value
//! helpers for tests and CLI previews.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::{FusionResult, RiskAssessment};

/// Scores the risk of handing `input` to `agent_name`.
#[async_trait]
pub trait RiskAssessor: Send + Sync {
    async fn assess(&self, input: &str, agent_name: &str) -> FusionResult<RiskAssessment>;
}

/// Same score for every input.
#[derive(Debug, Clone)]
pub struct FixedRiskAssessor {
    score: f64,
}

impl FixedRiskAssessor {
    pub fn new(score: f64) -> Self {
        Self { score }
    }
}

impl Default for FixedRiskAssessor {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[async_trait]
impl RiskAssessor for FixedRiskAssessor {
    async fn assess(&self, _input: &str, _agent_name: &str) -> FusionResult<RiskAssessment> {
        Ok(RiskAssessment::new(self.score))
    }
}

/// Per-agent scores with a default for unlisted agents.
#[derive(Debug, Clone, Default)]
pub struct TableRiskAssessor {
    scores: BTreeMap<String, f64>,
    default_score: f64,
}

impl TableRiskAssessor {
    pub fn new(default_score: f64) -> Self {
        Self {
            scores: BTreeMap::new(),
            default_score,
        }
    }

    pub fn with_score(mut self, agent_name: impl Into<String>, score: f64) -> Self {
        self.scores.insert(agent_name.into(), score);
        self
    }
}

#[async_trait]
impl RiskAssessor for TableRiskAssessor {
    async fn assess(&self, _input: &str, agent_name: &str) -> FusionResult<RiskAssessment> {
        let score = self
            .scores
            .get(agent_name)
            .copied()
            .unwrap_or(self.default_score);
        Ok(RiskAssessment::new(score))
    }
}
