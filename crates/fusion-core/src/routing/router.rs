//! Risk-driven input rewriting.
//!
//! Each invocation's input is scored. Above the table's threshold the input is
//! prefixed with the template of the agent's fallback pattern.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::patterns::{default_agent_patterns, PatternRegistry, DEFAULT_PATTERN};
use super::risk::{FixedRiskAssessor, RiskAssessor};
use crate::domain::RiskAssessment;
use crate::metrics::METRICS;
use crate::obs;

/// Risk above this rewrites the input.
pub const DEFAULT_RISK_THRESHOLD: f64 = 0.65;

/// Which pattern each agent falls back to, and when.
///
/// Serialised field names follow the routing document:
/// `{risk_threshold, default_fallback_agent, pattern_routing}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingTable {
    pub risk_threshold: f64,
    #[serde(rename = "default_fallback_agent", alias = "default_pattern")]
    pub default_pattern: String,
    #[serde(rename = "pattern_routing")]
    pub agent_to_pattern: BTreeMap<String, String>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self {
            risk_threshold: DEFAULT_RISK_THRESHOLD,
            default_pattern: DEFAULT_PATTERN.to_string(),
            agent_to_pattern: default_agent_patterns(),
        }
    }
}

impl RoutingTable {
    /// Pattern configured for `agent_name`, else the default pattern.
    pub fn pattern_for(&self, agent_name: &str) -> &str {
        self.agent_to_pattern
            .get(agent_name)
            .map(String::as_str)
            .unwrap_or(self.default_pattern.as_str())
    }
}

/// What the router decided for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteDecision {
    pub effective_input: String,
    pub applied_pattern: Option<String>,
    pub risk: RiskAssessment,
}

impl RouteDecision {
    fn passthrough(input: &str, risk: RiskAssessment) -> Self {
        Self {
            effective_input: input.to_string(),
            applied_pattern: None,
            risk,
        }
    }
}

/// Routes inputs through the fallback pattern library.
///
/// Cheap to clone; all state is shared and read-only.
#[derive(Clone)]
pub struct FallbackRouter {
    table: Arc<RoutingTable>,
    patterns: Arc<PatternRegistry>,
    assessor: Arc<dyn RiskAssessor>,
    trigger_matching: bool,
}

impl std::fmt::Debug for FallbackRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackRouter")
            .field("table", &self.table)
            .field("patterns", &self.patterns.len())
            .field("trigger_matching", &self.trigger_matching)
            .finish_non_exhaustive()
    }
}

impl Default for FallbackRouter {
    /// Built-in table and patterns with a zero-risk assessor, so nothing is
    /// ever rewritten.
    fn default() -> Self {
        Self::new(
            RoutingTable::default(),
            PatternRegistry::builtin(),
            Arc::new(FixedRiskAssessor::default()),
        )
    }
}

impl FallbackRouter {
    pub fn new(
        table: RoutingTable,
        patterns: PatternRegistry,
        assessor: Arc<dyn RiskAssessor>,
    ) -> Self {
        Self {
            table: Arc::new(table),
            patterns: Arc::new(patterns),
            assessor,
            trigger_matching: false,
        }
    }

    /// Let trigger words in the input override the configured pattern when
    /// they point somewhere more specific than the default.
    pub fn with_trigger_matching(mut self, enabled: bool) -> Self {
        self.trigger_matching = enabled;
        self
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn patterns(&self) -> &PatternRegistry {
        &self.patterns
    }

    /// Pattern this router would apply to a risky `input` for `agent_name`.
    pub fn select_pattern(&self, input: &str, agent_name: &str) -> String {
        if self.trigger_matching {
            let matched = self.patterns.find_by_triggers(input);
            if matched != DEFAULT_PATTERN {
                return matched.to_string();
            }
        }
        self.table.pattern_for(agent_name).to_string()
    }

    /// Score `input` and rewrite it if the score exceeds the threshold.
    ///
    /// Never fails: an assessor error counts as zero risk.
    #[instrument(skip(self, input), fields(agent = %agent_name))]
    pub async fn route(&self, input: &str, agent_name: &str) -> RouteDecision {
        let risk = match self.assessor.assess(input, agent_name).await {
            Ok(risk) => risk.normalized(),
            Err(e) => {
                warn!(agent = %agent_name, error = %e, "risk assessment failed, treating input as safe");
                RiskAssessment::none().with_note(format!("risk assessment failed: {e}"))
            }
        };

        if risk.risk_score <= self.table.risk_threshold {
            debug!(risk = risk.risk_score, "below threshold, input unchanged");
            return RouteDecision::passthrough(input, risk);
        }

        let pattern = self.select_pattern(input, agent_name);
        let Some(template) = self.patterns.template(&pattern) else {
            warn!(agent = %agent_name, pattern = %pattern, "fallback pattern has no template, input unchanged");
            return RouteDecision::passthrough(input, risk);
        };

        obs::emit_fallback_applied(agent_name, &pattern, risk.risk_score);
        METRICS.inc_fallbacks();

        RouteDecision {
            effective_input: format!("{template}\n\n{input}"),
            applied_pattern: Some(pattern),
            risk,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FusionError, FusionResult};
    use crate::routing::TableRiskAssessor;
    use async_trait::async_trait;

    struct FailingAssessor;

    #[async_trait]
    impl RiskAssessor for FailingAssessor {
        async fn assess(&self, _input: &str, _agent: &str) -> FusionResult<RiskAssessment> {
            Err(FusionError::RiskAssessment("model offline".to_string()))
        }
    }

    fn router(score: f64) -> FallbackRouter {
        FallbackRouter::new(
            RoutingTable::default(),
            PatternRegistry::builtin(),
            Arc::new(FixedRiskAssessor::new(score)),
        )
    }

    #[tokio::test]
    async fn at_threshold_input_is_unchanged() {
        let decision = router(DEFAULT_RISK_THRESHOLD).route("hello", "vp_design").await;
        assert_eq!(decision.effective_input, "hello");
        assert!(decision.applied_pattern.is_none());
    }

    #[tokio::test]
    async fn above_threshold_prepends_agent_pattern() {
        let decision = router(0.8).route("hello", "vp_design").await;
        assert_eq!(
            decision.applied_pattern.as_deref(),
            Some("fallback_clarify_then_critique")
        );
        assert_eq!(
            decision.effective_input,
            "First clarify ambiguous terms. Then critique the design proposal step by step.\n\nhello"
        );
        assert_eq!(decision.risk.risk_score, 0.8);
    }

    #[tokio::test]
    async fn unknown_agent_uses_default_pattern() {
        let decision = router(0.8).route("hello", "stranger").await;
        assert_eq!(decision.applied_pattern.as_deref(), Some(DEFAULT_PATTERN));
        assert!(decision.effective_input.ends_with("\n\nhello"));
    }

    #[tokio::test]
    async fn missing_template_leaves_input_unchanged() {
        let mut table = RoutingTable::default();
        table
            .agent_to_pattern
            .insert("vp_design".to_string(), "fallback_missing".to_string());
        let router = FallbackRouter::new(
            table,
            PatternRegistry::builtin(),
            Arc::new(FixedRiskAssessor::new(0.9)),
        );
        let decision = router.route("hello", "vp_design").await;
        assert_eq!(decision.effective_input, "hello");
        assert!(decision.applied_pattern.is_none());
        assert_eq!(decision.risk.risk_score, 0.9);
    }

    struct RawAssessor(f64);

    #[async_trait]
    impl RiskAssessor for RawAssessor {
        async fn assess(&self, _input: &str, _agent: &str) -> FusionResult<RiskAssessment> {
            Ok(RiskAssessment {
                risk_score: self.0,
                rationale_notes: vec!["hand built".to_string()],
                open_questions: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn out_of_range_scores_are_clamped() {
        let route = |score: f64| async move {
            FallbackRouter::new(
                RoutingTable::default(),
                PatternRegistry::builtin(),
                Arc::new(RawAssessor(score)),
            )
            .route("hello", "vp_design")
            .await
        };

        let decision = route(f64::NAN).await;
        assert_eq!(decision.risk.risk_score, 0.0);
        assert!(decision.applied_pattern.is_none());
        assert_eq!(decision.risk.rationale_notes, vec!["hand built".to_string()]);

        let decision = route(7.5).await;
        assert_eq!(decision.risk.risk_score, 1.0);
        assert!(decision.applied_pattern.is_some());

        let decision = route(-2.0).await;
        assert_eq!(decision.risk.risk_score, 0.0);
        assert_eq!(decision.effective_input, "hello");
    }

    #[tokio::test]
    async fn assessor_failure_counts_as_safe() {
        let router = FallbackRouter::new(
            RoutingTable::default(),
            PatternRegistry::builtin(),
            Arc::new(FailingAssessor),
        );
        let decision = router.route("hello", "vp_design").await;
        assert_eq!(decision.effective_input, "hello");
        assert_eq!(decision.risk.risk_score, 0.0);
        assert!(decision.risk.rationale_notes[0].contains("model offline"));
    }

    #[tokio::test]
    async fn trigger_matching_overrides_configured_pattern() {
        let router = FallbackRouter::new(
            RoutingTable::default(),
            PatternRegistry::builtin(),
            Arc::new(TableRiskAssessor::new(0.9)),
        )
        .with_trigger_matching(true);

        let decision = router
            .route("tell the executive leadership", "vp_design")
            .await;
        assert_eq!(
            decision.applied_pattern.as_deref(),
            Some("fallback_soften_for_exec")
        );

        // No trigger hits: configured pattern stays.
        let decision = router.route("hello", "vp_design").await;
        assert_eq!(
            decision.applied_pattern.as_deref(),
            Some("fallback_clarify_then_critique")
        );
    }

    #[test]
    fn routing_document_field_names() {
        let table: RoutingTable = serde_json::from_str(
            r#"{"risk_threshold": 0.5, "default_pattern": "fallback_safe_design",
                "pattern_routing": {"a": "fallback_user_centric"}}"#,
        )
        .unwrap();
        assert_eq!(table.risk_threshold, 0.5);
        assert_eq!(table.default_pattern, "fallback_safe_design");
        assert_eq!(table.pattern_for("a"), "fallback_user_centric");
        assert_eq!(table.pattern_for("b"), "fallback_safe_design");

        let json = serde_json::to_value(&table).unwrap();
        assert_eq!(json["default_fallback_agent"], "fallback_safe_design");
    }

    #[test]
    fn routing_document_defaults_missing_fields() {
        let table: RoutingTable = serde_json::from_str("{}").unwrap();
        assert_eq!(table, RoutingTable::default());
    }
}
