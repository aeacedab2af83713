//! Fallback pattern library.
//!
//! A pattern is a prompt preamble prepended to risky input. The built-in set
//! can be overlaid with templates loaded from a configuration document.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Pattern used when nothing more specific applies.
pub const DEFAULT_PATTERN: &str = "fallback_systematic";

/// One named fallback pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEntry {
    pub name: String,
    pub template: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub triggers: Vec<String>,
}

impl PatternEntry {
    fn builtin(name: &str, template: &str, description: &str, triggers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            template: template.to_string(),
            description: description.to_string(),
            triggers: triggers.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Number of this pattern's triggers found in already-lowercased text.
    fn hits(&self, lowered: &str) -> usize {
        self.triggers
            .iter()
            .filter(|t| lowered.contains(t.as_str()))
            .count()
    }
}

/// Ordered set of patterns. Order decides ties in trigger matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternRegistry {
    entries: Vec<PatternEntry>,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl PatternRegistry {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The ten stock patterns.
    pub fn builtin() -> Self {
        let entries = vec![
            PatternEntry::builtin(
                "fallback_clarify_then_critique",
                "First clarify ambiguous terms. Then critique the design proposal step by step.",
                "Used when input contains ambiguous terms. First clarifies, then provides structured critique.",
                &["ambiguous", "unclear", "vague", "confusing"],
            ),
            PatternEntry::builtin(
                "fallback_metric_narrative",
                "Evaluate this with accessibility, hierarchy, and visual clarity scores, then explain each.",
                "Used for evaluative tasks. Provides quantitative scores with narrative explanations.",
                &["evaluate", "assess", "score", "rate", "measure"],
            ),
            PatternEntry::builtin(
                "fallback_soften_for_exec",
                "Rewrite this in a way that sounds less critical and more executive-friendly.",
                "Used for executive-sensitive content. Rewrites to be less critical and more business-friendly.",
                &["executive", "leadership", "stakeholder", "business"],
            ),
            PatternEntry::builtin(
                "fallback_safe_design",
                "Propose only minimal, conservative improvements to avoid unintended harm.",
                "Used when risk is high. Proposes only conservative, safe improvements.",
                &["risk", "danger", "harm", "safety", "conservative"],
            ),
            PatternEntry::builtin(
                "fallback_user_centric",
                "Focus on user needs and accessibility in all recommendations.",
                "Used for user experience tasks. Prioritizes user needs and accessibility.",
                &["user", "accessibility", "inclusive", "experience"],
            ),
            PatternEntry::builtin(
                "fallback_systematic",
                "Use systematic methodology with clear steps and reasoning.",
                "Used for complex tasks. Provides structured, step-by-step methodology.",
                &["complex", "systematic", "methodical", "structured"],
            ),
            PatternEntry::builtin(
                "fallback_creative_safe",
                "Provide creative solutions while maintaining safety and accessibility standards.",
                "Used for creative tasks with high risk. Balances creativity with safety.",
                &["creative", "innovative", "artistic", "design"],
            ),
            PatternEntry::builtin(
                "fallback_technical_clarity",
                "Explain technical concepts clearly and provide implementation guidance.",
                "Used for technical tasks. Ensures clear technical communication.",
                &["technical", "implementation", "code", "system"],
            ),
            PatternEntry::builtin(
                "fallback_strategic_alignment",
                "Align recommendations with business strategy and stakeholder needs.",
                "Used for strategic tasks. Aligns with business objectives.",
                &["strategy", "business", "market", "competitive"],
            ),
            PatternEntry::builtin(
                "fallback_innovation_balanced",
                "Balance innovation with proven design patterns and user expectations.",
                "Used for innovative tasks. Balances innovation with proven patterns.",
                &["innovation", "new", "novel", "cutting-edge"],
            ),
        ];
        Self { entries }
    }

    /// Registry holding only the given templates, in name order.
    pub fn from_templates(templates: &BTreeMap<String, String>) -> Self {
        let mut registry = Self::empty();
        registry.merge(templates);
        registry
    }

    fn get(&self, name: &str) -> Option<&PatternEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn template(&self, name: &str) -> Option<&str> {
        self.get(name).map(|e| e.template.as_str())
    }

    pub fn describe(&self, name: &str) -> Option<&str> {
        self.get(name)
            .map(|e| e.description.as_str())
            .filter(|d| !d.is_empty())
    }

    pub fn triggers(&self, name: &str) -> &[String] {
        self.get(name).map(|e| e.triggers.as_slice()).unwrap_or(&[])
    }

    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pattern whose triggers appear most often in `input`.
    ///
    /// Matching is a case-insensitive substring test. The earliest pattern wins
    /// a tie; no hits at all yields [`DEFAULT_PATTERN`].
    pub fn find_by_triggers(&self, input: &str) -> &str {
        let lowered = input.to_lowercase();
        let mut best = DEFAULT_PATTERN;
        let mut best_hits = 0;
        for entry in &self.entries {
            let hits = entry.hits(&lowered);
            if hits > best_hits {
                best_hits = hits;
                best = entry.name.as_str();
            }
        }
        best
    }

    /// Overlay templates: existing entries get the new text, unknown names
    /// are appended without description or triggers.
    pub fn merge(&mut self, templates: &BTreeMap<String, String>) {
        for (name, template) in templates {
            match self.entries.iter_mut().find(|e| &e.name == name) {
                Some(entry) => entry.template = template.clone(),
                None => self.entries.push(PatternEntry {
                    name: name.clone(),
                    template: template.clone(),
                    description: String::new(),
                    triggers: Vec::new(),
                }),
            }
        }
    }
}

/// Stock agent to pattern assignments.
pub fn default_agent_patterns() -> BTreeMap<String, String> {
    [
        ("vp_design", "fallback_clarify_then_critique"),
        ("evaluator", "fallback_metric_narrative"),
        ("creative_director", "fallback_soften_for_exec"),
        ("design_technologist", "fallback_safe_design"),
        ("product_navigator", "fallback_user_centric"),
        ("strategy_pilot", "fallback_systematic"),
        ("vp_of_design", "fallback_soften_for_exec"),
        ("vp_of_product", "fallback_soften_for_exec"),
        ("principal_designer", "fallback_clarify_then_critique"),
        ("component_librarian", "fallback_safe_design"),
        ("content_designer", "fallback_user_centric"),
        ("ai_interaction_designer", "fallback_safe_design"),
        ("strategy_archivist", "fallback_systematic"),
        ("market_analyst", "fallback_metric_narrative"),
        ("workflow_optimizer", "fallback_systematic"),
        ("product_historian", "fallback_systematic"),
        ("deck_narrator", "fallback_soften_for_exec"),
        ("portfolio_editor", "fallback_user_centric"),
        ("research_summarizer", "fallback_systematic"),
        ("feedback_amplifier", "fallback_metric_narrative"),
        ("prompt_master", "fallback_systematic"),
        ("dispatcher", "fallback_systematic"),
    ]
    .into_iter()
    .map(|(agent, pattern)| (agent.to_string(), pattern.to_string()))
    .collect()
}
