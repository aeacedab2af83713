//! Sequential chain execution.
//!
//! A chain is a named, ordered list of agents. Each step receives the
//! previous step's output. The run stops at the first failure or at a hard
//! stop on risk, and returns whatever steps completed.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{instrument, warn, Instrument};

use crate::config;
use crate::domain::{
    AbortReason, AgentRegistry, ChainExecutionResult, FusionError, FusionResult,
};
use crate::invocation::{failed_result, Invoker};
use crate::metrics::METRICS;
use crate::obs;

/// Risk above this stops a chain.
pub const DEFAULT_HARD_STOP_THRESHOLD: f64 = 0.9;

/// Completed runs kept by [`ChainExecutor::history`].
pub const HISTORY_LIMIT: usize = 100;

/// Named agent sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainDefinitions {
    chains: BTreeMap<String, Vec<String>>,
}

impl Default for ChainDefinitions {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ChainDefinitions {
    pub fn empty() -> Self {
        Self {
            chains: BTreeMap::new(),
        }
    }

    /// The stock chains.
    pub fn builtin() -> Self {
        let chains = [
            ("design_pipeline", ["vp_design", "evaluator", "rewrite_loop"]),
            ("narrative_loop", ["deck_narrator", "surprisal_critic", "rewrite_loop"]),
            ("strategy_chain", ["strategy_pilot", "market_analyst", "creative_director"]),
            ("content_flow", ["content_designer", "voice_match_evaluator", "rewrite_advisor"]),
            (
                "product_journey",
                ["product_navigator", "user_experience_analyst", "design_technologist"],
            ),
        ]
        .into_iter()
        .map(|(name, agents)| {
            (
                name.to_string(),
                agents.iter().map(|a| a.to_string()).collect(),
            )
        })
        .collect();
        Self { chains }
    }

    pub fn load(path: &Path) -> FusionResult<Self> {
        config::load_document(path)
    }

    /// Write as JSON or TOML, by extension.
    pub fn save(&self, path: &Path) -> FusionResult<()> {
        config::save_document(path, self)
    }

    pub fn names(&self) -> Vec<String> {
        self.chains.keys().cloned().collect()
    }

    pub fn agents(&self, chain_name: &str) -> Option<&[String]> {
        self.chains.get(chain_name).map(Vec::as_slice)
    }

    /// Add or replace a chain, returning the previous agent list.
    pub fn insert(
        &mut self,
        chain_name: impl Into<String>,
        agents: Vec<String>,
    ) -> Option<Vec<String>> {
        self.chains.insert(chain_name.into(), agents)
    }

    pub fn remove(&mut self, chain_name: &str) -> Option<Vec<String>> {
        self.chains.remove(chain_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.chains.iter()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub hard_stop_threshold: f64,
    /// Stop the chain, instead of skipping, when an agent is not registered.
    pub abort_on_missing_agent: bool,
    /// On a hard stop, abort before calling the agent rather than after.
    pub skip_on_hard_stop: bool,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            hard_stop_threshold: DEFAULT_HARD_STOP_THRESHOLD,
            abort_on_missing_agent: false,
            skip_on_hard_stop: false,
        }
    }
}

/// Runs chains against an agent registry.
pub struct ChainExecutor {
    definitions: ChainDefinitions,
    invoker: Invoker,
    config: ChainConfig,
    history: Mutex<VecDeque<ChainExecutionResult>>,
}

impl ChainExecutor {
    pub fn new(definitions: ChainDefinitions, invoker: Invoker) -> Self {
        Self {
            definitions,
            invoker,
            config: ChainConfig::default(),
            history: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_config(mut self, config: ChainConfig) -> Self {
        self.config = config;
        self
    }

    pub fn definitions(&self) -> &ChainDefinitions {
        &self.definitions
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    /// Run the chain called `chain_name`.
    ///
    /// Unknown chain names are the only error. Agent failures, missing
    /// agents and risk stops all come back inside the result.
    #[instrument(skip(self, initial_input, registry))]
    pub async fn execute_chain(
        &self,
        chain_name: &str,
        initial_input: &str,
        registry: &AgentRegistry,
    ) -> FusionResult<ChainExecutionResult> {
        let agents = self
            .definitions
            .agents(chain_name)
            .ok_or_else(|| FusionError::ChainNotFound {
                name: chain_name.to_string(),
                available: self.definitions.names().join(", "),
            })?
            .to_vec();

        Ok(self
            .execute_sequence(chain_name, &agents, initial_input, registry)
            .await)
    }

    /// Run an ad hoc agent sequence under `label`.
    pub async fn execute_sequence(
        &self,
        label: &str,
        agents: &[String],
        initial_input: &str,
        registry: &AgentRegistry,
    ) -> ChainExecutionResult {
        let result = self
            .run_steps(label, agents, initial_input, registry)
            .instrument(obs::chain_span(label))
            .await;

        let mut history = self.history.lock().await;
        history.push_back(result.clone());
        while history.len() > HISTORY_LIMIT {
            history.pop_front();
        }
        result
    }

    async fn run_steps(
        &self,
        chain_name: &str,
        agents: &[String],
        initial_input: &str,
        registry: &AgentRegistry,
    ) -> ChainExecutionResult {
        let clock = Instant::now();
        obs::emit_chain_started(chain_name, agents.len());

        let mut steps = Vec::with_capacity(agents.len());
        let mut skipped_agents = Vec::new();
        let mut abort_reason = None;
        let mut current = initial_input.to_string();

        for agent_name in agents {
            let Some(agent) = registry.get(agent_name) else {
                skipped_agents.push(agent_name.clone());
                if self.config.abort_on_missing_agent {
                    abort_reason = Some(AbortReason::AgentNotRegistered);
                    obs::emit_chain_aborted(chain_name, agent_name, AbortReason::AgentNotRegistered);
                    break;
                }
                warn!(chain = %chain_name, agent = %agent_name, "agent not registered, skipping");
                continue;
            };

            let decision = self.invoker.route(&current, agent_name).await;
            let risk_score = decision.risk.risk_score;
            let hard_stop = risk_score > self.config.hard_stop_threshold;

            if hard_stop && self.config.skip_on_hard_stop {
                let attempt = failed_result(
                    agent_name,
                    &current,
                    decision,
                    format!(
                        "risk {risk_score:.2} exceeds hard stop {:.2}",
                        self.config.hard_stop_threshold
                    ),
                    Utc::now(),
                    0,
                );
                self.invoker.telemetry().log_invocation(&attempt).await;
                abort_reason = Some(AbortReason::RiskExceeded);
                obs::emit_chain_aborted(chain_name, agent_name, AbortReason::RiskExceeded);
                break;
            }

            let result = self.invoker.invoke(agent, &current, decision).await;
            self.invoker.record(&result).await;
            obs::emit_step_finished(
                chain_name,
                agent_name,
                result.success,
                result.execution_time_ms,
            );

            let success = result.success;
            let output = result.output_text.clone();
            steps.push(result);

            let reason = if hard_stop {
                Some(AbortReason::RiskExceeded)
            } else if !success {
                Some(AbortReason::AgentError)
            } else {
                None
            };
            if let Some(reason) = reason {
                abort_reason = Some(reason);
                obs::emit_chain_aborted(chain_name, agent_name, reason);
                break;
            }

            current = output;
        }

        if abort_reason.is_some() {
            METRICS.inc_chains_aborted();
        }

        let total_duration_ms = clock.elapsed().as_millis() as u64;
        obs::emit_chain_finished(
            chain_name,
            steps.len(),
            skipped_agents.len(),
            total_duration_ms,
        );

        ChainExecutionResult {
            chain_name: chain_name.to_string(),
            original_input: initial_input.to_string(),
            steps,
            skipped_agents,
            aborted: abort_reason.is_some(),
            abort_reason,
            total_duration_ms,
        }
    }

    /// Most recent runs, oldest first, at most [`HISTORY_LIMIT`].
    pub async fn history(&self) -> Vec<ChainExecutionResult> {
        self.history.lock().await.iter().cloned().collect()
    }

    pub async fn clear_history(&self) {
        self.history.lock().await.clear();
    }
}

impl std::fmt::Debug for ChainExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainExecutor")
            .field("chains", &self.definitions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
