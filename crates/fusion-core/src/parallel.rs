//! Parallel fan-out with optional evaluator ranking.
//!
//! Every requested agent gets the same input in its own task. A semaphore
//! caps how many run at once. Failures, panics and timeouts stay inside the
//! failing agent's result; siblings always finish.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use regex::Regex;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::domain::{
    AgentDescriptor, AgentRegistry, AgentResult, ParallelExecutionResult, RiskAssessment,
};
use crate::invocation::{unrouted_failure, Invoker};
use crate::obs;
use crate::routing::RouteDecision;

pub const DEFAULT_MAX_CONCURRENT: usize = 8;

/// Score given when the evaluator's reply carries no readable score.
pub const DEFAULT_SCORE: f64 = 0.5;

const SCORE_PATTERN: &str = r"(?i)score:\s*([0-9]*\.?[0-9]+)";

#[derive(Debug, Clone)]
pub struct ParallelConfig {
    pub max_concurrent: usize,
    /// Prefix each agent's input with its recent memory.
    pub include_memory_context: bool,
    /// Memory entries used for that prefix.
    pub context_entries: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            include_memory_context: false,
            context_entries: 5,
        }
    }
}

pub struct ParallelOrchestrator {
    invoker: Invoker,
    config: ParallelConfig,
}

impl ParallelOrchestrator {
    pub fn new(invoker: Invoker) -> Self {
        Self {
            invoker,
            config: ParallelConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ParallelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn invoker(&self) -> &Invoker {
        &self.invoker
    }

    pub async fn execute_parallel(
        &self,
        input: &str,
        agent_names: &[String],
        registry: &AgentRegistry,
        evaluator: Option<&AgentDescriptor>,
    ) -> ParallelExecutionResult {
        self.execute_parallel_with_cancel(
            input,
            agent_names,
            registry,
            evaluator,
            CancellationToken::new(),
        )
        .await
    }

    /// Fan out `input` to `agent_names`, stopping early when `cancel` fires.
    ///
    /// Duplicate names run once. Unregistered names are skipped. On
    /// cancellation finished results are kept and the rest are reported as
    /// failed with the error `cancelled`; evaluation is skipped.
    #[instrument(skip_all, fields(agents = agent_names.len()))]
    pub async fn execute_parallel_with_cancel(
        &self,
        input: &str,
        agent_names: &[String],
        registry: &AgentRegistry,
        evaluator: Option<&AgentDescriptor>,
        cancel: CancellationToken,
    ) -> ParallelExecutionResult {
        let clock = Instant::now();
        let agents = resolve_agents(agent_names, registry);
        if agents.is_empty() {
            debug!("no registered agents requested");
            return ParallelExecutionResult::empty(input);
        }

        let results = self.fan_out(input, &agents, &cancel).await;

        let scores = match evaluator {
            Some(evaluator) if !cancel.is_cancelled() => {
                self.evaluate(evaluator, input, &results).await
            }
            _ => None,
        };
        let evaluated = scores.is_some();
        let evaluation_scores = scores.unwrap_or_default();
        let ranked = rank(&results, evaluated.then_some(&evaluation_scores));

        let telemetry = self.invoker.telemetry();
        for (agent_name, score) in &evaluation_scores {
            telemetry.log_evaluation(agent_name, *score).await;
        }

        let total_duration_ms = clock.elapsed().as_millis() as u64;
        telemetry
            .log_parallel(input, &results, total_duration_ms)
            .await;
        obs::emit_parallel_finished(
            results.len(),
            results.iter().filter(|r| r.success).count(),
            evaluated,
            total_duration_ms,
        );

        ParallelExecutionResult {
            input_text: input.to_string(),
            results,
            ranked,
            evaluation_scores,
            evaluated,
            total_duration_ms,
        }
    }

    /// Run every agent in its own task and collect results in request order.
    async fn fan_out(
        &self,
        input: &str,
        agents: &[AgentDescriptor],
        cancel: &CancellationToken,
    ) -> Vec<AgentResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut tasks = JoinSet::new();

        for (index, agent) in agents.iter().cloned().enumerate() {
            let invoker = self.invoker.clone();
            let semaphore = Arc::clone(&semaphore);
            let config = self.config.clone();
            let input = input.to_string();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                if !config.include_memory_context {
                    return (index, invoker.run(&agent, &input).await);
                }
                // The agent sees its history; results and records keep the raw input.
                let request =
                    with_memory_context(&invoker, agent.name(), &input, config.context_entries)
                        .await;
                let decision = invoker.route(&request, agent.name()).await;
                let result = invoker.invoke(&agent, &input, decision).await;
                invoker.record(&result).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<AgentResult>> = vec![None; agents.len()];
        let mut cancelled = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    cancelled = true;
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => collect(&mut slots, joined),
                    None => break,
                },
            }
        }
        // Tasks that finished before the abort still hand back their result.
        while let Some(joined) = tasks.join_next().await {
            collect(&mut slots, joined);
        }

        let reason = if cancelled { "cancelled" } else { "task aborted" };
        let mut results = Vec::with_capacity(agents.len());
        for (slot, agent) in slots.into_iter().zip(agents) {
            match slot {
                Some(result) => results.push(result),
                None => {
                    let result = unrouted_failure(agent.name(), input, reason);
                    self.invoker.telemetry().log_invocation(&result).await;
                    results.push(result);
                }
            }
        }
        results
    }

    /// Score each successful result. `None` if any evaluator call fails.
    async fn evaluate(
        &self,
        evaluator: &AgentDescriptor,
        input: &str,
        results: &[AgentResult],
    ) -> Option<BTreeMap<String, f64>> {
        if !results.iter().any(|r| r.success) {
            return None;
        }

        let mut scores = BTreeMap::new();
        for result in results.iter().filter(|r| r.success) {
            let prompt = evaluation_prompt(input, &result.agent_name, &result.output_text);
            let decision = RouteDecision {
                effective_input: prompt.clone(),
                applied_pattern: None,
                risk: RiskAssessment::none(),
            };
            let verdict = self.invoker.invoke(evaluator, &prompt, decision).await;
            if !verdict.success {
                warn!(
                    evaluator = %evaluator.name(),
                    agent = %result.agent_name,
                    error = verdict.error.as_deref().unwrap_or_default(),
                    "evaluation failed, returning unscored ranking"
                );
                return None;
            }
            scores.insert(result.agent_name.clone(), parse_score(&verdict.output_text));
        }
        Some(scores)
    }
}

impl std::fmt::Debug for ParallelOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn collect(
    slots: &mut [Option<AgentResult>],
    joined: Result<(usize, AgentResult), tokio::task::JoinError>,
) {
    match joined {
        Ok((index, result)) => slots[index] = Some(result),
        Err(e) if e.is_cancelled() => {}
        Err(e) => warn!(error = %e, "parallel agent task ended abnormally"),
    }
}

fn resolve_agents(agent_names: &[String], registry: &AgentRegistry) -> Vec<AgentDescriptor> {
    let mut seen = HashSet::new();
    let mut agents = Vec::new();
    for name in agent_names {
        if !seen.insert(name.as_str()) {
            continue;
        }
        match registry.get(name) {
            Some(agent) => agents.push(agent.clone()),
            None => warn!(agent = %name, "agent not registered, skipping"),
        }
    }
    agents
}

async fn with_memory_context(
    invoker: &Invoker,
    agent_name: &str,
    input: &str,
    entries: usize,
) -> String {
    let context = invoker.memory().context(agent_name, entries).await;
    if context.is_empty() {
        input.to_string()
    } else {
        format!("{context}\n\nCurrent Request: {input}")
    }
}

pub fn evaluation_prompt(original_input: &str, agent_name: &str, output: &str) -> String {
    format!(
        "Evaluate this agent output:\n\n\
         Original Input: {original_input}\n\
         Agent: {agent_name}\n\
         Output: {output}\n\n\
         Provide a score (0-1) and brief evaluation."
    )
}

/// First `score: <number>` in the reply, clamped to `[0, 1]`.
pub fn parse_score(text: &str) -> f64 {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| Regex::new(SCORE_PATTERN).expect("score pattern compiles"));
    pattern
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|s| s.clamp(0.0, 1.0))
        .unwrap_or(DEFAULT_SCORE)
}

/// Best first when scored: by score descending, ties in invocation order,
/// unscored results after. Unscored batches keep invocation order.
fn rank(results: &[AgentResult], scores: Option<&BTreeMap<String, f64>>) -> Vec<AgentResult> {
    let Some(scores) = scores else {
        return results.to_vec();
    };
    let (mut scored, unscored): (Vec<&AgentResult>, Vec<&AgentResult>) = results
        .iter()
        .partition(|r| scores.contains_key(&r.agent_name));
    scored.sort_by(|a, b| {
        let (sa, sb) = (scores[&a.agent_name], scores[&b.agent_name]);
        sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.into_iter().chain(unscored).cloned().collect()
}
