//! One agent invocation: route, call under a deadline, record.
//!
//! Chains and parallel batches both go through [`Invoker`], so fallback
//! routing, timeouts, panic capture and recording behave the same in either
//! mode.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde_json::Map;
use tracing::{debug, warn};

use crate::domain::{AgentDescriptor, AgentResult, RiskAssessment};
use crate::memory::{AgentMemory, MemoryEntry};
use crate::metrics::METRICS;
use crate::routing::{FallbackRouter, RouteDecision};
use crate::telemetry::TelemetryLogger;

pub const DEFAULT_INVOCATION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct InvocationConfig {
    /// Deadline per agent call. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_INVOCATION_TIMEOUT),
        }
    }
}

/// Shared invocation machinery. Cheap to clone into tasks.
#[derive(Debug, Clone)]
pub struct Invoker {
    router: FallbackRouter,
    telemetry: Arc<TelemetryLogger>,
    memory: Arc<AgentMemory>,
    config: InvocationConfig,
}

impl Default for Invoker {
    fn default() -> Self {
        Self::new(
            FallbackRouter::default(),
            Arc::new(TelemetryLogger::with_generated_id()),
            Arc::new(AgentMemory::default()),
        )
    }
}

impl Invoker {
    pub fn new(
        router: FallbackRouter,
        telemetry: Arc<TelemetryLogger>,
        memory: Arc<AgentMemory>,
    ) -> Self {
        Self {
            router,
            telemetry,
            memory,
            config: InvocationConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InvocationConfig) -> Self {
        self.config = config;
        self
    }

    pub fn router(&self) -> &FallbackRouter {
        &self.router
    }

    pub fn telemetry(&self) -> &Arc<TelemetryLogger> {
        &self.telemetry
    }

    pub fn memory(&self) -> &Arc<AgentMemory> {
        &self.memory
    }

    pub fn config(&self) -> &InvocationConfig {
        &self.config
    }

    pub async fn route(&self, input: &str, agent_name: &str) -> RouteDecision {
        self.router.route(input, agent_name).await
    }

    /// Call the agent with the routed input.
    ///
    /// Errors, panics and timeouts all come back as a failed [`AgentResult`];
    /// this never propagates a failure to the caller.
    pub async fn invoke(
        &self,
        agent: &AgentDescriptor,
        input_text: &str,
        decision: RouteDecision,
    ) -> AgentResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        METRICS.inc_invocations();

        let call = AssertUnwindSafe(agent.invoke(&decision.effective_input)).catch_unwind();
        let outcome = match self.config.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => Ok(Err(anyhow::anyhow!(
                    "timed out after {} ms",
                    limit.as_millis()
                ))),
            },
            None => call.await,
        };
        let elapsed_ms = clock.elapsed().as_millis() as u64;

        let error = match outcome {
            Ok(Ok(output)) => {
                debug!(agent = %agent.name(), elapsed_ms, "agent succeeded");
                return AgentResult {
                    agent_name: agent.name().to_string(),
                    input_text: input_text.to_string(),
                    effective_input: decision.effective_input,
                    output_text: output.output_text,
                    confidence: Some(output.confidence),
                    metadata: output.metadata,
                    success: true,
                    error: None,
                    execution_time_ms: elapsed_ms,
                    risk: decision.risk,
                    fallback_applied: decision.applied_pattern,
                    started_at,
                };
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => format!("agent panicked: {}", panic_message(panic.as_ref())),
        };

        warn!(agent = %agent.name(), error = %error, elapsed_ms, "agent invocation failed");
        METRICS.inc_failures();
        failed_result(agent.name(), input_text, decision, error, started_at, elapsed_ms)
    }

    /// Log the result to telemetry and memory.
    pub async fn record(&self, result: &AgentResult) {
        self.telemetry.log_invocation(result).await;
        self.memory
            .append(&result.agent_name, MemoryEntry::from_result(result))
            .await;
    }

    /// Route, invoke and record in one go.
    pub async fn run(&self, agent: &AgentDescriptor, input: &str) -> AgentResult {
        let decision = self.route(input, agent.name()).await;
        let result = self.invoke(agent, input, decision).await;
        self.record(&result).await;
        result
    }
}

/// Failed result for an invocation that errored or never ran.
pub(crate) fn failed_result(
    agent_name: &str,
    input_text: &str,
    decision: RouteDecision,
    error: String,
    started_at: DateTime<Utc>,
    execution_time_ms: u64,
) -> AgentResult {
    AgentResult {
        agent_name: agent_name.to_string(),
        input_text: input_text.to_string(),
        effective_input: decision.effective_input,
        output_text: String::new(),
        confidence: None,
        metadata: Map::new(),
        success: false,
        error: Some(error),
        execution_time_ms,
        risk: decision.risk,
        fallback_applied: decision.applied_pattern,
        started_at,
    }
}

/// Failed result for an agent that was never routed, e.g. a cancelled task.
pub(crate) fn unrouted_failure(agent_name: &str, input_text: &str, error: &str) -> AgentResult {
    let decision = RouteDecision {
        effective_input: input_text.to_string(),
        applied_pattern: None,
        risk: RiskAssessment::none(),
    };
    failed_result(agent_name, input_text, decision, error.to_string(), Utc::now(), 0)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
