//! Structured lifecycle events for chains, batches and routing.
//!
//! Every emitter logs one event with an `event` field naming it, so log
//! pipelines can filter on `event = "chain.aborted"` and similar.

use tracing::{info, warn};

use crate::domain::AbortReason;

/// Span grouping everything logged while a chain runs.
///
/// Attach it with `tracing::Instrument` rather than entering it, so the
/// future stays `Send` across agent awaits.
///
/// ```ignore
/// run_steps(..).instrument(obs::chain_span("design_pipeline")).await
/// ```
pub fn chain_span(chain_name: &str) -> tracing::Span {
    tracing::info_span!("fusion.chain", chain = %chain_name)
}

pub fn emit_chain_started(chain_name: &str, agent_count: usize) {
    info!(event = "chain.started", chain = %chain_name, agents = agent_count);
}

pub fn emit_step_finished(chain_name: &str, agent_name: &str, success: bool, duration_ms: u64) {
    info!(
        event = "chain.step_finished",
        chain = %chain_name,
        agent = %agent_name,
        success = success,
        duration_ms = duration_ms,
    );
}

/// Logged at `warn` since an aborted chain returns partial output.
pub fn emit_chain_aborted(chain_name: &str, agent_name: &str, reason: AbortReason) {
    warn!(
        event = "chain.aborted",
        chain = %chain_name,
        agent = %agent_name,
        reason = %reason,
    );
}

pub fn emit_chain_finished(chain_name: &str, steps: usize, skipped: usize, duration_ms: u64) {
    info!(
        event = "chain.finished",
        chain = %chain_name,
        steps = steps,
        skipped = skipped,
        duration_ms = duration_ms,
    );
}

pub fn emit_parallel_finished(agents: usize, succeeded: usize, evaluated: bool, duration_ms: u64) {
    info!(
        event = "parallel.finished",
        agents = agents,
        succeeded = succeeded,
        evaluated = evaluated,
        duration_ms = duration_ms,
    );
}

pub fn emit_fallback_applied(agent_name: &str, pattern: &str, risk_score: f64) {
    info!(
        event = "routing.fallback_applied",
        agent = %agent_name,
        pattern = %pattern,
        risk = risk_score,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn events_inside_chain_span_carry_chain_name() {
        let span = chain_span("design_pipeline");
        let _entered = span.enter();
        emit_chain_started("design_pipeline", 3);
        assert!(logs_contain("chain.started"));
        assert!(logs_contain("design_pipeline"));
    }

    #[traced_test]
    #[test]
    fn abort_event_carries_reason() {
        emit_chain_aborted("design_pipeline", "evaluator", AbortReason::RiskExceeded);
        assert!(logs_contain("chain.aborted"));
        assert!(logs_contain("risk_exceeded"));
    }

    #[traced_test]
    #[test]
    fn fallback_event_names_pattern() {
        emit_fallback_applied("vp_design", "fallback_safe_design", 0.8);
        assert!(logs_contain("routing.fallback_applied"));
        assert!(logs_contain("fallback_safe_design"));
    }
}
