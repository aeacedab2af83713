//! Chain executor behaviour: piping, skips, aborts and recording.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use fusion_core::{
    AbortReason, AgentDescriptor, AgentMemory, AgentOutput, AgentRegistry, ChainConfig,
    ChainDefinitions, ChainExecutor, EventKind, FallbackRouter, FnAgent, FusionError, Invoker,
    PatternRegistry, RoutingTable, TableRiskAssessor, TelemetryLogger,
};

fn agent<F, Fut>(name: &str, f: F) -> AgentDescriptor
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<AgentOutput>> + Send + 'static,
{
    AgentDescriptor::new(Arc::new(FnAgent::new(name, f)))
}

fn registry() -> AgentRegistry {
    let mut registry = AgentRegistry::new();
    registry
        .register(agent("upper", |input: String| async move {
            Ok(AgentOutput::new(input.to_uppercase()).with_confidence(0.9))
        }))
        .unwrap();
    registry
        .register(agent("exclaim", |input: String| async move {
            Ok(AgentOutput::new(format!("{input}!")).with_confidence(0.7))
        }))
        .unwrap();
    registry
        .register(agent("broken", |_input: String| async move {
            Err::<AgentOutput, _>(anyhow::anyhow!("model refused"))
        }))
        .unwrap();
    registry
}

fn chains(entries: &[(&str, &[&str])]) -> ChainDefinitions {
    let mut defs = ChainDefinitions::empty();
    for (name, agents) in entries {
        defs.insert(*name, agents.iter().map(|a| a.to_string()).collect());
    }
    defs
}

fn executor(defs: ChainDefinitions) -> ChainExecutor {
    ChainExecutor::new(defs, Invoker::default())
}

fn risky_executor(defs: ChainDefinitions, agent: &str, risk: f64) -> ChainExecutor {
    let router = FallbackRouter::new(
        RoutingTable::default(),
        PatternRegistry::builtin(),
        Arc::new(TableRiskAssessor::new(0.0).with_score(agent, risk)),
    );
    let invoker = Invoker::new(
        router,
        Arc::new(TelemetryLogger::new("chain-test")),
        Arc::new(AgentMemory::new(3)),
    );
    ChainExecutor::new(defs, invoker)
}

#[tokio::test]
async fn hello_becomes_hello_bang() {
    let exec = executor(chains(&[("shout", &["upper", "exclaim"])]));
    let result = exec.execute_chain("shout", "hello", &registry()).await.unwrap();

    assert!(!result.aborted);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.steps[0].output_text, "HELLO");
    assert_eq!(result.steps[1].output_text, "HELLO!");
    assert_eq!(result.final_output(), "HELLO!");
    assert_eq!(result.original_input, "hello");
}

#[tokio::test]
async fn each_step_consumes_previous_output() {
    let exec = executor(chains(&[(
        "long",
        &["upper", "exclaim", "exclaim", "upper", "exclaim"],
    )]));
    let result = exec.execute_chain("long", "abc", &registry()).await.unwrap();

    assert_eq!(result.steps.len(), 5);
    assert_eq!(result.steps[0].input_text, "abc");
    for pair in result.steps.windows(2) {
        assert_eq!(pair[1].input_text, pair[0].output_text);
    }
    assert_eq!(result.final_output(), "ABC!!!");
}

#[tokio::test]
async fn unknown_chain_is_an_error() {
    let exec = executor(ChainDefinitions::builtin());
    let err = exec
        .execute_chain("no_such_chain", "x", &registry())
        .await
        .unwrap_err();
    match err {
        FusionError::ChainNotFound { name, available } => {
            assert_eq!(name, "no_such_chain");
            assert!(available.contains("design_pipeline"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn missing_agent_is_skipped_by_default() {
    let exec = executor(chains(&[("gappy", &["upper", "ghost", "exclaim"])]));
    let result = exec.execute_chain("gappy", "hi", &registry()).await.unwrap();

    assert!(!result.aborted);
    assert_eq!(result.skipped_agents, vec!["ghost".to_string()]);
    assert_eq!(result.steps.len(), 2);
    assert_eq!(result.final_output(), "HI!");
}

#[tokio::test]
async fn missing_agent_aborts_when_configured() {
    let exec = executor(chains(&[("gappy", &["upper", "ghost", "exclaim"])])).with_config(
        ChainConfig {
            abort_on_missing_agent: true,
            ..ChainConfig::default()
        },
    );
    let result = exec.execute_chain("gappy", "hi", &registry()).await.unwrap();

    assert!(result.aborted);
    assert_eq!(result.abort_reason, Some(AbortReason::AgentNotRegistered));
    assert_eq!(result.steps.len(), 1);
}

#[tokio::test]
async fn agent_error_stops_the_chain() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut registry = registry();
    let counter = Arc::clone(&calls);
    registry
        .register(agent("counted", move |input: String| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(AgentOutput::new(input))
            }
        }))
        .unwrap();

    let exec = executor(chains(&[("fragile", &["upper", "broken", "counted"])]));
    let result = exec.execute_chain("fragile", "hi", &registry).await.unwrap();

    assert!(result.aborted);
    assert_eq!(result.abort_reason, Some(AbortReason::AgentError));
    assert_eq!(result.steps.len(), 2);
    assert!(!result.steps[1].success);
    assert!(result.steps[1]
        .error
        .as_deref()
        .unwrap()
        .contains("model refused"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(result.final_output(), "HI");
}

#[tokio::test]
async fn hard_stop_aborts_after_recording_the_step() {
    let defs = chains(&[("risky", &["upper", "exclaim", "upper"])]);
    let exec = risky_executor(defs, "exclaim", 0.95);
    let result = exec.execute_chain("risky", "hi", &registry()).await.unwrap();

    assert!(result.aborted);
    assert_eq!(result.abort_reason, Some(AbortReason::RiskExceeded));
    assert_eq!(result.steps.len(), 2);
    let risky = &result.steps[1];
    assert_eq!(risky.risk.risk_score, 0.95);
    // Above the routing threshold too, so the agent saw a fallback preamble.
    assert_eq!(risky.fallback_applied.as_deref(), Some("fallback_systematic"));
    assert_eq!(risky.input_text, "HI");
    assert!(risky.effective_input.ends_with("\n\nHI"));

    let events = exec.invoker().telemetry().events().await;
    assert_eq!(events.len(), 2);
}

#[tokio::test]
async fn hard_stop_can_skip_the_risky_call() {
    let defs = chains(&[("risky", &["upper", "exclaim", "upper"])]);
    let exec = risky_executor(defs, "exclaim", 0.95).with_config(ChainConfig {
        skip_on_hard_stop: true,
        ..ChainConfig::default()
    });
    let result = exec.execute_chain("risky", "hi", &registry()).await.unwrap();

    assert!(result.aborted);
    assert_eq!(result.abort_reason, Some(AbortReason::RiskExceeded));
    assert_eq!(result.steps.len(), 1);

    // The blocked attempt is still visible in telemetry, but not in memory.
    let events = exec.invoker().telemetry().events().await;
    assert_eq!(events.len(), 2);
    assert!(!events[1].success);
    assert!(exec.invoker().memory().recent("exclaim", 5).await.is_empty());
}

#[tokio::test]
async fn risk_at_threshold_does_not_stop() {
    let defs = chains(&[("edge", &["upper", "exclaim"])]);
    let exec = risky_executor(defs, "exclaim", 0.9);
    let result = exec.execute_chain("edge", "hi", &registry()).await.unwrap();
    assert!(!result.aborted);
    assert_eq!(result.steps.len(), 2);
}

#[tokio::test]
async fn every_invocation_is_recorded() {
    let exec = executor(chains(&[("fragile", &["upper", "broken"])]));
    exec.execute_chain("fragile", "hi", &registry()).await.unwrap();

    let events = exec.invoker().telemetry().events().await;
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.kind == EventKind::Single));
    assert!(events[0].success);
    assert!(!events[1].success);

    let memory = exec.invoker().memory();
    assert_eq!(memory.recent("upper", 5).await[0].output_text, "HI");
    let failed = &memory.recent("broken", 5).await[0];
    assert!(!failed.metadata.success);
    assert!(failed.output_text.starts_with("Error: "));
}

#[tokio::test]
async fn history_keeps_last_hundred_runs() {
    let exec = executor(chains(&[("one", &["upper"])]));
    let registry = registry();
    for i in 0..105 {
        exec.execute_chain("one", &format!("run {i}"), &registry)
            .await
            .unwrap();
    }
    let history = exec.history().await;
    assert_eq!(history.len(), 100);
    assert_eq!(history[0].original_input, "run 5");
    assert_eq!(history[99].original_input, "run 104");

    exec.clear_history().await;
    assert!(exec.history().await.is_empty());
}

#[tokio::test]
async fn ad_hoc_sequence_runs_without_definition() {
    let exec = executor(ChainDefinitions::empty());
    let agents = vec!["exclaim".to_string(), "exclaim".to_string()];
    let result = exec
        .execute_sequence("adhoc", &agents, "wow", &registry())
        .await;
    assert_eq!(result.chain_name, "adhoc");
    assert_eq!(result.final_output(), "wow!!");
}
