//! Memory eviction, summary recomputation and the routing threshold.

use std::sync::Arc;

use fusion_core::{
    AgentDescriptor, AgentMemory, AgentOutput, FallbackRouter, FixedRiskAssessor, FnAgent,
    Invoker, PatternRegistry, RoutingTable, TelemetryLogger,
};
use fusion_state::fakes::MemoryHistoryStore;
use fusion_state::HistoryStore;

fn echo() -> AgentDescriptor {
    AgentDescriptor::new(Arc::new(FnAgent::new("echo", |input: String| async move {
        Ok(AgentOutput::new(input).with_confidence(0.5))
    })))
}

fn invoker_with_risk(score: f64, memory: Arc<AgentMemory>) -> Invoker {
    let router = FallbackRouter::new(
        RoutingTable::default(),
        PatternRegistry::builtin(),
        Arc::new(FixedRiskAssessor::new(score)),
    );
    Invoker::new(router, Arc::new(TelemetryLogger::new("mr")), memory)
}

#[tokio::test]
async fn eviction_keeps_most_recent_in_order() {
    let store = Arc::new(MemoryHistoryStore::new());
    let memory = Arc::new(AgentMemory::open(store.clone(), 4).await.unwrap());
    let invoker = invoker_with_risk(0.0, Arc::clone(&memory));
    let agent = echo();

    for i in 0..7 {
        invoker.run(&agent, &format!("msg {i}")).await;
    }

    let recent = memory.recent("echo", 100).await;
    let inputs: Vec<&str> = recent.iter().map(|e| e.input_text.as_str()).collect();
    assert_eq!(inputs, vec!["msg 6", "msg 5", "msg 4", "msg 3"]);

    let persisted = store.load_history("echo").await.unwrap().unwrap();
    let stored: Vec<&str> = persisted.history.iter().map(|h| h.input.as_str()).collect();
    assert_eq!(stored, vec!["msg 3", "msg 4", "msg 5", "msg 6"]);
    assert_eq!(persisted.summary.total_runs, 7);
    assert_eq!(persisted.summary.success_rate, 1.0);

    let hits = memory.search("echo", "MSG 5").await;
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn summary_recomputes_after_each_event() {
    let invoker = invoker_with_risk(0.7, Arc::new(AgentMemory::new(3)));
    let telemetry = invoker.telemetry();
    invoker.run(&echo(), "risky").await;

    let first = telemetry.summary().await;
    let repeat = telemetry.summary().await;
    assert_eq!(first, repeat);
    assert_eq!(
        serde_json::to_vec(&first).unwrap(),
        serde_json::to_vec(&repeat).unwrap()
    );
    assert_eq!(first.total_events, 1);
    assert_eq!(first.fallback_count, 1);
    assert_eq!(first.fallback_rate, 1.0);

    telemetry.log_evaluation("echo", 0.9).await;
    let second = telemetry.summary().await;
    assert_eq!(second.total_events, first.total_events + 1);
    assert_eq!(second.fallback_count, 1);
    assert_eq!(second.fallback_rate, 0.5);
    assert_eq!(second.evaluation_count, 1);
}

#[tokio::test]
async fn threshold_decides_rewriting() {
    let memory = Arc::new(AgentMemory::new(3));

    let calm = invoker_with_risk(0.50, Arc::clone(&memory));
    let result = calm.run(&echo(), "hello").await;
    assert_eq!(result.output_text, "hello");
    assert!(result.fallback_applied.is_none());

    let tense = invoker_with_risk(0.70, Arc::clone(&memory));
    let result = tense.run(&echo(), "hello").await;
    assert_eq!(result.fallback_applied.as_deref(), Some("fallback_systematic"));
    let template = PatternRegistry::builtin()
        .template("fallback_systematic")
        .unwrap()
        .to_string();
    assert_eq!(result.output_text, format!("{template}\n\nhello"));

    let insights = memory.insights("echo").await;
    assert_eq!(insights.total_runs, 2);
    assert_eq!(insights.fallback_rate, 0.5);
}
