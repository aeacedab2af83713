//! Parallel fan-out: fault isolation, ranking, cancellation, concurrency.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fusion_core::{
    AgentDescriptor, AgentMemory, AgentOutput, AgentRegistry, CancellationToken, EventKind,
    FallbackRouter, FnAgent, InvocationConfig, Invoker, ParallelConfig,
    ParallelOrchestrator, TelemetryLogger,
};

fn agent<F, Fut>(name: &str, f: F) -> AgentDescriptor
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<AgentOutput>> + Send + 'static,
{
    AgentDescriptor::new(Arc::new(FnAgent::new(name, f)))
}

fn echo(name: &str) -> AgentDescriptor {
    let tag = name.to_string();
    agent(name, move |input: String| {
        let tag = tag.clone();
        async move { Ok(AgentOutput::new(format!("{tag}: {input}")).with_confidence(0.8)) }
    })
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn orchestrator() -> ParallelOrchestrator {
    ParallelOrchestrator::new(Invoker::default())
}

/// Scores by agent name found in the evaluation prompt.
fn scripted_evaluator(scores: &[(&str, &str)]) -> AgentDescriptor {
    let scores: Vec<(String, String)> = scores
        .iter()
        .map(|(a, s)| (format!("Agent: {a}\n"), s.to_string()))
        .collect();
    agent("judge", move |prompt: String| {
        let reply = scores
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply.clone());
        async move {
            match reply {
                Some(reply) => Ok(AgentOutput::new(reply)),
                None => Err(anyhow::anyhow!("judge has no opinion")),
            }
        }
    })
}

#[tokio::test(start_paused = true)]
async fn failures_stay_with_the_failing_agent() {
    let mut registry = AgentRegistry::new();
    registry.register(echo("first")).unwrap();
    registry
        .register(agent("erroring", |_input: String| async move {
            Err::<AgentOutput, _>(anyhow::anyhow!("upstream 503"))
        }))
        .unwrap();
    registry
        .register(agent("panicking", |_input: String| async move {
            if true {
                panic!("index out of bounds");
            }
            Ok(AgentOutput::new("unreachable"))
        }))
        .unwrap();
    registry
        .register(agent("hanging", |_input: String| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(AgentOutput::new("too late"))
        }))
        .unwrap();
    registry.register(echo("last")).unwrap();

    let invoker = Invoker::default().with_config(InvocationConfig {
        timeout: Some(Duration::from_millis(500)),
    });
    let orch = ParallelOrchestrator::new(invoker);
    let requested = names(&["first", "erroring", "panicking", "hanging", "last"]);
    let result = orch.execute_parallel("ping", &requested, &registry, None).await;

    assert_eq!(result.results.len(), 5);
    let by_name = |n: &str| {
        result
            .results
            .iter()
            .find(|r| r.agent_name == n)
            .unwrap()
            .clone()
    };
    assert_eq!(by_name("first").output_text, "first: ping");
    assert_eq!(by_name("last").output_text, "last: ping");
    assert!(by_name("erroring").error.unwrap().contains("upstream 503"));
    assert!(by_name("panicking")
        .error
        .unwrap()
        .contains("index out of bounds"));
    assert!(by_name("hanging").error.unwrap().contains("timed out"));
    assert_eq!(result.successful().count(), 2);
}

#[tokio::test]
async fn results_keep_request_order_without_evaluator() {
    let mut registry = AgentRegistry::new();
    for name in ["c", "a", "b"] {
        registry.register(echo(name)).unwrap();
    }
    let result = orchestrator()
        .execute_parallel("x", &names(&["c", "a", "b"]), &registry, None)
        .await;

    let order: Vec<&str> = result.results.iter().map(|r| r.agent_name.as_str()).collect();
    assert_eq!(order, vec!["c", "a", "b"]);
    assert_eq!(result.ranked, result.results);
    assert!(!result.evaluated);
    assert!(result.evaluation_scores.is_empty());
}

#[tokio::test]
async fn duplicates_and_unknown_names_are_dropped() {
    let mut registry = AgentRegistry::new();
    registry.register(echo("a")).unwrap();
    registry.register(echo("b")).unwrap();

    let result = orchestrator()
        .execute_parallel("x", &names(&["a", "a", "ghost", "b"]), &registry, None)
        .await;
    let order: Vec<&str> = result.results.iter().map(|r| r.agent_name.as_str()).collect();
    assert_eq!(order, vec!["a", "b"]);
}

#[tokio::test]
async fn nothing_to_run_yields_empty_result() {
    let orch = orchestrator();
    let result = orch
        .execute_parallel("x", &names(&["ghost"]), &AgentRegistry::new(), None)
        .await;
    assert!(result.is_empty());
    assert!(result.top().is_none());
    assert_eq!(result.input_text, "x");
    assert!(orch.invoker().telemetry().is_empty().await);
}

#[tokio::test]
async fn evaluator_ranks_by_score() {
    let mut registry = AgentRegistry::new();
    for name in ["a", "b", "c"] {
        registry.register(echo(name)).unwrap();
    }
    let judge = scripted_evaluator(&[
        ("a", "Score: 0.4 decent"),
        ("b", "Score: 0.9 excellent"),
        ("c", "score: 0.4 decent"),
    ]);

    let orch = orchestrator();
    let requested = names(&["a", "b", "c"]);
    for _ in 0..3 {
        let result = orch
            .execute_parallel("task", &requested, &registry, Some(&judge))
            .await;
        assert!(result.evaluated);
        let order: Vec<&str> = result.ranked.iter().map(|r| r.agent_name.as_str()).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
        assert_eq!(result.top().unwrap().agent_name, "b");
        assert_eq!(result.evaluation_scores["b"], 0.9);
    }
}

#[tokio::test]
async fn failed_agents_are_not_scored() {
    let mut registry = AgentRegistry::new();
    registry.register(echo("good")).unwrap();
    registry
        .register(agent("bad", |_input: String| async move {
            Err::<AgentOutput, _>(anyhow::anyhow!("nope"))
        }))
        .unwrap();
    let judge = scripted_evaluator(&[("good", "Score: 0.7")]);

    let result = orchestrator()
        .execute_parallel("task", &names(&["bad", "good"]), &registry, Some(&judge))
        .await;
    assert!(result.evaluated);
    assert_eq!(result.evaluation_scores.len(), 1);
    let order: Vec<&str> = result.ranked.iter().map(|r| r.agent_name.as_str()).collect();
    assert_eq!(order, vec!["good", "bad"]);
}

#[tokio::test]
async fn evaluator_failure_leaves_batch_unscored() {
    let mut registry = AgentRegistry::new();
    for name in ["a", "b"] {
        registry.register(echo(name)).unwrap();
    }
    // No opinion on "b", so the second evaluation errors.
    let judge = scripted_evaluator(&[("a", "Score: 0.3")]);

    let result = orchestrator()
        .execute_parallel("task", &names(&["a", "b"]), &registry, Some(&judge))
        .await;
    assert!(!result.evaluated);
    assert!(result.evaluation_scores.is_empty());
    assert_eq!(result.ranked, result.results);
}

#[tokio::test]
async fn unreadable_score_falls_back_to_default() {
    let mut registry = AgentRegistry::new();
    registry.register(echo("a")).unwrap();
    let judge = scripted_evaluator(&[("a", "Pretty good overall.")]);

    let result = orchestrator()
        .execute_parallel("task", &names(&["a"]), &registry, Some(&judge))
        .await;
    assert_eq!(result.evaluation_scores["a"], 0.5);
}

#[tokio::test]
async fn telemetry_records_each_agent_evaluation_and_aggregate() {
    let mut registry = AgentRegistry::new();
    for name in ["a", "b"] {
        registry.register(echo(name)).unwrap();
    }
    let judge = scripted_evaluator(&[("a", "Score: 0.6"), ("b", "Score: 0.8")]);

    let orch = orchestrator();
    orch.execute_parallel("task", &names(&["a", "b"]), &registry, Some(&judge))
        .await;

    let events = orch.invoker().telemetry().events().await;
    let count = |kind: EventKind| events.iter().filter(|e| e.kind == kind).count();
    assert_eq!(count(EventKind::Single), 2);
    assert_eq!(count(EventKind::Evaluation), 2);
    assert_eq!(count(EventKind::Parallel), 1);

    let aggregate = events.last().unwrap();
    assert_eq!(aggregate.kind, EventKind::Parallel);
    assert_eq!(aggregate.output_excerpt, "2/2 agents succeeded");

    // The evaluator's own calls do not count as agent runs.
    assert!(orch.invoker().memory().recent("judge", 5).await.is_empty());
    assert_eq!(orch.invoker().memory().recent("a", 5).await.len(), 1);
}

#[tokio::test]
async fn concurrency_is_capped() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut registry = AgentRegistry::new();
    let mut requested = Vec::new();
    for i in 0..6 {
        let name = format!("worker_{i}");
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        registry
            .register(agent(&name, move |input: String| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(AgentOutput::new(input))
                }
            }))
            .unwrap();
        requested.push(name);
    }

    let orch = orchestrator().with_config(ParallelConfig {
        max_concurrent: 2,
        ..ParallelConfig::default()
    });
    let result = orch.execute_parallel("x", &requested, &registry, None).await;

    assert_eq!(result.successful().count(), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_keeps_finished_results() {
    let mut registry = AgentRegistry::new();
    registry.register(echo("quick")).unwrap();
    registry
        .register(agent("slow", |_input: String| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(AgentOutput::new("finally"))
        }))
        .unwrap();
    let judge = scripted_evaluator(&[("quick", "Score: 1.0")]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let orch = orchestrator();
    let result = orch
        .execute_parallel_with_cancel(
            "x",
            &names(&["quick", "slow"]),
            &registry,
            Some(&judge),
            cancel,
        )
        .await;

    assert_eq!(result.results.len(), 2);
    assert!(result.results[0].success);
    assert!(!result.results[1].success);
    assert_eq!(result.results[1].error.as_deref(), Some("cancelled"));
    assert!(!result.evaluated);

    let events = orch.invoker().telemetry().events().await;
    assert_eq!(
        events.iter().filter(|e| e.kind == EventKind::Single).count(),
        2
    );
}

#[tokio::test]
async fn agent_finishing_as_cancel_fires_keeps_its_result() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    let mut registry = AgentRegistry::new();
    registry
        .register(agent("fast", move |input: String| {
            let trigger = trigger.clone();
            async move {
                trigger.cancel();
                Ok(AgentOutput::new(format!("done {input}")))
            }
        }))
        .unwrap();
    registry
        .register(agent("slow", |_input: String| async move {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(AgentOutput::new("finally"))
        }))
        .unwrap();

    let orch = orchestrator();
    let result = orch
        .execute_parallel_with_cancel("x", &names(&["fast", "slow"]), &registry, None, cancel)
        .await;

    let fast = &result.results[0];
    assert!(fast.success, "fast agent reported {:?}", fast.error);
    assert_eq!(fast.output_text, "done x");
    assert_eq!(result.results[1].error.as_deref(), Some("cancelled"));

    // One record per agent, agreeing with the returned result.
    let events = orch.invoker().telemetry().events().await;
    let fast_events: Vec<_> = events
        .iter()
        .filter(|e| e.kind == EventKind::Single && e.agent_name == "fast")
        .collect();
    assert_eq!(fast_events.len(), 1);
    assert_eq!(fast_events[0].output_excerpt, "done x");
    let remembered = orch.invoker().memory().recent("fast", 5).await;
    assert_eq!(remembered.len(), 1);
    assert!(remembered[0].metadata.success);
}

#[tokio::test]
async fn memory_context_is_prefixed_when_enabled() {
    let memory = Arc::new(AgentMemory::new(3));
    let invoker = Invoker::new(
        FallbackRouter::default(),
        Arc::new(TelemetryLogger::new("ctx")),
        Arc::clone(&memory),
    );
    let mut registry = AgentRegistry::new();
    registry
        .register(agent("parrot", |input: String| async move {
            Ok(AgentOutput::new(input))
        }))
        .unwrap();

    // Seed one earlier interaction.
    let orch = ParallelOrchestrator::new(invoker.clone());
    orch.execute_parallel("earlier question", &names(&["parrot"]), &registry, None)
        .await;

    let orch = ParallelOrchestrator::new(invoker).with_config(ParallelConfig {
        include_memory_context: true,
        ..ParallelConfig::default()
    });
    let result = orch
        .execute_parallel("new question", &names(&["parrot"]), &registry, None)
        .await;

    let first = &result.results[0];
    assert!(first.output_text.starts_with("Recent interactions for parrot:"));
    assert!(first.output_text.contains("Input: earlier question"));
    assert!(first.output_text.ends_with("Current Request: new question"));
    assert_eq!(first.effective_input, first.output_text);

    // Only the agent sees the context; records keep the raw request.
    assert_eq!(first.input_text, "new question");
    assert_eq!(first.input_text, result.input_text);
    let recent = memory.recent("parrot", 5).await;
    assert_eq!(recent[0].input_text, "new question");
    assert_eq!(recent[1].input_text, "earlier question");
    let events = orch.invoker().telemetry().events().await;
    let last_single = events
        .iter()
        .rev()
        .find(|e| e.kind == EventKind::Single)
        .unwrap();
    assert_eq!(last_single.input_excerpt, "new question");

    // A later batch lists plain inputs, not earlier context blobs.
    let again = orch
        .execute_parallel("third question", &names(&["parrot"]), &registry, None)
        .await;
    let output = &again.results[0].output_text;
    assert!(output.contains("Input: new question"));
    assert!(!output.contains("Input: Recent interactions"));
}

#[tokio::test]
async fn memory_context_absent_for_new_agent() {
    let invoker = Invoker::default();
    let mut registry = AgentRegistry::new();
    registry
        .register(agent("parrot", |input: String| async move {
            Ok(AgentOutput::new(input))
        }))
        .unwrap();
    registry.register(echo("other")).unwrap();

    // Only "other" has history.
    ParallelOrchestrator::new(invoker.clone())
        .execute_parallel("old", &names(&["other"]), &registry, None)
        .await;

    let orch = ParallelOrchestrator::new(invoker).with_config(ParallelConfig {
        include_memory_context: true,
        ..ParallelConfig::default()
    });
    let result = orch
        .execute_parallel("fresh", &names(&["parrot"]), &registry, None)
        .await;
    assert_eq!(result.results[0].output_text, "fresh");
}
