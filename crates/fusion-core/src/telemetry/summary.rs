//! Session statistics derived from the event list.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::{EventKind, TelemetryEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub total_events: usize,
    /// Invocation counts per agent, from single events only.
    pub agent_usage: BTreeMap<String, u64>,
    pub fallback_count: u64,
    /// `fallback_count / total_events`, 0 for an empty session.
    pub fallback_rate: f64,
    pub avg_confidence: Option<f64>,
    pub total_execution_time_ms: u64,
    pub evaluation_count: u64,
    /// From session start to the newest event.
    pub session_duration_ms: u64,
}

/// Fold `events` into a summary. Depends on nothing but its arguments.
pub fn summarize(started_at: DateTime<Utc>, events: &[TelemetryEvent]) -> SessionSummary {
    let mut agent_usage = BTreeMap::new();
    let mut fallback_count = 0u64;
    let mut confidence_sum = 0.0;
    let mut confidence_samples = 0u64;
    let mut total_execution_time_ms = 0u64;
    let mut evaluation_count = 0u64;

    for event in events {
        match event.kind {
            EventKind::Single => {
                *agent_usage.entry(event.agent_name.clone()).or_insert(0) += 1;
                total_execution_time_ms += event.execution_time_ms;
            }
            EventKind::Evaluation => evaluation_count += 1,
            EventKind::Parallel => {}
        }
        if event.fallback_pattern.is_some() {
            fallback_count += 1;
        }
        if let Some(confidence) = event.confidence {
            confidence_sum += confidence;
            confidence_samples += 1;
        }
    }

    let fallback_rate = if events.is_empty() {
        0.0
    } else {
        fallback_count as f64 / events.len() as f64
    };

    let session_duration_ms = events
        .iter()
        .map(|e| e.timestamp)
        .max()
        .map(|last| (last - started_at).num_milliseconds().max(0) as u64)
        .unwrap_or(0);

    SessionSummary {
        total_events: events.len(),
        agent_usage,
        fallback_count,
        fallback_rate,
        avg_confidence: (confidence_samples > 0)
            .then(|| confidence_sum / confidence_samples as f64),
        total_execution_time_ms,
        evaluation_count,
        session_duration_ms,
    }
}
