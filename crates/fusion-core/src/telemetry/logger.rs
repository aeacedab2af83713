//! Session-scoped telemetry log.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use fusion_state::{SessionEvent, SessionRecord, SessionStore};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::event::TelemetryEvent;
use super::summary::{summarize, SessionSummary};
use crate::domain::{AgentResult, FusionResult};

struct LogState {
    started_at: DateTime<Utc>,
    events: Vec<TelemetryEvent>,
    next_seq: u64,
}

/// Append-only event log for one session.
///
/// Appends from concurrent tasks are serialised by an internal mutex and
/// numbered in arrival order.
pub struct TelemetryLogger {
    session_id: RwLock<String>,
    state: Mutex<LogState>,
}

impl TelemetryLogger {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: RwLock::new(session_id.into()),
            state: Mutex::new(LogState {
                started_at: Utc::now(),
                events: Vec::new(),
                next_seq: 0,
            }),
        }
    }

    /// Logger with a random v4 UUID as its session id.
    pub fn with_generated_id() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn session_id(&self) -> String {
        self.session_id
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub async fn started_at(&self) -> DateTime<Utc> {
        self.state.lock().await.started_at
    }

    /// Append `event`, stamping the next sequence number. Returns the stored copy.
    pub async fn log_event(&self, mut event: TelemetryEvent) -> TelemetryEvent {
        let mut state = self.state.lock().await;
        event.seq = state.next_seq;
        state.next_seq += 1;
        debug!(
            session_id = %self.session_id(),
            seq = event.seq,
            kind = %event.kind,
            agent = %event.agent_name,
            "telemetry event"
        );
        state.events.push(event.clone());
        event
    }

    pub async fn log_invocation(&self, result: &AgentResult) -> TelemetryEvent {
        self.log_event(TelemetryEvent::single(result)).await
    }

    pub async fn log_parallel(
        &self,
        input: &str,
        results: &[AgentResult],
        duration_ms: u64,
    ) -> TelemetryEvent {
        self.log_event(TelemetryEvent::parallel(input, results, duration_ms))
            .await
    }

    pub async fn log_evaluation(&self, agent_name: &str, score: f64) -> TelemetryEvent {
        self.log_event(TelemetryEvent::evaluation(agent_name, score))
            .await
    }

    /// Snapshot of all events in append order.
    pub async fn events(&self) -> Vec<TelemetryEvent> {
        self.state.lock().await.events.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn summary(&self) -> SessionSummary {
        let state = self.state.lock().await;
        summarize(state.started_at, &state.events)
    }

    /// End the current session and start a new one under a fresh id.
    ///
    /// The old session's events are discarded, so save it first if it
    /// should be kept. Returns the new session id.
    pub async fn clear(&self) -> String {
        let mut state = self.state.lock().await;
        let session_id = uuid::Uuid::new_v4().to_string();
        *self
            .session_id
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = session_id.clone();
        state.events.clear();
        state.next_seq = 0;
        state.started_at = Utc::now();
        info!(session_id = %session_id, "telemetry session restarted");
        session_id
    }

    /// Serialisable snapshot with events and summary.
    pub async fn to_record(&self) -> FusionResult<SessionRecord> {
        let state = self.state.lock().await;
        let events = state
            .events
            .iter()
            .map(|e| {
                Ok(SessionEvent {
                    seq: e.seq,
                    kind: e.kind.as_str().to_string(),
                    payload: serde_json::to_value(e)?,
                    timestamp: e.timestamp,
                })
            })
            .collect::<FusionResult<Vec<_>>>()?;
        let summary = serde_json::to_value(summarize(state.started_at, &state.events))?;

        Ok(SessionRecord {
            session_id: self.session_id(),
            started_at: state.started_at,
            saved_at: Utc::now(),
            events,
            summary,
        })
    }

    pub async fn save(&self, store: &dyn SessionStore) -> FusionResult<()> {
        let record = self.to_record().await?;
        store.save_session(&record).await?;
        info!(
            session_id = %record.session_id,
            events = record.events.len(),
            "telemetry session saved"
        );
        Ok(())
    }

    /// Rebuild a logger from a stored record. New events continue the sequence.
    pub fn restore(record: &SessionRecord) -> FusionResult<Self> {
        let events = record
            .events
            .iter()
            .map(|e| serde_json::from_value::<TelemetryEvent>(e.payload.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let next_seq = events.iter().map(|e| e.seq + 1).max().unwrap_or(0);

        Ok(Self {
            session_id: RwLock::new(record.session_id.clone()),
            state: Mutex::new(LogState {
                started_at: record.started_at,
                events,
                next_seq,
            }),
        })
    }

    pub async fn load(store: &dyn SessionStore, session_id: &str) -> FusionResult<Self> {
        let record = store.load_session(session_id).await?;
        Self::restore(&record)
    }
}

impl std::fmt::Debug for TelemetryLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryLogger")
            .field("session_id", &self.session_id())
            .finish_non_exhaustive()
    }
}
