//! Bounded per-agent interaction history.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fusion_state::{AgentHistoryRecord, HistoryStore, HistorySummary};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::entry::MemoryEntry;
use super::insights::{AgentInsights, AgentStats};
use crate::domain::FusionResult;

pub const DEFAULT_CAPACITY: usize = 3;

/// Excerpt length used by [`AgentMemory::context`].
const CONTEXT_EXCERPT_CHARS: usize = 100;

struct AgentSlot {
    created_at: DateTime<Utc>,
    entries: VecDeque<MemoryEntry>,
    stats: AgentStats,
}

impl AgentSlot {
    fn new() -> Self {
        Self {
            created_at: Utc::now(),
            entries: VecDeque::new(),
            stats: AgentStats::default(),
        }
    }

    fn to_record(&self, agent_name: &str) -> AgentHistoryRecord {
        AgentHistoryRecord {
            agent_name: agent_name.to_string(),
            created_at: self.created_at,
            history: self.entries.iter().map(MemoryEntry::to_history).collect(),
            summary: HistorySummary::from(&self.stats),
        }
    }
}

/// FIFO memory of the last `capacity` interactions per agent, plus lifetime
/// statistics.
///
/// All mutation goes through one async mutex. With a backing store attached,
/// the agent's record is written before the lock is released, so concurrent
/// appends can never persist out of order.
pub struct AgentMemory {
    capacity: usize,
    store: Option<Arc<dyn HistoryStore>>,
    slots: Mutex<BTreeMap<String, AgentSlot>>,
}

impl Default for AgentMemory {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl AgentMemory {
    /// In-process memory only. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            store: None,
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    /// Memory backed by `store`, preloaded with every persisted agent.
    ///
    /// Stored histories longer than `capacity` are cut to their newest entries.
    #[instrument(skip(store))]
    pub async fn open(store: Arc<dyn HistoryStore>, capacity: usize) -> FusionResult<Self> {
        let capacity = capacity.max(1);
        let mut slots = BTreeMap::new();

        for agent_name in store.list_agents().await? {
            let Some(record) = store.load_history(&agent_name).await? else {
                continue;
            };
            let skip = record.history.len().saturating_sub(capacity);
            let entries = record
                .history
                .iter()
                .skip(skip)
                .map(|h| MemoryEntry::from_history(&agent_name, h))
                .collect();
            slots.insert(
                agent_name,
                AgentSlot {
                    created_at: record.created_at,
                    entries,
                    stats: AgentStats::from(&record.summary),
                },
            );
        }

        info!(agents = slots.len(), capacity, "agent memory loaded");
        Ok(Self {
            capacity,
            store: Some(store),
            slots: Mutex::new(slots),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an interaction, evicting the oldest entry beyond capacity.
    ///
    /// Persistence failures are logged; the in-memory update always stands.
    pub async fn append(&self, agent_name: &str, entry: MemoryEntry) {
        let mut slots = self.slots.lock().await;
        let slot = slots
            .entry(agent_name.to_string())
            .or_insert_with(AgentSlot::new);

        slot.stats.record(&entry);
        slot.entries.push_back(entry);
        while slot.entries.len() > self.capacity {
            slot.entries.pop_front();
        }
        debug!(agent = %agent_name, stored = slot.entries.len(), "memory entry appended");

        if let Some(store) = &self.store {
            let record = slot.to_record(agent_name);
            if let Err(e) = store.save_history(&record).await {
                warn!(agent = %agent_name, error = %e, "failed to persist agent memory");
            }
        }
    }

    /// Up to `n` entries, newest first.
    pub async fn recent(&self, agent_name: &str, n: usize) -> Vec<MemoryEntry> {
        let slots = self.slots.lock().await;
        slots
            .get(agent_name)
            .map(|slot| slot.entries.iter().rev().take(n).cloned().collect())
            .unwrap_or_default()
    }

    pub async fn insights(&self, agent_name: &str) -> AgentInsights {
        let slots = self.slots.lock().await;
        match slots.get(agent_name) {
            Some(slot) => {
                let recent: Vec<MemoryEntry> = slot.entries.iter().rev().cloned().collect();
                AgentInsights::compute(agent_name, &slot.stats, &recent)
            }
            None => AgentInsights::compute(agent_name, &AgentStats::default(), &[]),
        }
    }

    pub async fn stats(&self, agent_name: &str) -> Option<AgentStats> {
        self.slots
            .lock()
            .await
            .get(agent_name)
            .map(|slot| slot.stats.clone())
    }

    /// Prompt-ready digest of the last `max_entries` interactions, oldest
    /// first. Empty when the agent has no history.
    pub async fn context(&self, agent_name: &str, max_entries: usize) -> String {
        let mut recent = self.recent(agent_name, max_entries).await;
        if recent.is_empty() {
            return String::new();
        }
        recent.reverse();

        let mut context = format!("Recent interactions for {agent_name}:\n");
        for entry in &recent {
            context.push_str(&format!(
                "- Input: {}\n  Output: {}\n  Time: {}\n\n",
                clip(&entry.input_text),
                clip(&entry.output_text),
                entry.timestamp.to_rfc3339(),
            ));
        }
        context
    }

    /// Stored entries whose input or output contains `query`, ignoring case.
    pub async fn search(&self, agent_name: &str, query: &str) -> Vec<MemoryEntry> {
        let lowered = query.to_lowercase();
        let slots = self.slots.lock().await;
        slots
            .get(agent_name)
            .map(|slot| {
                slot.entries
                    .iter()
                    .filter(|e| e.matches(&lowered))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn agents(&self) -> Vec<String> {
        self.slots.lock().await.keys().cloned().collect()
    }

    /// Forget an agent entirely, including its persisted record.
    pub async fn clear(&self, agent_name: &str) -> FusionResult<()> {
        let mut slots = self.slots.lock().await;
        slots.remove(agent_name);
        if let Some(store) = &self.store {
            store.delete_history(agent_name).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for AgentMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentMemory")
            .field("capacity", &self.capacity)
            .field("persistent", &self.store.is_some())
            .finish_non_exhaustive()
    }
}

fn clip(text: &str) -> String {
    match text.char_indices().nth(CONTEXT_EXCERPT_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
