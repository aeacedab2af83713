//! Running per-agent statistics and the insight report built from them.

use std::fmt;

use chrono::{DateTime, Utc};
use fusion_state::HistorySummary;
use serde::{Deserialize, Serialize};

use super::entry::MemoryEntry;

/// How many of the newest entries feed the trend.
pub const TREND_WINDOW: usize = 3;

/// Difference in mean confidence that counts as movement.
pub const TREND_EPSILON: f64 = 0.05;

/// Lifetime counters for one agent. Unlike entries, these survive eviction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStats {
    pub total_runs: u64,
    pub successes: u64,
    pub confidence_sum: f64,
    pub confidence_samples: u64,
    pub fallback_count: u64,
    pub last_run: Option<DateTime<Utc>>,
}

impl AgentStats {
    pub fn record(&mut self, entry: &MemoryEntry) {
        self.total_runs += 1;
        if entry.metadata.success {
            self.successes += 1;
        }
        if let Some(confidence) = entry.metadata.confidence {
            self.confidence_sum += confidence;
            self.confidence_samples += 1;
        }
        if entry.metadata.fallback_pattern.is_some() {
            self.fallback_count += 1;
        }
        self.last_run = Some(entry.timestamp);
    }

    pub fn avg_confidence(&self) -> Option<f64> {
        (self.confidence_samples > 0).then(|| self.confidence_sum / self.confidence_samples as f64)
    }

    pub fn success_rate(&self) -> f64 {
        ratio(self.successes, self.total_runs)
    }

    pub fn fallback_rate(&self) -> f64 {
        ratio(self.fallback_count, self.total_runs)
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

impl From<&HistorySummary> for AgentStats {
    fn from(summary: &HistorySummary) -> Self {
        Self {
            total_runs: summary.total_runs,
            successes: summary.successes,
            confidence_sum: summary.confidence_sum,
            confidence_samples: summary.confidence_samples,
            fallback_count: summary.fallback_count,
            last_run: summary.last_run,
        }
    }
}

impl From<&AgentStats> for HistorySummary {
    fn from(stats: &AgentStats) -> Self {
        Self {
            total_runs: stats.total_runs,
            last_run: stats.last_run,
            success_rate: stats.success_rate(),
            successes: stats.successes,
            confidence_sum: stats.confidence_sum,
            confidence_samples: stats.confidence_samples,
            fallback_count: stats.fallback_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Trend::Improving => "improving",
            Trend::Declining => "declining",
            Trend::Stable => "stable",
            Trend::InsufficientData => "insufficient_data",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentInsights {
    pub agent_name: String,
    pub total_runs: u64,
    pub avg_confidence: Option<f64>,
    pub fallback_rate: f64,
    pub success_rate: f64,
    pub trend: Trend,
}

impl AgentInsights {
    /// `recent` is newest first; only the first [`TREND_WINDOW`] are used.
    pub fn compute(agent_name: &str, stats: &AgentStats, recent: &[MemoryEntry]) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            total_runs: stats.total_runs,
            avg_confidence: stats.avg_confidence(),
            fallback_rate: stats.fallback_rate(),
            success_rate: stats.success_rate(),
            trend: trend(stats, recent),
        }
    }
}

fn trend(stats: &AgentStats, recent: &[MemoryEntry]) -> Trend {
    if stats.total_runs < 2 {
        return Trend::InsufficientData;
    }
    let Some(all_time) = stats.avg_confidence() else {
        return Trend::InsufficientData;
    };
    let window: Vec<f64> = recent
        .iter()
        .take(TREND_WINDOW)
        .filter_map(|e| e.metadata.confidence)
        .collect();
    if window.is_empty() {
        return Trend::InsufficientData;
    }
    let recent_mean = window.iter().sum::<f64>() / window.len() as f64;

    let delta = recent_mean - all_time;
    if delta > TREND_EPSILON {
        Trend::Improving
    } else if delta < -TREND_EPSILON {
        Trend::Declining
    } else {
        Trend::Stable
    }
}
