//! Per-agent memory: bounded interaction history, lifetime statistics and
//! insights derived from them.

pub mod entry;
pub mod insights;
pub mod store;

pub use entry::{EntryMetadata, MemoryEntry};
pub use insights::{AgentInsights, AgentStats, Trend, TREND_EPSILON, TREND_WINDOW};
pub use store::{AgentMemory, DEFAULT_CAPACITY};
