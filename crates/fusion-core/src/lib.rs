//! Fusion Core Library
//!
//! Orchestrates named agents in two modes: ordered chains where each output
//! feeds the next agent, and parallel fan-out with optional evaluator
//! ranking. Every invocation passes through risk-based fallback routing and
//! is recorded into session telemetry and bounded per-agent memory.

pub mod chain;
pub mod config;
pub mod domain;
pub mod invocation;
pub mod logging;
pub mod memory;
pub mod metrics;
pub mod obs;
pub mod parallel;
pub mod routing;
pub mod runtime;
pub mod telemetry;

pub use chain::{ChainConfig, ChainDefinitions, ChainExecutor, DEFAULT_HARD_STOP_THRESHOLD};
pub use config::{FusionConfig, FusionSettings};
pub use domain::{
    AbortReason, Agent, AgentDescriptor, AgentOutput, AgentRegistry, AgentResult,
    ChainExecutionResult, FnAgent, FusionError, FusionResult, ParallelExecutionResult,
    RiskAssessment,
};
pub use invocation::{InvocationConfig, Invoker};
pub use memory::{AgentInsights, AgentMemory, AgentStats, EntryMetadata, MemoryEntry, Trend};
pub use parallel::{ParallelConfig, ParallelOrchestrator};
pub use routing::{
    FallbackRouter, FixedRiskAssessor, PatternEntry, PatternRegistry, RiskAssessor, RouteDecision,
    RoutingTable, TableRiskAssessor,
};
pub use runtime::FusionRuntime;
pub use telemetry::{
    EventKind, HttpSessionExporter, SessionSummary, TelemetryEvent, TelemetryLogger,
};

pub use logging::init_tracing;
pub use metrics::METRICS;

pub use tokio_util::sync::CancellationToken;

/// Fusion version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
