//! Core domain types: agents, results and errors.

pub mod agent;
pub mod error;
pub mod result;

pub use agent::{Agent, AgentDescriptor, AgentOutput, AgentRegistry, FnAgent};
pub use error::{FusionError, FusionResult};
pub use result::{
    AbortReason, AgentResult, ChainExecutionResult, ParallelExecutionResult, RiskAssessment,
};
