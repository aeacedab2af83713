//! Fallback routing: risk assessment, pattern library and the router that
//! combines them.

pub mod patterns;
pub mod risk;
pub mod router;

pub use patterns::{default_agent_patterns, PatternEntry, PatternRegistry, DEFAULT_PATTERN};
pub use risk::{FixedRiskAssessor, RiskAssessor, TableRiskAssessor};
pub use router::{FallbackRouter, RouteDecision, RoutingTable, DEFAULT_RISK_THRESHOLD};
