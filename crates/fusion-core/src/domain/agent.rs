//! Agents and the registry that names them.
//!
//! An agent is opaque: it takes text and returns an [`AgentOutput`]. The
//! registry is built once at startup and shared read-only behind an `Arc`.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::{FusionError, FusionResult};

/// What an agent hands back from a single invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub output_text: String,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl AgentOutput {
    pub fn new(output_text: impl Into<String>) -> Self {
        Self {
            output_text: output_text.into(),
            confidence: 0.0,
            metadata: Map::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Interpret a loosely-shaped JSON reply.
    ///
    /// A string `output` field becomes the text; otherwise the whole value is
    /// rendered as JSON. A numeric `confidence` field is picked up when present.
    /// Remaining object fields are kept as metadata.
    pub fn from_json(value: Value) -> Self {
        let output_text = match value.get("output") {
            Some(Value::String(s)) => s.clone(),
            _ => match &value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        };
        let confidence = value
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        let metadata = match value {
            Value::Object(mut map) => {
                map.remove("output");
                map.remove("confidence");
                map
            }
            _ => Map::new(),
        };
        Self {
            output_text,
            confidence,
            metadata,
        }
    }
}

/// A named unit that transforms text into an [`AgentOutput`].
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, input: &str) -> anyhow::Result<AgentOutput>;
}

/// Adapts an async closure into an [`Agent`].
///
/// ```ignore
/// let upper = FnAgent::new("upper", |input: String| async move {
///     Ok(AgentOutput::new(input.to_uppercase()))
/// });
/// ```
pub struct FnAgent<F> {
    name: String,
    f: F,
}

impl<F> FnAgent<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F, Fut> Agent for FnAgent<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<AgentOutput>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, input: &str) -> anyhow::Result<AgentOutput> {
        (self.f)(input.to_string()).await
    }
}

/// Registry entry: the registered name plus a shared handle to the agent.
#[derive(Clone)]
pub struct AgentDescriptor {
    name: String,
    agent: Arc<dyn Agent>,
}

impl AgentDescriptor {
    /// Register under the agent's own name.
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self {
            name: agent.name().to_string(),
            agent,
        }
    }

    /// Register under an explicit name, e.g. an alias.
    pub fn named(name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        Self {
            name: name.into(),
            agent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    pub async fn invoke(&self, input: &str) -> anyhow::Result<AgentOutput> {
        self.agent.invoke(input).await
    }
}

impl fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Name-keyed set of agents available to a run.
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, AgentDescriptor>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent. Names are unique.
    pub fn register(&mut self, descriptor: AgentDescriptor) -> FusionResult<()> {
        if self.agents.contains_key(descriptor.name()) {
            return Err(FusionError::DuplicateAgent(descriptor.name().to_string()));
        }
        self.agents.insert(descriptor.name().to_string(), descriptor);
        Ok(())
    }

    /// Builder form of [`register`](Self::register) using the agent's own name.
    pub fn with_agent(mut self, agent: impl Agent + 'static) -> FusionResult<Self> {
        self.register(AgentDescriptor::new(Arc::new(agent)))?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&AgentDescriptor> {
        self.agents.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.agents.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
