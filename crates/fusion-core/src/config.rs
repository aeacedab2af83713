//! Runtime settings and configuration documents.
//!
//! Settings come from `FUSION_*` environment variables. Documents (chains,
//! routing, pattern templates) are JSON or TOML files in the config
//! directory, picked by extension.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::chain::{ChainConfig, ChainDefinitions, DEFAULT_HARD_STOP_THRESHOLD};
use crate::domain::{FusionError, FusionResult};
use crate::invocation::InvocationConfig;
use crate::memory::DEFAULT_CAPACITY;
use crate::parallel::{ParallelConfig, DEFAULT_MAX_CONCURRENT};
use crate::routing::{FallbackRouter, PatternRegistry, RiskAssessor, RoutingTable};

pub const CHAINS_DOCUMENT: &str = "agent_chains";
pub const ROUTING_DOCUMENT: &str = "fallback_trigger_config";
pub const PATTERNS_DOCUMENT: &str = "pattern_templates";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> FusionResult<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            other => Err(FusionError::ConfigurationLoad {
                path: path.display().to_string(),
                reason: format!("unsupported document extension {other:?}"),
            }),
        }
    }
}

fn load_error(path: &Path, reason: impl ToString) -> FusionError {
    FusionError::ConfigurationLoad {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Parse a JSON or TOML document.
pub fn load_document<T: DeserializeOwned>(path: &Path) -> FusionResult<T> {
    let format = DocumentFormat::from_path(path)?;
    let text = std::fs::read_to_string(path).map_err(|e| load_error(path, e))?;
    match format {
        DocumentFormat::Json => serde_json::from_str(&text).map_err(|e| load_error(path, e)),
        DocumentFormat::Toml => toml::from_str(&text).map_err(|e| load_error(path, e)),
    }
}

/// Write a JSON (pretty) or TOML document, creating parent directories.
pub fn save_document<T: Serialize>(path: &Path, value: &T) -> FusionResult<()> {
    let text = match DocumentFormat::from_path(path)? {
        DocumentFormat::Json => serde_json::to_string_pretty(value)?,
        DocumentFormat::Toml => toml::to_string_pretty(value).map_err(|e| load_error(path, e))?,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text)?;
    Ok(())
}

/// `<dir>/<stem>.json`, else `<dir>/<stem>.toml`, if either exists.
pub fn find_document(dir: &Path, stem: &str) -> Option<PathBuf> {
    ["json", "toml"]
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|p| p.is_file())
}

/// Process settings with environment overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub config_dir: PathBuf,
    pub state_dir: PathBuf,
    pub memory_capacity: usize,
    pub max_concurrency: usize,
    /// `0` disables the per-invocation deadline.
    pub invocation_timeout_ms: u64,
    pub hard_stop_threshold: f64,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("."),
            state_dir: PathBuf::from(".fusion"),
            memory_capacity: DEFAULT_CAPACITY,
            max_concurrency: DEFAULT_MAX_CONCURRENT,
            invocation_timeout_ms: 120_000,
            hard_stop_threshold: DEFAULT_HARD_STOP_THRESHOLD,
        }
    }
}

impl FusionSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Unparseable values are logged and
    /// the default kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(dir) = lookup("FUSION_CONFIG_DIR") {
            settings.config_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("FUSION_STATE_DIR") {
            settings.state_dir = PathBuf::from(dir);
        }
        parse_into(&lookup, "FUSION_MEMORY_CAPACITY", &mut settings.memory_capacity);
        parse_into(&lookup, "FUSION_MAX_CONCURRENCY", &mut settings.max_concurrency);
        parse_into(
            &lookup,
            "FUSION_INVOCATION_TIMEOUT_MS",
            &mut settings.invocation_timeout_ms,
        );
        parse_into(
            &lookup,
            "FUSION_HARD_STOP_THRESHOLD",
            &mut settings.hard_stop_threshold,
        );
        settings
    }

    pub fn invocation_timeout(&self) -> Option<Duration> {
        (self.invocation_timeout_ms > 0).then(|| Duration::from_millis(self.invocation_timeout_ms))
    }

    pub fn invocation_config(&self) -> InvocationConfig {
        InvocationConfig {
            timeout: self.invocation_timeout(),
        }
    }

    pub fn chain_config(&self) -> ChainConfig {
        ChainConfig {
            hard_stop_threshold: self.hard_stop_threshold,
            ..ChainConfig::default()
        }
    }

    pub fn parallel_config(&self) -> ParallelConfig {
        ParallelConfig {
            max_concurrent: self.max_concurrency.max(1),
            ..ParallelConfig::default()
        }
    }
}

fn parse_into<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(e) => warn!(key, value = %raw, error = %e, "ignoring invalid setting"),
        }
    }
}

/// The three configuration documents, resolved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionConfig {
    pub chains: ChainDefinitions,
    pub routing: RoutingTable,
    pub patterns: PatternRegistry,
}

impl FusionConfig {
    /// Load every document present in `dir`. Absent documents use built-in
    /// defaults; a document that exists but fails to parse is an error.
    pub fn load(dir: &Path) -> FusionResult<Self> {
        Ok(Self {
            chains: load_chains(dir)?,
            routing: load_routing(dir)?,
            patterns: load_patterns(dir)?,
        })
    }

    /// Like [`load`](Self::load), but a broken document is logged and
    /// replaced by its default instead of failing the whole load.
    pub fn load_or_default(dir: &Path) -> Self {
        Self {
            chains: or_default(load_chains(dir), CHAINS_DOCUMENT),
            routing: or_default(load_routing(dir), ROUTING_DOCUMENT),
            patterns: or_default(load_patterns(dir), PATTERNS_DOCUMENT),
        }
    }

    pub fn router(&self, assessor: Arc<dyn RiskAssessor>) -> FallbackRouter {
        FallbackRouter::new(self.routing.clone(), self.patterns.clone(), assessor)
    }
}

fn or_default<T: Default>(loaded: FusionResult<T>, document: &str) -> T {
    loaded.unwrap_or_else(|e| {
        warn!(document, error = %e, "falling back to built-in defaults");
        T::default()
    })
}

pub fn load_chains(dir: &Path) -> FusionResult<ChainDefinitions> {
    match find_document(dir, CHAINS_DOCUMENT) {
        Some(path) => {
            debug!(path = %path.display(), "loading chain definitions");
            load_document(&path)
        }
        None => Ok(ChainDefinitions::default()),
    }
}

pub fn load_routing(dir: &Path) -> FusionResult<RoutingTable> {
    match find_document(dir, ROUTING_DOCUMENT) {
        Some(path) => {
            debug!(path = %path.display(), "loading routing table");
            load_document(&path)
        }
        None => Ok(RoutingTable::default()),
    }
}

/// Built-in patterns overlaid with the templates document, if any.
pub fn load_patterns(dir: &Path) -> FusionResult<PatternRegistry> {
    let mut registry = PatternRegistry::builtin();
    if let Some(path) = find_document(dir, PATTERNS_DOCUMENT) {
        debug!(path = %path.display(), "loading pattern templates");
        let templates: BTreeMap<String, String> = load_document(&path)?;
        registry.merge(&templates);
    }
    Ok(registry)
}
