//! Fusion CLI
//!
//! The `fusion` command inspects and manages what the orchestration core
//! reads and writes: configuration documents, fallback routing, per-agent
//! memory and saved telemetry sessions.
//!
//! ## Commands
//!
//! - `init`: Write the built-in configuration documents
//! - `chains` / `patterns`: Show the resolved configuration
//! - `route`: Preview how an input would be routed for an agent
//! - `insights` / `agents` / `forget`: Inspect or clear agent memory
//! - `sessions` / `summary` / `export`: Work with saved telemetry sessions

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tracing::{info, Level};

use fusion_core::config::{save_document, CHAINS_DOCUMENT, PATTERNS_DOCUMENT, ROUTING_DOCUMENT};
use fusion_core::telemetry::write_csv;
use fusion_core::{
    AgentMemory, ChainDefinitions, FixedRiskAssessor, FusionConfig, FusionSettings,
    HttpSessionExporter, PatternRegistry, RoutingTable, TelemetryLogger, METRICS,
};
use fusion_state::{FsStateStore, SessionStore};

#[derive(Parser)]
#[command(name = "fusion")]
#[command(author = "Fusion Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-agent orchestration toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// How command results are printed
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Directory holding configuration documents (overrides FUSION_CONFIG_DIR)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Directory holding memory and sessions (overrides FUSION_STATE_DIR)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the built-in chain, routing and pattern documents
    Init {
        /// Overwrite documents that already exist
        #[arg(long)]
        force: bool,
    },

    /// List chain definitions
    Chains,

    /// List fallback patterns, or show one in full
    Patterns {
        /// Pattern to show
        name: Option<String>,
    },

    /// Preview the fallback routing of an input
    Route {
        /// Agent the input is meant for
        agent: String,

        /// Input text
        input: String,

        /// Risk score to assume, between 0 and 1
        #[arg(short, long, default_value = "0.0")]
        risk: f64,

        /// Let trigger words in the input pick the pattern
        #[arg(long)]
        triggers: bool,
    },

    /// Show memory insights for an agent
    Insights {
        /// Agent name
        agent: String,

        /// Recent interactions to print
        #[arg(short, long, default_value = "3")]
        recent: usize,
    },

    /// List agents with stored memory
    Agents,

    /// Delete an agent's stored memory
    Forget {
        /// Agent name
        agent: String,
    },

    /// List saved telemetry sessions
    Sessions,

    /// Summarise a saved telemetry session
    Summary {
        /// Session ID
        session: String,
    },

    /// Export a saved telemetry session
    Export {
        /// Session ID
        session: String,

        /// Write single-invocation events to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,

        /// POST the session record to this collector URL
        #[arg(long)]
        url: Option<String>,

        /// Bearer token for the collector
        #[arg(long, env = "FUSION_EXPORT_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    fusion_core::init_tracing(cli.json, level);

    let settings = resolve_settings(FusionSettings::from_env(), &cli);
    let format = cli.format;

    let outcome = match cli.command {
        Commands::Init { force } => cmd_init(&settings.config_dir, force),
        Commands::Chains => cmd_chains(&settings, format),
        Commands::Patterns { name } => cmd_patterns(&settings, name.as_deref(), format),
        Commands::Route {
            agent,
            input,
            risk,
            triggers,
        } => cmd_route(&settings, &agent, &input, risk, triggers, format).await,
        Commands::Insights { agent, recent } => {
            cmd_insights(&settings, &agent, recent, format).await
        }
        Commands::Agents => cmd_agents(&settings, format).await,
        Commands::Forget { agent } => cmd_forget(&settings, &agent).await,
        Commands::Sessions => cmd_sessions(&settings, format).await,
        Commands::Summary { session } => cmd_summary(&settings, &session, format).await,
        Commands::Export {
            session,
            csv,
            url,
            token,
        } => cmd_export(&settings, &session, csv.as_deref(), url, token).await,
    };

    METRICS.flush();
    outcome
}

/// Environment settings with command-line directory overrides applied.
fn resolve_settings(mut settings: FusionSettings, cli: &Cli) -> FusionSettings {
    if let Some(dir) = &cli.config_dir {
        settings.config_dir = dir.clone();
    }
    if let Some(dir) = &cli.state_dir {
        settings.state_dir = dir.clone();
    }
    settings
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(settings: &FusionSettings) -> Result<FusionConfig> {
    FusionConfig::load(&settings.config_dir).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            settings.config_dir.display()
        )
    })
}

fn open_store(settings: &FusionSettings) -> Result<Arc<FsStateStore>> {
    let store = FsStateStore::new(&settings.state_dir).with_context(|| {
        format!(
            "Failed to open state directory {}",
            settings.state_dir.display()
        )
    })?;
    Ok(Arc::new(store))
}

async fn open_memory(settings: &FusionSettings) -> Result<AgentMemory> {
    let store = open_store(settings)?;
    AgentMemory::open(store, settings.memory_capacity)
        .await
        .context("Failed to load agent memory")
}

/// Write the three configuration documents as JSON
fn cmd_init(config_dir: &Path, force: bool) -> Result<()> {
    let templates: BTreeMap<String, String> = PatternRegistry::builtin()
        .entries()
        .iter()
        .map(|e| (e.name.clone(), e.template.clone()))
        .collect();

    let documents: [(&str, serde_json::Value); 3] = [
        (CHAINS_DOCUMENT, serde_json::to_value(ChainDefinitions::builtin())?),
        (ROUTING_DOCUMENT, serde_json::to_value(RoutingTable::default())?),
        (PATTERNS_DOCUMENT, serde_json::to_value(templates)?),
    ];

    for (stem, document) in &documents {
        let path = config_dir.join(format!("{stem}.json"));
        if path.exists() && !force {
            println!("Skipping {} (exists, use --force to overwrite)", path.display());
            continue;
        }
        save_document(&path, document)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }

    info!(config_dir = %config_dir.display(), "configuration initialised");
    Ok(())
}

fn cmd_chains(settings: &FusionSettings, format: OutputFormat) -> Result<()> {
    let config = load_config(settings)?;
    if format == OutputFormat::Json {
        return print_json(&config.chains);
    }

    if config.chains.is_empty() {
        println!("No chains defined in {}", settings.config_dir.display());
        return Ok(());
    }
    for (name, agents) in config.chains.iter() {
        println!("{name}: {}", agents.join(" -> "));
    }
    Ok(())
}

fn cmd_patterns(settings: &FusionSettings, name: Option<&str>, format: OutputFormat) -> Result<()> {
    let config = load_config(settings)?;
    let patterns = &config.patterns;

    if let Some(name) = name {
        let Some(entry) = patterns.entries().iter().find(|e| e.name == name) else {
            bail!(
                "Unknown pattern '{}'. Available: {}",
                name,
                patterns.names().join(", ")
            );
        };
        if format == OutputFormat::Json {
            return print_json(entry);
        }
        println!("{}", entry.name);
        if !entry.description.is_empty() {
            println!("  {}", entry.description);
        }
        if !entry.triggers.is_empty() {
            println!("  triggers: {}", entry.triggers.join(", "));
        }
        println!();
        println!("{}", entry.template);
        return Ok(());
    }

    if format == OutputFormat::Json {
        return print_json(&patterns.entries());
    }
    for entry in patterns.entries() {
        let marker = if entry.name == config.routing.default_pattern {
            "* "
        } else {
            "  "
        };
        println!("{marker}{:<32} {}", entry.name, entry.description);
    }
    Ok(())
}

async fn cmd_route(
    settings: &FusionSettings,
    agent: &str,
    input: &str,
    risk: f64,
    triggers: bool,
    format: OutputFormat,
) -> Result<()> {
    if !(0.0..=1.0).contains(&risk) {
        bail!("--risk must be between 0 and 1, got {risk}");
    }
    let config = load_config(settings)?;
    let router = config
        .router(Arc::new(FixedRiskAssessor::new(risk)))
        .with_trigger_matching(triggers);
    let decision = router.route(input, agent).await;

    if format == OutputFormat::Json {
        return print_json(&json!({
            "agent": agent,
            "risk_score": decision.risk.risk_score,
            "risk_threshold": router.table().risk_threshold,
            "applied_pattern": decision.applied_pattern,
            "effective_input": decision.effective_input,
        }));
    }

    println!(
        "risk {:.2} (threshold {:.2})",
        decision.risk.risk_score,
        router.table().risk_threshold
    );
    match &decision.applied_pattern {
        Some(pattern) => println!("pattern: {pattern}"),
        None => println!("pattern: none, input passes through"),
    }
    println!();
    println!("{}", decision.effective_input);
    Ok(())
}

async fn cmd_insights(
    settings: &FusionSettings,
    agent: &str,
    recent: usize,
    format: OutputFormat,
) -> Result<()> {
    let memory = open_memory(settings).await?;
    let insights = memory.insights(agent).await;
    let entries = memory.recent(agent, recent).await;

    if format == OutputFormat::Json {
        return print_json(&json!({ "insights": insights, "recent": entries }));
    }

    if insights.total_runs == 0 {
        println!("No memory recorded for '{agent}'");
        return Ok(());
    }

    println!("{agent}");
    println!("  runs:          {}", insights.total_runs);
    println!("  success rate:  {:.1}%", insights.success_rate * 100.0);
    println!("  fallback rate: {:.1}%", insights.fallback_rate * 100.0);
    match insights.avg_confidence {
        Some(c) => println!("  confidence:    {c:.2} ({})", insights.trend),
        None => println!("  confidence:    n/a ({})", insights.trend),
    }
    for entry in entries {
        println!();
        println!("  {}", entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("    in:  {}", entry.input_text);
        println!("    out: {}", entry.output_text);
    }
    Ok(())
}

async fn cmd_agents(settings: &FusionSettings, format: OutputFormat) -> Result<()> {
    let memory = open_memory(settings).await?;
    let agents = memory.agents().await;

    if format == OutputFormat::Json {
        return print_json(&agents);
    }
    if agents.is_empty() {
        println!("No agent memory in {}", settings.state_dir.display());
    }
    for agent in agents {
        println!("{agent}");
    }
    Ok(())
}

async fn cmd_forget(settings: &FusionSettings, agent: &str) -> Result<()> {
    let memory = open_memory(settings).await?;
    memory
        .clear(agent)
        .await
        .with_context(|| format!("Failed to clear memory for '{agent}'"))?;
    println!("Cleared memory for '{agent}'");
    Ok(())
}

async fn cmd_sessions(settings: &FusionSettings, format: OutputFormat) -> Result<()> {
    let store = open_store(settings)?;
    let sessions = store.list_sessions().await?;

    if format == OutputFormat::Json {
        return print_json(&sessions);
    }
    if sessions.is_empty() {
        println!("No saved sessions in {}", settings.state_dir.display());
    }
    for session in sessions {
        println!("{session}");
    }
    Ok(())
}

async fn load_session(settings: &FusionSettings, session: &str) -> Result<TelemetryLogger> {
    let store = open_store(settings)?;
    TelemetryLogger::load(store.as_ref(), session)
        .await
        .with_context(|| format!("Failed to load session '{session}'"))
}

async fn cmd_summary(settings: &FusionSettings, session: &str, format: OutputFormat) -> Result<()> {
    let logger = load_session(settings, session).await?;
    let summary = logger.summary().await;

    if format == OutputFormat::Json {
        return print_json(&summary);
    }

    println!("session {session}");
    println!("  events:       {}", summary.total_events);
    println!("  evaluations:  {}", summary.evaluation_count);
    println!(
        "  fallbacks:    {} ({:.1}%)",
        summary.fallback_count,
        summary.fallback_rate * 100.0
    );
    if let Some(c) = summary.avg_confidence {
        println!("  confidence:   {c:.2}");
    }
    println!("  agent time:   {} ms", summary.total_execution_time_ms);
    println!("  duration:     {} ms", summary.session_duration_ms);
    for (agent, count) in &summary.agent_usage {
        println!("    {agent:<28} {count}");
    }
    Ok(())
}

async fn cmd_export(
    settings: &FusionSettings,
    session: &str,
    csv: Option<&Path>,
    url: Option<String>,
    token: Option<String>,
) -> Result<()> {
    if csv.is_none() && url.is_none() {
        bail!("Nothing to do: pass --csv <file> and/or --url <collector>");
    }
    let logger = load_session(settings, session).await?;

    if let Some(path) = csv {
        let rows = write_csv(&logger.events().await, path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {rows} rows to {}", path.display());
    }

    if let Some(url) = url {
        let mut exporter = HttpSessionExporter::new(url)?;
        if let Some(token) = token {
            exporter = exporter.with_token(token);
        }
        let record = logger.to_record().await?;
        exporter
            .export(&record)
            .await
            .with_context(|| format!("Failed to export session '{session}'"))?;
        println!("Exported session '{session}' to {}", exporter.endpoint());
    }
    Ok(())
}
