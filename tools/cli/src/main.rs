//! querysync CLI - Drive a component's URL bindings from the command line.
//!
//! Loads a component definition, opens a simulated window at a URL and
//! shows how mounting and mutating the component rewrites the query string.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use querysync_common::PropertyPath;
use querysync_store::{HistoryEntry, MemoryHistory, Window};
use querysync_sync::{ComponentDefinition, EngineConfig, Mutation, MutationBatch, SyncEngine, SyncReport};

#[derive(Parser)]
#[command(name = "querysync")]
#[command(about = "querysync - Query string state synchronization")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Engine configuration file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Mount a component and print the pulled state.
    Mount {
        /// Component definition file.
        component: PathBuf,

        /// Initial URL search string, e.g. "?page=2".
        #[arg(short, long, default_value = "")]
        url: String,

        /// Instance parameter for alias placeholders (key=value).
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Mount a component, apply mutations and print the resulting URL.
    Run {
        /// Component definition file.
        component: PathBuf,

        /// Initial URL search string.
        #[arg(short, long, default_value = "")]
        url: String,

        /// Instance parameter for alias placeholders (key=value).
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Set a property (path=value). Values parse as JSON, else as a string.
        #[arg(short, long = "set")]
        sets: Vec<String>,

        /// Unset a property path.
        #[arg(long = "unset")]
        unsets: Vec<String>,
    },

    /// List a component's bindings.
    Inspect {
        /// Component definition file.
        component: PathBuf,

        /// Instance parameter for alias placeholders (key=value).
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Mount {
            component,
            url,
            params,
        } => cmd_mount(&component, &url, &params, config),

        Commands::Run {
            component,
            url,
            params,
            sets,
            unsets,
        } => cmd_run(&component, &url, &params, &sets, &unsets, config),

        Commands::Inspect { component, params } => cmd_inspect(&component, &params, &config),
    }
}

/// Load a component definition file.
fn load_component(path: &Path) -> Result<ComponentDefinition> {
    ComponentDefinition::from_path(path)
        .with_context(|| format!("Failed to load component file {}", path.display()))
}

/// Load engine configuration, falling back to defaults.
fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    let config: EngineConfig = serde_json::from_str(&json)
        .with_context(|| format!("Invalid engine config in {}", path.display()))?;
    debug!(?config, "Loaded engine config");
    Ok(config)
}

/// Parse `key=value` instance parameters.
fn parse_params(raw: &[String]) -> Result<HashMap<String, String>> {
    raw.iter()
        .map(|p| {
            let (key, value) = p
                .split_once('=')
                .with_context(|| format!("Parameter '{}' must look like key=value", p))?;
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Parse a `path=value` assignment into a set mutation.
fn parse_assignment(raw: &str) -> Result<Mutation> {
    let (path, value) = raw
        .split_once('=')
        .with_context(|| format!("Assignment '{}' must look like path=value", raw))?;
    let path = PropertyPath::parse(path).with_context(|| format!("Invalid path in '{}'", raw))?;
    Ok(Mutation::Set {
        path,
        value: parse_value(value),
    })
}

/// JSON if it parses, otherwise the raw text as a string.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// A mounted component with its simulated browser history.
struct Session {
    engine: SyncEngine,
    history: Arc<MemoryHistory>,
}

impl Session {
    fn mount(
        definition: &ComponentDefinition,
        url: &str,
        params: &HashMap<String, String>,
        config: EngineConfig,
    ) -> Result<Self> {
        let scope = definition
            .instantiate(params, config.default_history)
            .context("Failed to bind component")?;
        let (window, history) = Window::in_memory(url);
        let engine = SyncEngine::mount(scope, window, config).context("Failed to mount component")?;
        Ok(Self { engine, history })
    }

    fn run(&mut self, batches: Vec<MutationBatch>) -> Result<Vec<SyncReport>> {
        batches
            .into_iter()
            .map(|batch| self.engine.apply(batch).context("Sync failed"))
            .collect()
    }
}

#[derive(Serialize)]
struct RunOutput<'a> {
    state: &'a Value,
    search: String,
    form: String,
    reports: Vec<SyncReport>,
    history: Vec<HistoryEntry>,
}

/// Mount a component and print its state.
fn cmd_mount(component: &Path, url: &str, params: &[String], config: EngineConfig) -> Result<()> {
    let definition = load_component(component)?;
    let params = parse_params(params)?;
    info!("Mounting component: {}", definition.name);

    let session = Session::mount(&definition, url, &params, config)?;

    println!("{}", serde_json::to_string_pretty(session.engine.state())?);
    println!("{}", session.engine.window().search()?);

    Ok(())
}

/// Mount, apply each mutation as its own batch, print the outcome.
fn cmd_run(
    component: &Path,
    url: &str,
    params: &[String],
    sets: &[String],
    unsets: &[String],
    config: EngineConfig,
) -> Result<()> {
    let definition = load_component(component)?;
    let params = parse_params(params)?;

    let mut batches = Vec::new();
    for raw in sets {
        batches.push(vec![parse_assignment(raw)?]);
    }
    for raw in unsets {
        batches.push(vec![Mutation::unset(raw).with_context(|| format!("Invalid path '{}'", raw))?]);
    }

    let mut session = Session::mount(&definition, url, &params, config)?;
    info!("Applying {} batches to {}", batches.len(), definition.name);
    let reports = session.run(batches)?;

    let window = session.engine.window();
    let output = RunOutput {
        state: session.engine.state(),
        search: window.search()?,
        form: window.read(|store| store.serialize_form())?,
        reports,
        history: session.history.log(),
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

/// Print one line per binding.
fn cmd_inspect(component: &Path, params: &[String], config: &EngineConfig) -> Result<()> {
    let definition = load_component(component)?;
    let params = parse_params(params)?;
    let scope = definition
        .instantiate(&params, config.default_history)
        .context("Failed to bind component")?;

    println!("Component: {} ({} bindings)", scope.name(), scope.bindings().len());
    for binding in scope.bindings().iter() {
        println!(
            "  {} -> {} [{}] history={:?} keep={} except={}",
            binding.path(),
            binding.query_key(),
            binding.declared_type().describe(),
            binding.history(),
            binding.keeps(),
            binding
                .except()
                .map(|v| v.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }

    Ok(())
}
