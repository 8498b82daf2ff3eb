//! strato - declarative serverless HTTP API reconciliation CLI
//!
//! ## Commands
//!
//! - `plan`: validate a manifest and print the batched apply order
//! - `apply`: reconcile the manifest against the provider, persisting
//!   applied state between runs
//! - `state`: inspect the persisted applied-resource map
//!
//! Applies run against the built-in simulation provider; real cloud
//! backends plug in through `strato_core::Provider`. The state file makes
//! repeated applies idempotent either way: unchanged resources never
//! trigger a provider call.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use strato_core::fakes::MemoryProvider;
use strato_core::{
    schedule, ApiStack, ApplyOptions, DependencyGraph, Provider, Reconciler, StackConfig,
};
use strato_state::{FileStateStore, StateStore};

#[derive(Parser)]
#[command(name = "strato")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Declarative serverless HTTP API reconciliation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a manifest and print the batched apply order
    Plan {
        /// Path to the stack manifest (JSON)
        #[arg(short, long, default_value = "strato.json")]
        manifest: PathBuf,
    },

    /// Reconcile the manifest: create, update, or no-op each resource
    Apply {
        /// Path to the stack manifest (JSON)
        #[arg(short, long, default_value = "strato.json")]
        manifest: PathBuf,

        /// Path to the state file
        #[arg(short, long, default_value = ".strato/state.json")]
        state: PathBuf,

        /// Per-resource provider call timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },

    /// Print the persisted applied-resource map
    State {
        /// Path to the state file
        #[arg(short, long, default_value = ".strato/state.json")]
        state: PathBuf,
    },
}

/// One route entry in the manifest.
#[derive(Debug, Deserialize)]
struct RouteSpec {
    method: String,
    path: String,
}

/// The declarative manifest: one stack per file.
#[derive(Debug, Deserialize)]
struct Manifest {
    name: String,
    /// Content digest of the packaged artifact (packaging is external).
    artifact: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    routes: Vec<RouteSpec>,
    config: StackConfig,
}

impl Manifest {
    fn load(path: &PathBuf) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing manifest {}", path.display()))
    }

    fn into_stack(self) -> ApiStack {
        let mut stack = ApiStack::new(self.name, self.config, self.artifact);
        if let Some(alias) = self.alias {
            stack = stack.with_alias_name(alias);
        }
        if let Some(stage) = self.stage {
            stack = stack.with_stage_name(stage);
        }
        for route in self.routes {
            stack = stack.with_route(route.method, route.path);
        }
        stack
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    strato_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Plan { manifest } => plan(&manifest, cli.json),
        Commands::Apply {
            manifest,
            state,
            timeout,
        } => apply(&manifest, &state, timeout, cli.json).await,
        Commands::State { state } => show_state(&state).await,
    }
}

fn plan(manifest_path: &PathBuf, json: bool) -> Result<()> {
    let stack = Manifest::load(manifest_path)?.into_stack();
    let descriptors = stack.descriptors();
    let graph = DependencyGraph::build(&descriptors)?;
    let plan = schedule(&graph)?;

    if json {
        println!("{}", serde_json::to_string_pretty(plan.batches())?);
        return Ok(());
    }

    println!(
        "{} resources in {} batches:",
        plan.node_count(),
        plan.batches().len()
    );
    for (idx, batch) in plan.batches().iter().enumerate() {
        println!("  batch {idx}: {}", batch.join(", "));
    }
    Ok(())
}

async fn apply(
    manifest_path: &PathBuf,
    state_path: &PathBuf,
    timeout_secs: u64,
    json: bool,
) -> Result<()> {
    let stack = Manifest::load(manifest_path)?.into_stack();
    let descriptors = stack.descriptors();

    // The simulation provider starts empty on every invocation; adopting
    // the persisted state lets it update resources recorded by earlier
    // runs instead of failing their lookups.
    let provider = Arc::new(MemoryProvider::new());
    let store: Arc<dyn StateStore> = Arc::new(FileStateStore::new(state_path));
    provider.adopt(&store.load().await?);
    let reconciler = Reconciler::new(provider as Arc<dyn Provider>, store);

    let options = ApplyOptions {
        timeout: Duration::from_secs(timeout_secs),
        cancel: CancellationToken::new(),
    };

    // Let in-flight batch finish on Ctrl-C; nothing new starts after it.
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing current batch then stopping");
            cancel.cancel();
        }
    });

    let report = reconciler.reconcile(&descriptors, &options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(run_id = %report.run_id, "run complete");
        println!(
            "applied {} | noop {} | failed {} | skipped {}",
            report.applied.len(),
            report.noop.len(),
            report.failed.len(),
            report.skipped.len()
        );
        for (node, reason) in &report.failed {
            println!("  failed {node}: {reason}");
        }
        for node in &report.skipped {
            println!("  skipped {node}");
        }
    }

    if !report.success() {
        // Re-running after the cause is fixed is always safe: unchanged
        // nodes no-op on the next run.
        std::process::exit(1);
    }
    Ok(())
}

async fn show_state(state_path: &PathBuf) -> Result<()> {
    let store = FileStateStore::new(state_path);
    let state = store.load().await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
