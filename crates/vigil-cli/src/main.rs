//! Vigil - infrastructure health checks
//!
//! The `vigil` command runs a battery of diagnostic probes against a target
//! and reports a weighted health score.
//!
//! ## Commands
//!
//! - `run`: Execute all checks and score the target
//! - `validate`: Load and compile check definitions without running them
//! - `history`: List recorded runs
//! - `show`: Show one recorded run

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};

use vigil_core::{
    ArtifactReporter, CategoryId, DefinitionFilter, DefinitionSource, EngineConfig, Orchestrator,
    PluginRegistry, RunOutcome, RunStatus, Severity,
};
use vigil_probes::{DirectoryDefinitionSource, FileDiscovery, ProcessRunner};
use vigil_state::fakes::MemoryRunStore;
use vigil_state::{RunId, RunStore, SurrealRunStore};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Infrastructure health checks with weighted scoring", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines and JSON command output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every check against the target and score it
    Run(RunArgs),

    /// Load and compile check definitions without running them
    Validate {
        /// Directory of check definition files (*.json)
        #[arg(short, long, default_value = "checks")]
        definitions: PathBuf,
    },

    /// List recorded runs, newest first
    History {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Show a recorded run
    Show {
        /// Run ID
        run_id: String,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct RunArgs {
    /// Directory of check definition files (*.json)
    #[arg(short, long, default_value = "checks")]
    definitions: PathBuf,

    /// Inventory file describing the target (JSON)
    #[arg(short, long)]
    inventory: PathBuf,

    /// Engine configuration file (TOML or JSON)
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of checks running at once
    #[arg(long, env = "VIGIL_MAX_PARALLEL")]
    max_parallel: Option<usize>,

    /// Per-check timeout in seconds
    #[arg(long, env = "VIGIL_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Only run checks in this category (repeatable)
    #[arg(long = "category")]
    categories: Vec<String>,

    /// Lowest issue severity that makes the run exit non-zero
    #[arg(long, value_parser = parse_severity)]
    fail_on: Option<Severity>,

    /// Write run_summary.json and run_summary.md into this directory
    #[arg(long)]
    report_dir: Option<PathBuf>,

    /// Where to record the run
    #[arg(long, value_enum, default_value_t = StoreKind::Surreal)]
    store: StoreKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// Keep the run in memory only
    Memory,
    /// SurrealDB (SURREALDB_URL, or a local database under .vigil/)
    Surreal,
}

fn parse_severity(s: &str) -> std::result::Result<Severity, String> {
    serde_json::from_value(serde_json::Value::String(s.to_lowercase()))
        .map_err(|_| format!("unknown severity '{s}' (critical, high, medium, low)"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    vigil_core::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run(args) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, cancelling run");
                    on_signal.cancel();
                }
            });

            let code = cmd_run(&args, cli.json, &cancel).await?;
            std::process::exit(code);
        }
        Commands::Validate { definitions } => cmd_validate(&definitions, cli.json).await,
        Commands::History { limit } => {
            let store = open_surreal().await?;
            cmd_history(&store, limit, cli.json).await
        }
        Commands::Show { run_id } => {
            let store = open_surreal().await?;
            cmd_show(&store, &run_id, cli.json).await
        }
    }
}

async fn open_surreal() -> Result<SurrealRunStore> {
    SurrealRunStore::from_env()
        .await
        .context("Failed to connect to Vigil database")
}

/// Resolve the engine configuration: file first, then flags.
fn build_config(args: &RunArgs) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    if let Some(n) = args.max_parallel {
        config.max_parallel = n;
    }
    if let Some(secs) = args.timeout_secs {
        config.timeout_secs = secs;
    }
    if !args.categories.is_empty() {
        config.categories = args
            .categories
            .iter()
            .map(|c| CategoryId::from(c.as_str()))
            .collect();
    }
    if let Some(severity) = args.fail_on {
        config.fail_on = severity;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Execute a run and return the process exit code.
async fn cmd_run(args: &RunArgs, json: bool, cancel: &CancellationToken) -> Result<i32> {
    let config = build_config(args)?;
    let fail_on = config.fail_on;

    let store: Arc<dyn RunStore> = match args.store {
        StoreKind::Memory => Arc::new(MemoryRunStore::new()),
        StoreKind::Surreal => Arc::new(open_surreal().await?),
    };

    let registry = PluginRegistry::new().with_command_runner(Arc::new(ProcessRunner::new()));
    let mut orchestrator = Orchestrator::new(
        config,
        Arc::new(FileDiscovery::new(&args.inventory)),
        Arc::new(DirectoryDefinitionSource::new(&args.definitions)),
        registry,
    )
    .with_store(store);
    if let Some(dir) = &args.report_dir {
        orchestrator = orchestrator.with_reporter(Arc::new(ArtifactReporter::new(dir)));
    }

    let outcome = orchestrator.run(cancel).await;
    print_outcome(&outcome, json)?;

    let code = outcome.summary.exit_code(fail_on);
    info!(run_id = %outcome.summary.run_id, exit_code = code, "run complete");
    Ok(code)
}

fn print_outcome(outcome: &RunOutcome, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }

    let summary = &outcome.summary;
    println!("Run ID: {}", summary.run_id);
    if let Some(target) = &summary.target {
        println!("Target: {}", target);
    }
    match summary.status {
        RunStatus::Completed => println!("Status: completed"),
        RunStatus::Failed => println!(
            "Status: failed ({})",
            summary.failure_reason.as_deref().unwrap_or("unknown")
        ),
    }
    println!("Duration: {}ms", summary.duration_ms());

    if let Some(scores) = &outcome.scores {
        println!("Score: {}/100", scores.overall);
        println!();
        for c in &scores.categories {
            println!(
                "  {:<16} {:>3}  ({}/{} passed)",
                c.category.as_str(),
                c.value,
                c.checks_passed,
                c.checks_executed
            );
        }
    }

    let issues: Vec<_> = outcome.results.iter().flat_map(|r| r.issues.iter()).collect();
    if !issues.is_empty() {
        println!();
        println!("Issues ({}):", issues.len());
        for issue in issues {
            println!(
                "  [{}] {} {}: {}",
                issue.severity, issue.check_id, issue.affected_object, issue.title
            );
        }
    }

    for w in &summary.warnings {
        println!("warning: {}", w);
    }
    Ok(())
}

/// Load every definition file and report what was found.
async fn cmd_validate(definitions: &Path, json: bool) -> Result<()> {
    let filter = DefinitionFilter {
        include_disabled: true,
        ..DefinitionFilter::all()
    };
    let defs = DirectoryDefinitionSource::new(definitions)
        .load(&filter)
        .await
        .with_context(|| format!("Invalid definitions in {}", definitions.display()))?;

    if json {
        let listing: Vec<_> = defs
            .iter()
            .map(|d| {
                serde_json::json!({
                    "check_id": d.id,
                    "category": d.category,
                    "severity": d.severity,
                    "enabled": d.enabled,
                    "rules": d.rules.len(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for d in &defs {
        let state = if d.enabled { "" } else { " (disabled)" };
        println!(
            "  {} [{}/{}] {} rule(s){}",
            d.id,
            d.category,
            d.severity,
            d.rules.len(),
            state
        );
    }
    println!("{} definition(s) OK", defs.len());
    Ok(())
}

async fn cmd_history(store: &dyn RunStore, limit: usize, json: bool) -> Result<()> {
    let runs = store.list_runs(Some(limit)).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }
    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    for run in runs {
        let score = run
            .overall_score
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {}  {:<9}  score {}",
            run.run_id,
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            run.status.as_str(),
            score
        );
    }
    Ok(())
}

async fn cmd_show(store: &dyn RunStore, run_id: &str, json: bool) -> Result<()> {
    let id = RunId::from(run_id);
    let run = store
        .get_run(&id)
        .await
        .with_context(|| format!("Run '{}' not found", run_id))?;
    let results = store.get_results(&id).await?;
    let issues = store.get_issues(&id).await?;
    let scores = store.get_scores(&id).await?;

    if json {
        let doc = serde_json::json!({
            "run": run,
            "results": results,
            "issues": issues,
            "scores": scores,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("run {}", run.run_id);
    println!("Status: {}", run.status);
    println!("Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(score) = run.overall_score {
        println!("Score: {}/100", score);
    }
    println!();
    for s in &scores {
        println!("  {:<16} {:>3}", s.category, s.value);
    }
    if !results.is_empty() {
        println!();
        for r in &results {
            println!(
                "  {:<8} {} ({}ms, {} issue(s))",
                r.status, r.check_id, r.duration_ms, r.issue_count
            );
        }
    }
    for i in &issues {
        println!("  [{}] {} {}: {}", i.severity, i.check_id, i.affected_object, i.title);
    }
    Ok(())
}
