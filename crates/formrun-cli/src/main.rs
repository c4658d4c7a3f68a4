//! formrun CLI
//!
//! Checks workflow documents and dry-runs them over dataset files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use formrun_core::collaborators::{ActionExecutor, EventDetector};
use formrun_core::condition::{ElementState, SurfaceInspector};
use formrun_core::interruption::Event;
use formrun_core::progress::TracingProgressSink;
use formrun_core::workflow::{Dataset, Step};
use formrun_core::{
    analyze_workflow, Collaborators, EngineConfig, EngineResult, ExecutionDriver, RunInput,
    RunOptions, RunOutcome, Workflow,
};

#[derive(Parser)]
#[command(name = "formrun")]
#[command(version, about = "formrun workflow tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the structure of a workflow document
    Check {
        /// Workflow file (JSON or YAML)
        workflow: PathBuf,
    },

    /// Walk a workflow over a dataset without performing any action
    DryRun {
        /// Workflow file (JSON or YAML)
        workflow: PathBuf,

        /// Dataset file: a JSON array of rows, or an object with `primary`
        /// and `details` datasets
        #[arg(short, long)]
        data: PathBuf,

        /// Primary rows to skip
        #[arg(long, default_value_t = 0)]
        skip_rows: usize,

        /// Maximum primary rows to process
        #[arg(long)]
        limit_rows: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,formrun_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    match cli.command {
        Commands::Check { workflow } => check(&workflow),
        Commands::DryRun {
            workflow,
            data,
            skip_rows,
            limit_rows,
        } => dry_run(&workflow, &data, skip_rows, limit_rows).await,
    }
}

fn check(path: &Path) -> Result<ExitCode> {
    let workflow: Workflow = load_document(path)?;
    let (tables, issues) = analyze_workflow(&workflow);

    println!("Workflow: {}", workflow.name);
    println!("  steps:       {}", workflow.steps.len());
    println!("  loops:       {}", tables.loop_pairs.len());
    println!("  if blocks:   {}", tables.if_to_end.len());
    println!("  labels:      {}", tables.label_map.len());
    println!("  handlers:    {}", workflow.handlers.len());

    if issues.is_empty() {
        println!("No structural issues");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} structural issue(s):", issues.len());
    for issue in &issues {
        println!("  - {}", issue);
    }
    Ok(ExitCode::FAILURE)
}

async fn dry_run(
    workflow_path: &Path,
    data_path: &Path,
    skip_rows: usize,
    limit_rows: Option<usize>,
) -> Result<ExitCode> {
    let mut workflow: Workflow = load_document(workflow_path)?;
    let input = load_input(data_path)?;
    let config = EngineConfig::from_env().context("Failed to load FORMRUN_ configuration")?;

    tracing::info!(
        workflow = %workflow.name,
        rows = input.primary.len(),
        details = input.details.len(),
        "Starting dry run"
    );

    let collaborators = Collaborators::new(
        Arc::new(InertExecutor),
        Arc::new(InertSurface),
        Arc::new(InertDetector),
    );
    let driver = ExecutionDriver::new(collaborators, Arc::new(TracingProgressSink), config);
    let options = RunOptions {
        skip_rows,
        limit_rows,
        dry_run: true,
        ..RunOptions::default()
    };

    let report = driver.run(&mut workflow, input, options).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(match report.outcome {
        RunOutcome::Completed { .. } => ExitCode::SUCCESS,
        RunOutcome::Stopped | RunOutcome::Failed { .. } => ExitCode::FAILURE,
    })
}

/// Load a JSON or YAML document, chosen by file extension.
fn load_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    if is_yaml {
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML from {}", path.display()))
    } else {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON from {}", path.display()))
    }
}

/// Load run input. A bare array of rows becomes a primary dataset named
/// after the file stem.
fn load_input(path: &Path) -> Result<RunInput> {
    let value: serde_json::Value = load_document(path)?;
    if value.is_array() {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "data".to_string());
        let rows = serde_json::from_value(value)
            .with_context(|| format!("Rows in {} must be objects", path.display()))?;
        return Ok(RunInput::new(Dataset::new(name, rows)));
    }

    serde_json::from_value(value)
        .with_context(|| format!("Failed to read datasets from {}", path.display()))
}

/// Executor for dry runs; never reached for ordinary steps.
struct InertExecutor;

#[async_trait]
impl ActionExecutor for InertExecutor {
    async fn execute(&self, step: &Step, value: Option<&str>) -> EngineResult<()> {
        tracing::debug!(step = %step.display_name(), value, "Inert executor");
        Ok(())
    }
}

/// Surface that shows no elements.
struct InertSurface;

#[async_trait]
impl SurfaceInspector for InertSurface {
    async fn inspect(&self, _target: &str) -> EngineResult<ElementState> {
        Ok(ElementState::missing())
    }
}

/// Detector that never sees an interruption.
struct InertDetector;

#[async_trait]
impl EventDetector for InertDetector {
    async fn detect(&self) -> EngineResult<Vec<Event>> {
        Ok(Vec::new())
    }

    async fn press(&self, _event: &Event, _control: &str) -> EngineResult<()> {
        Ok(())
    }

    async fn dismiss(&self, _event: &Event) -> EngineResult<()> {
        Ok(())
    }
}
