//! Stepwise - drive multi-step workflows from the command line.
//!
//! Each invocation restores the workflow's persisted state, applies one
//! operation and saves the result.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use serde_json::Value;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stepwise::recovery::{ErrorClassifier, ErrorContext, FailureReport};
use stepwise::workflow::{
    parse_definition, StepData, StepRegistry, WorkflowDefinition, WorkflowEngine,
};
use stepwise::{FileStore, Settings};

/// Multi-step workflow engine
#[derive(Parser)]
#[command(name = "stepwise")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Directory holding persisted workflow state
    #[arg(long, global = true, env = "STEPWISE_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workflow definition file
    Validate {
        /// Workflow definition (YAML)
        definition: PathBuf,
    },

    /// Show the current state of a workflow
    Status {
        definition: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate the current step and advance
    Next { definition: PathBuf },

    /// Go back one step
    Back { definition: PathBuf },

    /// Jump to a step
    Goto { definition: PathBuf, step: String },

    /// Skip the current step
    Skip { definition: PathBuf },

    /// Merge values into a step's data
    Set {
        definition: PathBuf,

        /// Step id
        step: String,

        /// Assignments (key=value); values are parsed as JSON, else kept as text
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Discard saved progress
    Reset { definition: PathBuf },

    /// Classify a failure and suggest recovery options
    Classify {
        /// Failure message
        message: String,

        /// HTTP status code
        #[arg(long)]
        status: Option<u16>,

        /// The request never got a response
        #[arg(long)]
        no_response: bool,

        /// Error code (e.g. ECONNREFUSED)
        #[arg(long)]
        code: Option<String>,

        /// Service that failed
        #[arg(long)]
        service: Option<String>,

        /// Mark the failure as an input validation problem
        #[arg(long)]
        validation: bool,

        /// Step the failure happened at
        #[arg(long)]
        step: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load()?;

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new(&settings.general.log_level)
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    let data_dir = cli.data_dir.clone().or_else(|| settings.data_dir());

    match cli.command {
        Commands::Validate { definition } => cmd_validate(&definition),
        Commands::Status { definition, format } => {
            let engine = open_engine(&definition, &settings, data_dir).await?;
            print_status(&engine, &format)
        }
        Commands::Next { definition } => {
            let mut engine = open_engine(&definition, &settings, data_dir).await?;
            let moved = if engine.steps().next_after(&engine.current_step()).is_some() {
                engine.next_step()
            } else {
                engine.finish()
            };
            finish_transition(engine, moved, "next").await
        }
        Commands::Back { definition } => {
            let mut engine = open_engine(&definition, &settings, data_dir).await?;
            let moved = engine.previous_step();
            finish_transition(engine, moved, "back").await
        }
        Commands::Goto { definition, step } => {
            let mut engine = open_engine(&definition, &settings, data_dir).await?;
            let moved = engine.go_to_step(&step);
            finish_transition(engine, moved, "goto").await
        }
        Commands::Skip { definition } => {
            let mut engine = open_engine(&definition, &settings, data_dir).await?;
            let moved = engine.skip_step();
            if !moved && !engine.current_step_definition().can_skip {
                bail!("Step '{}' cannot be skipped", engine.current_step());
            }
            finish_transition(engine, moved, "skip").await
        }
        Commands::Set { definition, step, values } => {
            let data = parse_assignments(&values)?;
            let mut engine = open_engine(&definition, &settings, data_dir).await?;
            let updated = engine.update_step_data(&step, data);
            finish_transition(engine, updated, "set").await
        }
        Commands::Reset { definition } => {
            let mut engine = open_engine(&definition, &settings, data_dir).await?;
            engine.reset().await;
            println!("Reset '{}' to step '{}'", engine.name(), engine.current_step());
            Ok(())
        }
        Commands::Classify {
            message,
            status,
            no_response,
            code,
            service,
            validation,
            step,
            format,
        } => {
            let mut report = FailureReport::new(message);
            report.status = status;
            report.no_response = no_response;
            report.code = code;
            report.service = service;
            report.validation = validation;
            let context = ErrorContext { step, ..Default::default() };
            cmd_classify(&report, &context, &settings, &format)
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

fn load_definition(path: &Path) -> Result<WorkflowDefinition> {
    parse_definition(path).with_context(|| format!("Failed to load {}", path.display()))
}

async fn open_engine(
    path: &Path,
    settings: &Settings,
    data_dir: Option<PathBuf>,
) -> Result<WorkflowEngine> {
    let definition = load_definition(path)?;
    let data_dir = data_dir
        .context("Could not determine a data directory; pass --data-dir or set STEPWISE_DATA_DIR")?;

    // One operation per process; the final save happens on exit
    let mut config = settings.apply_to(definition.to_config());
    config.auto_save = false;

    let store = FileStore::new(data_dir.join("state"));
    let engine = WorkflowEngine::builder(config).sink(Arc::new(store)).build().await?;
    Ok(engine)
}

/// Save after a transition, or report why it was refused.
async fn finish_transition(engine: WorkflowEngine, succeeded: bool, operation: &str) -> Result<()> {
    let errors = engine.errors();
    let step = engine.current_step_definition().title.clone();
    let progress = engine.progress();
    let complete = engine.is_complete();

    if !engine.destroy().await {
        tracing::warn!(operation, "Workflow state was not saved");
    }

    if !succeeded {
        let reasons: Vec<String> =
            errors.iter().map(|(field, message)| format!("{}: {}", field, message)).collect();
        if reasons.is_empty() {
            bail!("Cannot {} from '{}'", operation, step);
        }
        bail!("Cannot {} from '{}'\n  {}", operation, step, reasons.join("\n  "));
    }

    if complete {
        println!("Now at '{}' ({}%, workflow complete)", step, progress);
    } else {
        println!("Now at '{}' ({}%)", step, progress);
    }
    Ok(())
}

fn parse_assignments(values: &[String]) -> Result<StepData> {
    let mut data = StepData::new();
    for assignment in values {
        let Some((key, raw)) = assignment.split_once('=') else {
            bail!("Expected key=value, got '{}'", assignment);
        };
        if key.is_empty() {
            bail!("Missing key in '{}'", assignment);
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        data.insert(key.to_string(), value);
    }
    Ok(data)
}

fn cmd_validate(path: &Path) -> Result<()> {
    let definition = load_definition(path)?;
    let config = definition.to_config();
    let registry = StepRegistry::new(&config.id, config.steps)?;

    println!("{} ({}): {} steps", definition.name, definition.id, registry.len());
    for step in registry.iter() {
        let mut notes = Vec::new();
        if step.can_skip {
            notes.push("optional".to_string());
        }
        if !step.dependencies.is_empty() {
            notes.push(format!("after {}", step.dependencies.join(", ")));
        }
        if notes.is_empty() {
            println!("  {}  {}", step.id, step.title);
        } else {
            println!("  {}  {} [{}]", step.id, step.title, notes.join("; "));
        }
    }
    Ok(())
}

fn print_status(engine: &WorkflowEngine, format: &str) -> Result<()> {
    let state = engine.state();

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&state)?);
        return Ok(());
    }

    println!("{} ({})", engine.name(), engine.id());
    let remaining = engine.estimated_time_remaining();
    if remaining > 0 {
        println!("Progress: {}% (~{} min remaining)", state.progress, remaining);
    } else {
        println!("Progress: {}%", state.progress);
    }
    println!();

    for step in engine.steps().iter() {
        let marker = if step.id == state.current_step {
            ">"
        } else if state.completed_steps.contains(&step.id) {
            "x"
        } else if state.skipped_steps.contains(&step.id) {
            "-"
        } else {
            " "
        };
        let optional = if step.can_skip { " (optional)" } else { "" };
        println!("  [{}] {}  {}{}", marker, step.id, step.title, optional);
    }

    if !state.errors.is_empty() {
        println!();
        println!("Errors:");
        for (field, message) in &state.errors {
            println!("  {}: {}", field, message);
        }
    }
    if !state.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for (field, message) in &state.warnings {
            println!("  {}: {}", field, message);
        }
    }
    if engine.is_complete() {
        println!();
        println!("Workflow complete");
    }
    Ok(())
}

fn cmd_classify(
    report: &FailureReport,
    context: &ErrorContext,
    settings: &Settings,
    format: &str,
) -> Result<()> {
    let classifier =
        ErrorClassifier::new().with_log_capacity(settings.recovery.error_log_capacity);
    let error = classifier.classify(report, context);
    let strategies = classifier.recovery_strategies(error.error_type);
    let fallback = classifier.fallback_workflow(&error, context);

    if format == "json" {
        let output = serde_json::json!({
            "error": error,
            "strategies": strategies,
            "fallback": fallback.map(|f| serde_json::json!({
                "id": f.id,
                "name": f.name,
                "steps": f.steps.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
            })),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let yes_no = |flag: bool| if flag { "yes" } else { "no" };
    println!("Type:        {}", error.error_type);
    println!("Severity:    {}", error.severity);
    println!("Retryable:   {}", yes_no(error.retryable));
    println!("Recoverable: {}", yes_no(error.recoverable));
    println!("Message:     {}", error.summary);
    println!();
    println!("Recovery options:");
    for (i, strategy) in strategies.iter().enumerate() {
        println!("  {}. {} ({}): {}", i + 1, strategy.label, strategy.id(), strategy.prompt);
    }
    if let Some(fallback) = fallback {
        println!();
        println!("Fallback:    {} ({})", fallback.name, fallback.id);
    }
    Ok(())
}

fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "stepwise", &mut io::stdout());
}
