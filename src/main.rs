//! Runa CLI - DAG task workflow engine

use std::path::Path;

use clap::{Parser, Subcommand};
use colored::Colorize;

use runa::error::FixSuggestion;
use runa::{Engine, EngineConfig, Envelope, RunaError, TaskRegistry, Workflow, WorkflowEvent};

#[derive(Parser)]
#[command(name = "runa")]
#[command(about = "Runa - DAG task workflow engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a workflow descriptor (JSON or YAML)
    Run {
        /// Path to the descriptor file
        file: String,

        /// Runners kept alive when idle
        #[arg(long, default_value_t = 1)]
        min: usize,

        /// Ceiling on concurrently owned runners
        #[arg(long, default_value_t = 4)]
        max: usize,

        /// Emit wire envelopes as JSON lines instead of human output
        #[arg(long)]
        json: bool,
    },

    /// Validate a workflow descriptor (parse + graph checks only)
    Validate {
        /// Path to the descriptor file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            file,
            min,
            max,
            json,
        } => run_workflow(&file, min, max, json).await,
        Commands::Validate { file } => validate_workflow(&file),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn load_workflow(file: &str) -> Result<Workflow, RunaError> {
    if !Path::new(file).exists() {
        return Err(RunaError::WorkflowNotFound {
            path: file.to_string(),
        });
    }
    let source = std::fs::read_to_string(file)?;
    Workflow::parse(&source)
}

fn validate_workflow(file: &str) -> Result<(), RunaError> {
    let workflow = load_workflow(file)?;
    let graph = runa::validate(&workflow)?;

    println!(
        "{} {} is valid ({} tasks)",
        "✓".green(),
        file,
        graph.len()
    );
    Ok(())
}

async fn run_workflow(file: &str, min: usize, max: usize, json: bool) -> Result<(), RunaError> {
    let workflow = load_workflow(file)?;

    let config = EngineConfig {
        pool_min: min,
        pool_max: max,
        ..Default::default()
    };
    let engine = Engine::new(config, TaskRegistry::with_builtins()).await?;
    let mut stream = engine.execute(&workflow)?;

    let total = workflow.len();
    let mut completed = 0usize;
    if !json {
        println!(
            "{} Running workflow with {} tasks...\n",
            "→".cyan(),
            total
        );
    }

    let run_id = stream.run_id().to_string();
    let mut outcome = Ok(());

    while let Some(event) = stream.next().await {
        match event {
            Ok(WorkflowEvent::Intermediate { task_id, output }) => {
                completed += 1;
                if json {
                    let envelope = Envelope::intermediate(&run_id, &task_id, &output);
                    println!("{}", serde_json::to_string(&envelope)?);
                } else {
                    println!(
                        "  {} {} {} {}",
                        format!("[{}/{}]", completed, total).green(),
                        task_id,
                        "✓".green(),
                        format!("({} bytes)", output.len()).dimmed()
                    );
                }
            }
            Ok(WorkflowEvent::Final { results }) => {
                if json {
                    let envelope = Envelope::final_result(&run_id, &results);
                    println!("{}", serde_json::to_string(&envelope)?);
                } else {
                    println!("\n{} Done: {} results\n", "✓".green(), results.len());
                }
            }
            Err(e) => {
                if json {
                    let envelope = Envelope::failure(&run_id, &e);
                    println!("{}", serde_json::to_string(&envelope)?);
                }
                outcome = Err(e);
                break;
            }
        }
    }

    engine.shutdown();
    outcome
}
