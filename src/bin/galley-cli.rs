//! Galley CLI - Command-line interface to the host scripting bridge
//!
//! Provides subcommands for checking the gateway connection, running
//! script bodies, evaluating expressions, summarising the document and
//! selection, and rolling back grouped submissions.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use galley::{BridgeConfig, Envelope, ExecutionOutcome, ExecutionRequest, SelectionDetail, UndoMode};

#[derive(Parser)]
#[command(name = "galley")]
#[command(about = "Transactional scripting bridge to a live page-layout host", long_about = None)]
struct Cli {
    /// Bridge config file (JSON); GALLEY_* env vars override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show gateway and document status
    Status,

    /// Submit a script body from a file, or stdin when omitted
    Run {
        /// Script file to submit
        script: Option<PathBuf>,

        /// Label for the host's undo history entry
        #[arg(long, default_value = "Agent script")]
        undo_name: String,

        /// Undo treatment: none, entire or fast_entire_script
        #[arg(long, default_value = "entire")]
        undo_mode: String,
    },

    /// Evaluate a read-only expression
    Eval {
        /// Expression in the host's scripting dialect
        expression: String,
    },

    /// Summarise the active document
    Overview,

    /// Describe the current selection
    Selection {
        /// Include contents, styles and link details
        #[arg(long)]
        full: bool,
    },

    /// Undo the most recent grouped submissions
    Rollback {
        /// Number of history entries to undo (1-50)
        #[arg(short = 'n', long, default_value = "1")]
        steps: u32,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => BridgeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => BridgeConfig::default(),
    };
    config.apply_env();

    let mut envelope = Envelope::from_config(&config);

    match cli.command {
        Commands::Status => {
            let status = envelope.status()?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        Commands::Run {
            script,
            undo_name,
            undo_mode,
        } => {
            let body = match script {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            let undo_mode: UndoMode = undo_mode.parse().map_err(anyhow::Error::msg)?;
            let outcome = envelope.submit(&ExecutionRequest::new(body, undo_name, undo_mode));
            print_outcome(&outcome)?;
        }

        Commands::Eval { expression } => {
            let outcome = envelope.evaluate_expression(&expression);
            print_outcome(&outcome)?;
        }

        Commands::Overview => {
            let outcome = envelope.document_overview();
            print_outcome(&outcome)?;
        }

        Commands::Selection { full } => {
            let detail = if full {
                SelectionDetail::Full
            } else {
                SelectionDetail::Basic
            };
            let outcome = envelope.selection_summary(detail);
            print_outcome(&outcome)?;
        }

        Commands::Rollback { steps } => {
            let report = envelope.rollback(steps.clamp(1, 50))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn print_outcome(outcome: &ExecutionOutcome) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    if !outcome.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
