//! statechart - statechart interpreter host
//!
//! Loads a statechart document, validates it, and drives it from the command
//! line or an interactive shell.

mod commands;
mod config;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "statechart")]
#[command(about = "Statechart interpreter with run-to-completion semantics", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (YAML)
    #[arg(short, long, env = "STATECHART_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a document
    Validate {
        /// Document file (JSON or YAML)
        document: PathBuf,
    },

    /// Print the states active after start
    Names {
        /// Document file (JSON or YAML)
        document: PathBuf,
        /// Leaf states only
        #[arg(long)]
        compressed: bool,
    },

    /// Run a document against a sequence of events
    Run {
        /// Document file (JSON or YAML)
        document: PathBuf,
        /// Event to submit, as name or name=<json>. Repeatable.
        #[arg(short, long = "event")]
        events: Vec<String>,
        /// Advance the virtual clock after the last event (milliseconds)
        #[arg(long)]
        advance_ms: Option<u64>,
        /// Print every active state in the summary, not only leaves
        #[arg(long)]
        full: bool,
    },

    /// Start an interactive session
    Repl {
        /// Document file (JSON or YAML)
        document: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            // An explicitly named config file must load
            if cli.config.is_some() {
                eprintln!("{}: {}", "Error".red(), e);
                std::process::exit(1);
            }
            Config::default()
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.output.log_level)),
        )
        .init();

    if let Some(path) = &cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }
    tracing::debug!(
        "  max_microsteps: {}, history file: {}",
        config.interpreter.max_microsteps,
        config.repl.history_path().display()
    );

    if !config.output.color {
        colored::control::set_override(false);
    }

    let result = match cli.command {
        Commands::Validate { document } => commands::validate(&document),
        Commands::Names {
            document,
            compressed,
        } => commands::names(&document, compressed, &config),
        Commands::Run {
            document,
            events,
            advance_ms,
            full,
        } => commands::run(
            &document,
            &events,
            advance_ms,
            config.output.compressed && !full,
            &config,
        ),
        Commands::Repl { document } => commands::load_document(&document)
            .and_then(|doc| repl::run(doc, &config))
            .map(|_| String::new()),
    };

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{}", output);
            }
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }
}
