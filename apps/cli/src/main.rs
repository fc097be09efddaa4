//! Lodestar CLI - runs analysis tools against a local repository
//!
//! This CLI provides a `lode` command that drives the Lodestar orchestrator:
//! every run goes through the middleware pipeline, the tool runner and, when
//! configured, telemetry.

mod commands;
mod context;

use clap::{Parser, Subcommand};
use lodestar_orchestrator::ToolId;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Lodestar CLI - orchestrated repository analysis
#[derive(Parser, Debug)]
#[command(name = "lode", author, version, about = "Lodestar - orchestrated repository analysis")]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Workspace directory (defaults to the current directory)
    #[arg(short = 'w', long, global = true)]
    workspace: Option<PathBuf>,

    /// Configuration file (defaults to <workspace>/.lodestar/config.toml)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one tool and print its findings
    Run {
        /// Tool id (e.g. comments, lint, dead-code)
        tool: ToolId,

        /// Restrict the scan to this file or directory
        #[arg(long)]
        path: Option<PathBuf>,

        /// Tool argument as key=value (repeatable)
        #[arg(long = "arg", value_parser = commands::run::parse_key_val)]
        args: Vec<(String, String)>,

        /// Use the scripted mock model provider
        #[arg(long)]
        mock_model: bool,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered tools
    Tools {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration as TOML
    Config,

    /// Summarize the telemetry log
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cx = context::CliContext::resolve(args.workspace, args.config)?;

    match args.command {
        Command::Run { tool, path, args, mock_model, json } => {
            commands::run::execute(&cx, tool, path, args, mock_model, json).await?;
        }
        Command::Tools { json } => {
            commands::tools::execute(json)?;
        }
        Command::Config => {
            commands::config::execute(&cx)?;
        }
        Command::Stats { json } => {
            commands::stats::execute(&cx, json)?;
        }
    }

    Ok(())
}
