//! mergebot - lands GitLab merge requests
//!
//! CLI binary running one merge job per invocation.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mergebot::merge::JobOutcome;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

#[derive(Parser)]
#[command(name = "mergebot")]
#[command(about = "Land GitLab merge requests once approvals, CI and embargoes allow")]
#[command(version)]
struct Cli {
    /// Config file (defaults to <config dir>/mergebot/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Try to merge one merge request
    Merge {
        /// Numeric project ID
        #[arg(long)]
        project: u64,

        /// Merge request IID within the project
        #[arg(long)]
        mr: u64,
    },

    /// Authentication management
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
}

#[derive(Subcommand)]
enum AuthAction {
    /// Test authentication
    Test,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "mergebot=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Merge { project, mr } => {
            let outcome = cli::run_merge(config, project, mr).await?;
            Ok(match outcome {
                JobOutcome::Merged { .. } | JobOutcome::Skipped(_) => ExitCode::SUCCESS,
                JobOutcome::Failed(_) | JobOutcome::Inconsistent { .. } => ExitCode::FAILURE,
            })
        }
        Commands::Auth {
            action: AuthAction::Test,
        } => {
            cli::run_auth_test(config).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
