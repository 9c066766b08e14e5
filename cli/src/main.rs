//! Conductor CLI binary
//!
//! Runs the processes of a group file as cancellable children.

#![allow(unused_crate_dependencies)]

use clap::{Parser, Subcommand};
use cli::{group_file_schema, RunOptions, Runner};
use conductor_core::{CancelToken, UnixProcessAdapter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, warn};

#[derive(Parser)]
#[command(name = "conductor")]
#[command(about = "Run groups of child processes under shared cancellation")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every process in a group file
    Run {
        /// Path to the group TOML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// Wait for every process and report each outcome instead of failing fast
        #[arg(long)]
        settle_all: bool,
        /// Cancel the group after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },
    /// Validate a group file without running it
    Check {
        /// Path to the group TOML file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Print the JSON schema of the group file format
    Schema,
}

#[tokio::main]
async fn main() -> conductor_core::Result<()> {
    let cli = Cli::parse();
    conductor_core::utils::init_tracing(&cli.log_level)?;

    let runner = Runner::new(Arc::new(UnixProcessAdapter::new()));

    let result = match &cli.command {
        Commands::Run {
            file,
            settle_all,
            timeout,
        } => run_file(&runner, file, *settle_all, *timeout).await,
        Commands::Check { file } => runner.load(file).map(|group| {
            println!("{}: {} processes ok", file.display(), group.processes.len());
        }),
        Commands::Schema => group_file_schema().map(|schema| println!("{}", schema)),
    };

    if let Err(e) = result {
        error!("Command failed [{}]: {}", e.code(), e);
        std::process::exit(1);
    }

    Ok(())
}

async fn run_file(
    runner: &Runner,
    path: &Path,
    settle_all: bool,
    timeout: Option<u64>,
) -> cli::Result<()> {
    let options = RunOptions::from_flags(settle_all, timeout)?;
    let group = runner.load(path)?;

    let token = CancelToken::new();
    let interrupt = {
        let token = token.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running processes");
                token.cancel();
            }
        })
    };

    let outcome = runner.run(&group, &options, &token).await;
    interrupt.abort();

    println!("{}", outcome.render());
    outcome.into_result()
}
