//! Conductor command-line host
//!
//! Loads a group file, runs it under one cancellation token and renders the
//! outcome for the terminal.

pub mod error;

pub use error::{CliError, Result};

use conductor_core::{
    build_group, load_group_from_toml_path, CancelToken, GroupError, GroupFile, ProcessAdapter,
    ProcessReport,
};
use schema::RunPolicy;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Command-line overrides for a group file's settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Policy to use instead of `settings.policy`
    pub policy: Option<RunPolicy>,
    /// Timeout to use instead of `settings.timeoutSecs`
    pub timeout: Option<Duration>,
}

impl RunOptions {
    /// Build options from the `run` subcommand flags
    pub fn from_flags(settle_all: bool, timeout_secs: Option<u64>) -> Result<Self> {
        if timeout_secs == Some(0) {
            return Err(CliError::InvalidArgument(
                "--timeout must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            policy: settle_all.then_some(RunPolicy::SettleAll),
            timeout: timeout_secs.map(Duration::from_secs),
        })
    }
}

/// How a group run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Fail-fast run: success or the first failure
    FailFast(std::result::Result<(), GroupError>),
    /// Settle-all run: one report per member, in group order
    Settled(Vec<ProcessReport>),
}

impl RunOutcome {
    /// Whether every process succeeded
    pub fn is_success(&self) -> bool {
        match self {
            RunOutcome::FailFast(result) => result.is_ok(),
            RunOutcome::Settled(reports) => reports.iter().all(ProcessReport::is_success),
        }
    }

    /// Human-readable summary, one line per settled member
    pub fn render(&self) -> String {
        match self {
            RunOutcome::FailFast(Ok(())) => "All processes succeeded".to_string(),
            RunOutcome::FailFast(Err(e)) => format!("FAILED\t{}", e),
            RunOutcome::Settled(reports) => {
                let mut lines: Vec<String> = reports
                    .iter()
                    .map(|r| match &r.result {
                        Ok(()) => format!("ok\t{}\t{}", r.id, r.command),
                        Err(e) => format!("FAILED\t{}\t{}\t{}", r.id, r.command, e),
                    })
                    .collect();
                let succeeded = reports.iter().filter(|r| r.is_success()).count();
                lines.push(format!("{}/{} processes succeeded", succeeded, reports.len()));
                lines.join("\n")
            }
        }
    }

    /// Convert to a CLI result, failing when any process failed
    pub fn into_result(self) -> Result<()> {
        match self {
            RunOutcome::FailFast(result) => {
                result.map_err(|e| CliError::CommandFailed(e.to_string()))
            }
            RunOutcome::Settled(reports) => {
                let failed = reports.iter().filter(|r| !r.is_success()).count();
                if failed == 0 {
                    Ok(())
                } else {
                    Err(CliError::CommandFailed(format!(
                        "{} of {} processes failed",
                        failed,
                        reports.len()
                    )))
                }
            }
        }
    }
}

/// Runs group files through a process adapter
#[derive(Clone)]
pub struct Runner {
    adapter: Arc<dyn ProcessAdapter>,
}

impl Runner {
    /// Create a runner spawning through `adapter`
    pub fn new(adapter: Arc<dyn ProcessAdapter>) -> Self {
        Self { adapter }
    }

    /// Load and validate a group file
    pub fn load(&self, path: &Path) -> Result<GroupFile> {
        Ok(load_group_from_toml_path(path)?)
    }

    /// Run every process in `file` under `token`
    ///
    /// The token is cancelled when the effective timeout elapses, so the
    /// caller observes the cancellation as well.
    pub async fn run(
        &self,
        file: &GroupFile,
        options: &RunOptions,
        token: &CancelToken,
    ) -> RunOutcome {
        let group = build_group(file, Arc::clone(&self.adapter));
        let policy = options.policy.unwrap_or(file.settings.policy);
        let timeout = options.timeout.or_else(|| file.settings.timeout());

        let timer = timeout.map(|limit| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!("Group timed out after {:?}, cancelling", limit);
                token.cancel();
            })
        });

        info!("Running {} processes ({:?})", group.len(), policy);
        let outcome = match policy {
            RunPolicy::FailFast => RunOutcome::FailFast(group.run_all(Some(token)).await),
            RunPolicy::SettleAll => RunOutcome::Settled(group.run_all_settled(Some(token)).await),
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        outcome
    }
}

/// JSON schema of the group file format
pub fn group_file_schema() -> Result<String> {
    let schema = schemars::schema_for!(GroupFile);
    Ok(serde_json::to_string_pretty(&schema)?)
}
