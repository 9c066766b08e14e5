//! One logical command and its run/cancel/cleanup lifecycle
//!
//! Each [`ManagedProcess::run`] call drives its own [`ProcessHandle`]:
//!
//! ```text
//! check token → spawn → race { cancellation, exit/error } → kill (on abort) → release handle
//! ```
//!
//! The handle lives in locals of that one call, so concurrent runs of the
//! same process never share or clobber each other's handle.

use crate::adapters::{ProcessAdapter, ProcessHandle};
use crate::cancel::{cancelled_or_pending, CancelToken};
use crate::error::RunError;
use crate::memo::RunCache;
use async_trait::async_trait;
use schema::{ProcessExit, ProcessId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Anything a process group can run: a plain or a memoized process
#[async_trait]
pub trait RunProcess: Send + Sync {
    /// Identifier used for lookups in a group
    fn id(&self) -> ProcessId;

    /// Command line of the process
    fn command(&self) -> &str;

    /// Run the command once, honoring `token` if one is given
    async fn run(&self, token: Option<&CancelToken>) -> Result<(), RunError>;
}

/// Split a command line on whitespace into program and arguments.
///
/// No quoting or escaping is understood: `sh -c "exit 1"` yields the
/// arguments `-c`, `"exit` and `1"`. Returns `None` for a blank command.
pub fn split_command(command: &str) -> Option<(&str, Vec<&str>)> {
    let mut parts = command.split_whitespace();
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// A command that can be run any number of times, concurrently or in turn
///
/// Clones refer to the same logical process: they share the command, the
/// adapter and the run cache used by [`memoize`](crate::memoize).
#[derive(Clone)]
pub struct ManagedProcess {
    id: ProcessId,
    command: Arc<str>,
    adapter: Arc<dyn ProcessAdapter>,
    pub(crate) cache: RunCache,
}

impl fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("id", &self.id)
            .field("command", &self.command)
            .finish_non_exhaustive()
    }
}

/// How the race between the child and its token ended
enum Settled {
    Exited(crate::Result<ProcessExit>),
    Cancelled,
}

impl ManagedProcess {
    /// Create a process for `command`, spawned through `adapter`
    pub fn new(
        id: ProcessId,
        command: impl Into<String>,
        adapter: Arc<dyn ProcessAdapter>,
    ) -> Self {
        Self {
            id,
            command: Arc::from(command.into()),
            adapter,
            cache: RunCache::default(),
        }
    }

    /// Get the process id
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Get the command line
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Spawn the command and wait for it, without any memoization.
    ///
    /// # Errors
    ///
    /// - [`RunError::AbortedBeforeStart`] if `token` is already cancelled;
    ///   nothing is spawned.
    /// - [`RunError::Spawn`] if the command is blank, cannot be started, or
    ///   its handle reports an error.
    /// - [`RunError::NonZeroExit`] if the child exits with anything but 0.
    /// - [`RunError::Aborted`] if `token` fires while the child runs; the
    ///   child is killed first.
    ///
    /// The handle is released before this returns on every path.
    pub async fn run(&self, token: Option<&CancelToken>) -> Result<(), RunError> {
        if token.is_some_and(CancelToken::is_cancelled) {
            debug!("Process {} cancelled before start", self.id);
            return Err(RunError::AbortedBeforeStart);
        }

        let (program, args) = split_command(&self.command)
            .ok_or_else(|| RunError::Spawn(format!("process {} has an empty command", self.id)))?;

        let mut handle = self.adapter.spawn(program, &args).await.map_err(|e| {
            error!("Process {} failed to spawn: {}", self.id, e);
            RunError::Spawn(e.to_string())
        })?;
        debug!("Process {} running as pid {}", self.id, handle.pid());

        let settled = Self::settle(&mut handle, token).await;
        let outcome = match settled {
            Settled::Cancelled => {
                if let Err(e) = handle.kill().await {
                    warn!("Failed to kill process {} (pid {}): {}", self.id, handle.pid(), e);
                }
                debug!("Process {} aborted", self.id);
                Err(RunError::Aborted)
            }
            Settled::Exited(Ok(exit)) if exit.is_success() => {
                debug!("Process {} finished: {}", self.id, exit);
                Ok(())
            }
            Settled::Exited(Ok(exit)) => {
                debug!("Process {} failed: {}", self.id, exit);
                Err(RunError::NonZeroExit(exit))
            }
            Settled::Exited(Err(e)) => {
                error!("Process {} reported an error: {}", self.id, e);
                Err(RunError::Spawn(e.to_string()))
            }
        };

        drop(handle);
        outcome
    }

    /// Completion latch: the first of {cancellation, exit, error} wins, and
    /// cancellation wins ties so an aborted run never reports success.
    async fn settle(handle: &mut Box<dyn ProcessHandle>, token: Option<&CancelToken>) -> Settled {
        tokio::select! {
            biased;
            () = cancelled_or_pending(token) => Settled::Cancelled,
            exit = handle.wait() => Settled::Exited(exit),
        }
    }
}

#[async_trait]
impl RunProcess for ManagedProcess {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn command(&self) -> &str {
        &self.command
    }

    async fn run(&self, token: Option<&CancelToken>) -> Result<(), RunError> {
        ManagedProcess::run(self, token).await
    }
}
