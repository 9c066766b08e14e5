//! Concurrent process groups
//!
//! A [`ProcessGroup`] holds runnable entries in insertion order and runs them
//! all at once under one optional cancellation token. Member runs are
//! interleaved inside a single future; the children themselves run in
//! parallel as OS processes.
//!
//! ## Failure policy
//!
//! [`ProcessGroup::run_all`] fails fast: the first member failure is returned
//! immediately and the futures of the remaining members are dropped. For a
//! plain [`ManagedProcess`](crate::ManagedProcess) that releases its handle
//! and kills its child. A [`MemoizedProcess`](crate::MemoizedProcess) runs
//! on its own task and settles into its cache in the background.
//!
//! [`ProcessGroup::run_all_settled`] waits for every member instead and
//! reports each outcome.

use crate::cancel::CancelToken;
use crate::error::{GroupError, RunError};
use crate::managed::RunProcess;
use futures::future::{join_all, try_join_all};
use schema::ProcessId;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one member of a settled group run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    /// Member id
    pub id: ProcessId,
    /// Member command line
    pub command: String,
    /// How the member's run ended
    pub result: Result<(), RunError>,
}

impl ProcessReport {
    /// Whether the member succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// An ordered collection of runnable processes
///
/// Ids are not required to be unique; keeping them unique is up to whoever
/// adds the processes.
#[derive(Default, Clone)]
pub struct ProcessGroup {
    processes: Vec<Arc<dyn RunProcess>>,
}

impl fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("ids", &self.ids())
            .finish()
    }
}

impl ProcessGroup {
    /// Create an empty group
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a process; duplicates of an existing id are accepted
    pub fn add_process(&mut self, process: impl RunProcess + 'static) {
        let process: Arc<dyn RunProcess> = Arc::new(process);
        if self.processes.iter().any(|p| p.id() == process.id()) {
            warn!("Process id {} is already registered in this group", process.id());
        }
        self.processes.push(process);
    }

    /// Remove every process with `id`, returning how many were removed
    pub fn remove_process(&mut self, id: ProcessId) -> usize {
        let before = self.processes.len();
        self.processes.retain(|p| p.id() != id);
        before - self.processes.len()
    }

    /// First process registered with `id`
    pub fn get_process(&self, id: ProcessId) -> Option<Arc<dyn RunProcess>> {
        self.processes.iter().find(|p| p.id() == id).cloned()
    }

    /// Number of registered processes
    pub fn len(&self) -> usize {
        self.processes.len()
    }

    /// Whether the group has no processes
    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Ids in registration order
    pub fn ids(&self) -> Vec<ProcessId> {
        self.processes.iter().map(|p| p.id()).collect()
    }

    /// Run every process concurrently; succeed only if all of them do.
    ///
    /// # Errors
    ///
    /// Returns the first member failure observed, as a [`GroupError`]
    /// naming that member. If `token` fires, running members abort and the
    /// group fails with an abort-kind error.
    pub async fn run_all(&self, token: Option<&CancelToken>) -> Result<(), GroupError> {
        let members = self.processes.clone();
        info!("Running {} processes (fail fast)", members.len());

        let runs = members.iter().map(|process| async move {
            process.run(token).await.map_err(|source| GroupError {
                id: process.id(),
                command: process.command().to_string(),
                source,
            })
        });

        match try_join_all(runs).await {
            Ok(_) => {
                info!("All {} processes succeeded", members.len());
                Ok(())
            }
            Err(e) => {
                warn!("Process group failed: {}", e);
                Err(e)
            }
        }
    }

    /// Run every process concurrently and wait for all of them to settle.
    ///
    /// Reports come back in registration order.
    pub async fn run_all_settled(&self, token: Option<&CancelToken>) -> Vec<ProcessReport> {
        let members = self.processes.clone();
        info!("Running {} processes (settle all)", members.len());

        let runs = members.iter().map(|process| async move {
            let result = process.run(token).await;
            debug!("Process {} settled: {:?}", process.id(), result);
            ProcessReport {
                id: process.id(),
                command: process.command().to_string(),
                result,
            }
        });

        let reports = join_all(runs).await;
        let failed = reports.iter().filter(|r| !r.is_success()).count();
        info!(
            "Process group settled: {} succeeded, {} failed",
            reports.len() - failed,
            failed
        );
        reports
    }
}
