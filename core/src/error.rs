//! Core error types and utilities

use schema::{ProcessExit, ProcessId};
use thiserror::Error;

/// Why a single process run did not succeed
///
/// Every variant is terminal for the run that produced it; nothing here is
/// retried by the library. The type is `Clone` because a memoized outcome is
/// handed to every caller that joins it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunError {
    /// The token was already cancelled, so nothing was spawned
    #[error("Aborted before start: cancellation was requested before the process was spawned")]
    AbortedBeforeStart,

    /// The token fired while the process was running and the process was killed
    #[error("Aborted: the process was killed after cancellation")]
    Aborted,

    /// The process could not be started, or its handle reported an error
    #[error("Spawn error: {0}")]
    Spawn(String),

    /// The process ran but exited with a non-zero code or died from a signal
    #[error("Non-zero exit: {0}")]
    NonZeroExit(ProcessExit),
}

impl RunError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            RunError::AbortedBeforeStart => "RUN001",
            RunError::Aborted => "RUN002",
            RunError::Spawn(_) => "RUN003",
            RunError::NonZeroExit(_) => "RUN004",
        }
    }

    /// Whether the run ended because its cancellation token fired
    pub fn is_abort(&self) -> bool {
        matches!(self, RunError::AbortedBeforeStart | RunError::Aborted)
    }
}

/// The member failure that failed a whole group run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("process {id} ({command}) failed: {source}")]
pub struct GroupError {
    /// Id of the failing member
    pub id: ProcessId,
    /// Command of the failing member
    pub command: String,
    /// What went wrong with that member's run
    #[source]
    pub source: RunError,
}

impl GroupError {
    /// Get error code of the underlying run failure
    pub fn code(&self) -> &'static str {
        self.source.code()
    }
}

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("Process spawn error: {0}")]
    ProcessSpawn(String),

    #[error("Process wait error: {0}")]
    ProcessWait(String),

    #[error("Process signal error: {0}")]
    ProcessSignal(String),

}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::ValidationError(_) => "CORE002",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::ProcessSpawn(_) => "CORE004",
            CoreError::ProcessWait(_) => "CORE005",
            CoreError::ProcessSignal(_) => "CORE006",
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;
