//! Process specification and exit types for conductor process groups
//!
//! These types describe what a group file declares (one [`ProcessSpec`] per
//! child command plus shared [`GroupSettings`]) and what a finished child
//! reports back ([`ProcessExit`]).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Numeric identifier of a process within a group.
///
/// Ids are assigned by whoever builds the group; uniqueness is not enforced
/// by the coordinator itself.
pub type ProcessId = u64;

/// Declaration of one child command in a group file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSpec {
    /// Identifier used to look the process up in its group
    pub id: ProcessId,

    /// Command line, split on whitespace into program and arguments.
    ///
    /// Quoting and shell metacharacters are not interpreted, so arguments
    /// cannot contain embedded whitespace.
    pub command: String,

    /// Whether repeated runs under the same cancellation token reuse the
    /// first successful outcome
    #[serde(default)]
    pub memoize: bool,
}

/// How a group aggregates the outcomes of its members
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RunPolicy {
    /// Report the first failure as soon as it is observed
    #[default]
    FailFast,
    /// Wait for every member to settle and report each outcome
    SettleAll,
}

/// Settings shared by every process in a group file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettings {
    /// Aggregation policy for the group run
    #[serde(default)]
    pub policy: RunPolicy,

    /// Cancel the whole group after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl GroupSettings {
    /// Get the group timeout as a Duration
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// How a child process ended
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExit {
    /// Process ID of the child
    pub pid: u32,
    /// Exit code, absent when the process was killed by a signal
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Signal that terminated the process (Unix only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
}

impl ProcessExit {
    /// Exit with the given code
    pub const fn with_code(pid: u32, code: i32) -> Self {
        Self {
            pid,
            exit_code: Some(code),
            signal: None,
        }
    }

    /// Termination by the given signal
    pub const fn with_signal(pid: u32, signal: i32) -> Self {
        Self {
            pid,
            exit_code: None,
            signal: Some(signal),
        }
    }

    /// Only a zero exit code counts as success
    pub const fn is_success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }
}

impl fmt::Display for ProcessExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.exit_code, self.signal) {
            (Some(code), _) => write!(f, "pid {} exited with code {}", self.pid, code),
            (None, Some(signal)) => write!(f, "pid {} killed by signal {}", self.pid, signal),
            (None, None) => write!(f, "pid {} exited without a status", self.pid),
        }
    }
}

/// Top-level structure of a group file
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct GroupFile {
    /// Settings shared by the whole group
    #[serde(default)]
    pub settings: GroupSettings,
    /// Processes to run, in registration order
    #[serde(default)]
    pub processes: Vec<ProcessSpec>,
}
