//! Unix process spawning in dedicated process groups
//!
//! Every child is started in its own session via `setsid()`, which makes it
//! the leader of a new process group. Forced termination then targets the
//! whole group with `SIGKILL`, so grandchildren started by the command die
//! with it.

// process groups require libc::setsid() in the pre_exec hook
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use schema::ProcessExit;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, error};

/// A child process that leads its own process group
#[derive(Debug)]
pub struct ChildProcess {
    pid: Pid,
    child: Child,
}

impl ChildProcess {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Wait for the process to exit and return its exit status
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        self.child.wait().await.map_err(|e| {
            CoreError::ProcessWait(format!("Failed to wait for process {}: {}", self.pid, e))
        })
    }

    /// Check whether the process has exited without blocking
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        self.child.try_wait().map_err(|e| {
            CoreError::ProcessWait(format!(
                "Failed to try_wait for process {}: {}",
                self.pid, e
            ))
        })
    }
}

/// Spawn `cmd` with `args` in a new process group
///
/// Stdin is closed; stdout and stderr are inherited from the host.
///
/// ```rust,no_run
/// use conductor_core::process::unix::spawn;
///
/// # async fn demo() -> conductor_core::Result<()> {
/// let child = spawn("echo", &["hello", "world"])?;
/// println!("Spawned process with PID: {}", child.pid());
/// # Ok(())
/// # }
/// ```
pub fn spawn(cmd: &str, args: &[&str]) -> Result<ChildProcess> {
    debug!("Spawning process: {} {:?}", cmd, args);

    let mut command = Command::new(cmd);
    command.args(args);
    command.stdin(Stdio::null());
    command.stdout(Stdio::inherit());
    command.stderr(Stdio::inherit());

    // Safety: setsid() is async-signal-safe and runs in the child before exec
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", cmd, e);
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", cmd, e))
    })?;

    let raw_pid = child
        .id()
        .ok_or_else(|| CoreError::ProcessSpawn("Spawned child did not have a PID".to_string()))?;
    let pid = Pid::from_raw(raw_pid as i32);
    debug!("Spawned process {} in new process group", pid);

    Ok(ChildProcess { pid, child })
}

/// Send SIGKILL to the child's process group
///
/// `ESRCH` and `EPERM` mean the group is already gone (or was reaped and its
/// id reused by someone we cannot signal) and count as success.
pub fn signal_kill_group(child: &ChildProcess) -> Result<()> {
    debug!("Sending SIGKILL to process group {}", child.pid);

    match killpg(child.pid, Signal::SIGKILL) {
        Ok(()) => Ok(()),
        Err(nix::errno::Errno::ESRCH) => {
            debug!("Process group {} already exited", child.pid);
            Ok(())
        }
        Err(nix::errno::Errno::EPERM) => {
            debug!(
                "Permission denied signaling process group {} (likely already exited)",
                child.pid
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to send SIGKILL to process group {}: {}", child.pid, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send SIGKILL to process group {}: {}",
                child.pid, e
            )))
        }
    }
}

/// Convert an OS exit status into a [`ProcessExit`]
pub fn exit_from_status(pid: u32, status: ExitStatus) -> ProcessExit {
    ProcessExit {
        pid,
        exit_code: status.code(),
        signal: status.signal(),
    }
}
