//! Process adapters for abstracting process spawning
//!
//! [`ProcessAdapter`] is the spawn capability and [`ProcessHandle`] is one
//! running child. The library only ever talks to these traits, so tests can
//! substitute [`MockProcessAdapter`] for real OS processes.
//!
//! A handle's event subscriptions are its borrowed futures: the exit/error
//! notification is [`ProcessHandle::wait`], and dropping the handle releases
//! it along with anything still listening to it.

use crate::Result;
use async_trait::async_trait;
use schema::ProcessExit;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Capability for starting OS processes
#[async_trait]
pub trait ProcessAdapter: Send + Sync {
    /// Start `program` with `args`
    async fn spawn(&self, program: &str, args: &[&str]) -> Result<Box<dyn ProcessHandle>>;
}

/// One running child process
#[async_trait]
pub trait ProcessHandle: Send {
    /// Get the process ID
    fn pid(&self) -> u32;

    /// Wait for the process to exit.
    ///
    /// An `Err` is the handle's error event; an `Ok` is its exit event.
    /// Must be cancel safe: dropping the future leaves the handle usable.
    async fn wait(&mut self) -> Result<ProcessExit>;

    /// Forcibly terminate the process
    async fn kill(&mut self) -> Result<()>;
}

/// Unix process adapter using process groups
#[cfg(unix)]
#[derive(Copy, Clone, Debug, Default)]
pub struct UnixProcessAdapter;

#[cfg(unix)]
impl UnixProcessAdapter {
    /// Create a new Unix process adapter
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
#[async_trait]
impl ProcessAdapter for UnixProcessAdapter {
    async fn spawn(&self, program: &str, args: &[&str]) -> Result<Box<dyn ProcessHandle>> {
        let child = crate::process::unix::spawn(program, args)?;
        Ok(Box::new(UnixProcessHandle {
            child,
            exited: false,
        }))
    }
}

/// Unix handle; kills its process group if dropped before the child exits
#[cfg(unix)]
struct UnixProcessHandle {
    child: crate::process::unix::ChildProcess,
    exited: bool,
}

#[cfg(unix)]
#[async_trait]
impl ProcessHandle for UnixProcessHandle {
    fn pid(&self) -> u32 {
        self.child.pid()
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        let status = self.child.wait().await?;
        self.exited = true;
        Ok(crate::process::unix::exit_from_status(self.pid(), status))
    }

    async fn kill(&mut self) -> Result<()> {
        crate::process::unix::signal_kill_group(&self.child)?;
        // reap so the child does not linger as a zombie
        self.child.wait().await?;
        self.exited = true;
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for UnixProcessHandle {
    fn drop(&mut self) {
        if self.exited || matches!(self.child.try_wait(), Ok(Some(_))) {
            return;
        }
        debug!("Handle for process {} dropped while running, killing group", self.child.pid());
        let _ = crate::process::unix::signal_kill_group(&self.child);
    }
}

/// Instructions for mock process behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockInstruction {
    /// How long the process "runs" before exiting
    pub exit_delay: Duration,
    /// Exit code to return (None means killed by signal)
    pub exit_code: Option<i32>,
    /// Signal that ended the process (Unix only)
    pub signal: Option<i32>,
    /// Fail the spawn itself, as if the executable did not exist
    pub fail_spawn: bool,
    /// Report an error from `wait` instead of an exit
    pub fail_wait: bool,
}

impl Default for MockInstruction {
    fn default() -> Self {
        Self {
            exit_delay: Duration::from_millis(50),
            exit_code: Some(0),
            signal: None,
            fail_spawn: false,
            fail_wait: false,
        }
    }
}

impl MockInstruction {
    /// Exit with `code` after `delay`
    pub fn exit(code: i32, delay: Duration) -> Self {
        Self {
            exit_delay: delay,
            exit_code: Some(code),
            ..Self::default()
        }
    }

    /// Die from `signal` after `delay`
    pub fn signal(signal: i32, delay: Duration) -> Self {
        Self {
            exit_delay: delay,
            exit_code: None,
            signal: Some(signal),
            ..Self::default()
        }
    }

    /// Refuse to spawn
    pub fn spawn_failure() -> Self {
        Self {
            fail_spawn: true,
            ..Self::default()
        }
    }

    /// Spawn, then report a wait error after `delay`
    pub fn wait_failure(delay: Duration) -> Self {
        Self {
            exit_delay: delay,
            fail_wait: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    queued: Mutex<VecDeque<MockInstruction>>,
    scripted: Mutex<HashMap<String, MockInstruction>>,
    spawned: Mutex<Vec<Vec<String>>>,
    spawn_count: AtomicUsize,
    kill_count: AtomicUsize,
    live_handles: AtomicUsize,
    next_pid: AtomicU32,
}

/// Mock process adapter for testing
///
/// Each spawn picks its instruction from, in order: a script registered for
/// the exact command line, the front of the queue, or
/// [`MockInstruction::default`].
#[derive(Debug, Clone, Default)]
pub struct MockProcessAdapter {
    state: Arc<MockState>,
}

impl MockProcessAdapter {
    /// Create a new mock adapter with no pre-configured instructions
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue instructions for the next spawned process
    pub async fn add_instruction(&self, instruction: MockInstruction) {
        self.state.queued.lock().await.push_back(instruction);
    }

    /// Use `instruction` for every spawn of `command_line`
    /// (program and arguments joined by single spaces)
    pub async fn script(&self, command_line: &str, instruction: MockInstruction) {
        self.state
            .scripted
            .lock()
            .await
            .insert(command_line.to_string(), instruction);
    }

    /// Number of successful spawns so far
    pub fn spawn_count(&self) -> usize {
        self.state.spawn_count.load(Ordering::SeqCst)
    }

    /// Number of `kill` calls issued against spawned handles
    pub fn kill_count(&self) -> usize {
        self.state.kill_count.load(Ordering::SeqCst)
    }

    /// Handles that were spawned and not yet dropped
    pub fn live_handles(&self) -> usize {
        self.state.live_handles.load(Ordering::SeqCst)
    }

    /// Program and arguments of every attempted spawn, in order
    pub async fn spawned_commands(&self) -> Vec<Vec<String>> {
        self.state.spawned.lock().await.clone()
    }

    async fn next_instruction(&self, command_line: &str) -> MockInstruction {
        if let Some(instruction) = self.state.scripted.lock().await.get(command_line) {
            return *instruction;
        }
        self.state
            .queued
            .lock()
            .await
            .pop_front()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProcessAdapter for MockProcessAdapter {
    async fn spawn(&self, program: &str, args: &[&str]) -> Result<Box<dyn ProcessHandle>> {
        debug!("Spawning mock process for: {} {:?}", program, args);

        let mut argv = vec![program.to_string()];
        argv.extend(args.iter().map(|a| a.to_string()));
        let command_line = argv.join(" ");
        self.state.spawned.lock().await.push(argv);

        let instruction = self.next_instruction(&command_line).await;
        if instruction.fail_spawn {
            return Err(crate::CoreError::ProcessSpawn(format!(
                "Failed to spawn '{}': No such file or directory",
                program
            )));
        }

        let pid = 1000 + self.state.next_pid.fetch_add(1, Ordering::SeqCst);
        self.state.spawn_count.fetch_add(1, Ordering::SeqCst);
        self.state.live_handles.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MockProcessHandle {
            pid,
            instruction,
            deadline: Instant::now() + instruction.exit_delay,
            killed: false,
            state: Arc::clone(&self.state),
        }))
    }
}

/// Mock process handle for testing
struct MockProcessHandle {
    pid: u32,
    instruction: MockInstruction,
    deadline: Instant,
    killed: bool,
    state: Arc<MockState>,
}

#[async_trait]
impl ProcessHandle for MockProcessHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&mut self) -> Result<ProcessExit> {
        if !self.killed {
            tokio::time::sleep_until(self.deadline).await;
        }

        if self.killed {
            return Ok(ProcessExit::with_signal(self.pid, 9));
        }
        if self.instruction.fail_wait {
            return Err(crate::CoreError::ProcessWait(format!(
                "Failed to wait for process {}: mock wait failure",
                self.pid
            )));
        }
        Ok(ProcessExit {
            pid: self.pid,
            exit_code: self.instruction.exit_code,
            signal: self.instruction.signal,
        })
    }

    async fn kill(&mut self) -> Result<()> {
        debug!("Killing mock process {}", self.pid);
        self.killed = true;
        self.state.kill_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MockProcessHandle {
    fn drop(&mut self) {
        self.state.live_handles.fetch_sub(1, Ordering::SeqCst);
    }
}
