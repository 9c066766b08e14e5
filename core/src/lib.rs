//! Core functionality for conductor
//!
//! This crate runs external commands as cancellable child processes:
//!
//! - [`ManagedProcess`]: one command, spawned fresh on every `run`
//! - [`memoize`] / [`MemoizedProcess`]: runs deduplicated per [`CancelToken`]
//! - [`ProcessGroup`]: many processes run concurrently with one aggregate outcome
//!
//! Spawning goes through the [`ProcessAdapter`] trait so tests can use
//! [`MockProcessAdapter`] instead of real processes.

pub mod adapters;
pub mod cancel;
pub mod config;
pub mod error;
pub mod group;
pub mod managed;
pub mod memo;
#[cfg(unix)]
pub mod process;


pub use adapters::{MockInstruction, MockProcessAdapter, ProcessAdapter, ProcessHandle};
#[cfg(unix)]
pub use adapters::UnixProcessAdapter;
pub use cancel::{CancelToken, TokenId};
pub use config::{
    build_group, load_group_from_toml_path, load_group_from_toml_str, validate_group,
};
pub use error::{CoreError, GroupError, Result, RunError};
pub use group::{ProcessGroup, ProcessReport};
pub use managed::{split_command, ManagedProcess, RunProcess};
pub use memo::{memoize, MemoizedProcess};
pub use schema::GroupFile;

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    ///
    /// `RUST_LOG` takes precedence over `level` when it is set.
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
