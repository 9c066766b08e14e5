//! Group file loading and validation
//!
//! A group file is TOML with optional `[settings]` and one `[[processes]]`
//! table per child command:
//!
//! ```toml
//! [settings]
//! policy = "fail-fast"
//! timeoutSecs = 30
//!
//! [[processes]]
//! id = 1
//! command = "cargo build"
//! memoize = true
//! ```

use crate::adapters::ProcessAdapter;
use crate::group::ProcessGroup;
use crate::managed::ManagedProcess;
use crate::memo::memoize;
use crate::{CoreError, Result};
use schema::GroupFile;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Validate a group file, reporting the offending field path
pub fn validate_group(file: &GroupFile) -> Result<()> {
    if file.processes.is_empty() {
        return Err(CoreError::ValidationError(
            "processes: must contain at least one process".to_string(),
        ));
    }

    if file.settings.timeout_secs == Some(0) {
        return Err(CoreError::ValidationError(
            "settings.timeoutSecs: must be > 0".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for (i, spec) in file.processes.iter().enumerate() {
        if spec.command.trim().is_empty() {
            return Err(CoreError::ValidationError(format!(
                "processes[{}].command: cannot be empty",
                i
            )));
        }
        if !seen.insert(spec.id) {
            return Err(CoreError::ValidationError(format!(
                "processes[{}].id: duplicate id {}",
                i, spec.id
            )));
        }
    }
    Ok(())
}

/// Load a group file from a TOML file path
pub fn load_group_from_toml_path(path: impl AsRef<Path>) -> Result<GroupFile> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_group_from_toml_str(&data)
}

/// Load a group file from a TOML string
pub fn load_group_from_toml_str(input: &str) -> Result<GroupFile> {
    let cfg: GroupFile = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    validate_group(&cfg)?;
    Ok(cfg)
}

/// Build a group from a validated file, memoizing where requested
pub fn build_group(file: &GroupFile, adapter: Arc<dyn ProcessAdapter>) -> ProcessGroup {
    let mut group = ProcessGroup::new();
    for spec in &file.processes {
        let process = ManagedProcess::new(spec.id, spec.command.clone(), Arc::clone(&adapter));
        debug!(
            "Registering process {} ({}), memoize={}",
            spec.id, spec.command, spec.memoize
        );
        if spec.memoize {
            group.add_process(memoize(&process));
        } else {
            group.add_process(process);
        }
    }
    group
}
