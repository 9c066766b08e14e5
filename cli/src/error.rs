//! CLI error types

use conductor_core::CoreError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// The group ran but at least one process failed
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// A command-line flag had an unusable value
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Loading or validating the group file failed
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Rendering JSON output failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::CommandFailed(_) => "CLI001",
            CliError::InvalidArgument(_) => "CLI002",
            CliError::Core(e) => e.code(),
            CliError::Serialization(_) => "CLI004",
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CliError::CommandFailed("test".to_string()).code(), "CLI001");
        assert_eq!(CliError::InvalidArgument("test".to_string()).code(), "CLI002");
        let core = CliError::from(CoreError::ValidationError("bad".to_string()));
        assert_eq!(core.code(), "CORE002");
    }

    #[test]
    fn test_error_display() {
        let error = CliError::CommandFailed("1 of 3 processes failed".to_string());
        assert_eq!(error.to_string(), "Command failed: 1 of 3 processes failed");

        let error = CliError::from(CoreError::ConfigurationError("missing".to_string()));
        assert_eq!(error.to_string(), "Configuration error: missing");
    }
}
