//! CLI-specific error types
//!
//! Directory failures keep their `DIRPART_*` code; everything else the CLI
//! itself detects gets a `DIRPART_CLI_*` code.

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::error::{DirectoryError, DirectoryErrorKind};

/// CLI error codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, snapshot file)
    IoError,
    /// `init` would overwrite an existing snapshot
    SnapshotExists,
    /// Snapshot missing or unreadable
    SnapshotError,
    /// Malformed command-line value
    InvalidInput,
    /// Failure reported by a directory operation
    Directory(DirectoryErrorKind),
}

impl CliErrorCode {
    /// Get the error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "DIRPART_CLI_CONFIG_ERROR",
            Self::IoError => "DIRPART_CLI_IO_ERROR",
            Self::SnapshotExists => "DIRPART_CLI_SNAPSHOT_EXISTS",
            Self::SnapshotError => "DIRPART_CLI_SNAPSHOT_ERROR",
            Self::InvalidInput => "DIRPART_CLI_INVALID_INPUT",
            Self::Directory(kind) => kind.code(),
        }
    }
}

/// CLI error
#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn snapshot_exists(path: &std::path::Path) -> Self {
        Self::new(
            CliErrorCode::SnapshotExists,
            format!("Snapshot {} already exists", path.display()),
        )
    }

    pub fn snapshot_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::SnapshotError, msg)
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::InvalidInput, msg)
    }

    /// Get the error code
    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    /// Get the error code string
    pub fn code_str(&self) -> &'static str {
        self.code.code()
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<DirectoryError> for CliError {
    fn from(e: DirectoryError) -> Self {
        Self::new(CliErrorCode::Directory(e.kind()), e.to_string())
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        Self::config_error(e.to_string())
    }
}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

/// CLI result type
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_error_keeps_code() {
        let err: CliError = DirectoryError::not_found("Partition", "apps.corp.com").into();
        assert_eq!(err.code_str(), "DIRPART_NOT_FOUND");
        assert!(err.message().contains("apps.corp.com"));
    }

    #[test]
    fn test_cli_codes() {
        assert_eq!(CliError::invalid_input("x").code_str(), "DIRPART_CLI_INVALID_INPUT");
        assert_eq!(
            CliError::snapshot_exists(std::path::Path::new("d.json")).code_str(),
            "DIRPART_CLI_SNAPSHOT_EXISTS"
        );
    }
}
