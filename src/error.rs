//! Error types for `countdown`
//!
//! Validation failures are the only errors a caller sees from the timer
//! core. Restore-data corruption is coerced away and invalid-state commands
//! are no-ops, so neither appears here.

use std::path::PathBuf;
use thiserror::Error;

use crate::timer::TimerId;

// ============================================================================
// Exit Codes
// ============================================================================

/// Exit codes for `countdown` CLI operations.
pub struct ExitCode;

impl ExitCode {
    /// Successful execution
    pub const SUCCESS: i32 = 0;

    /// General error
    pub const ERROR: i32 = 1;

    /// Configuration error (invalid YAML, validation failure)
    pub const CONFIG_ERROR: i32 = 2;

    /// I/O error (file not found, permission denied)
    pub const IO_ERROR: i32 = 3;

    /// Snapshot store error (unreadable or unwritable state file)
    pub const STORE_ERROR: i32 = 4;

    /// Usage error (invalid arguments, missing required options)
    pub const USAGE_ERROR: i32 = 64;

    /// Interrupted by SIGINT (Ctrl+C)
    pub const INTERRUPTED: i32 = 130;

    /// Terminated by SIGTERM
    pub const TERMINATED: i32 = 143;
}

// ============================================================================
// Top-Level Error
// ============================================================================

/// Top-level error type for `countdown` operations.
#[derive(Debug, Error)]
pub enum CountdownError {
    /// Configuration loading or validation error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Registry operation error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Snapshot store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Control protocol error
    #[error(transparent)]
    Control(#[from] ControlError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CountdownError {
    /// Returns the appropriate exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Yaml(_) => ExitCode::CONFIG_ERROR,
            Self::Registry(RegistryError::Validation(_)) => ExitCode::CONFIG_ERROR,
            Self::Store(_) | Self::Registry(RegistryError::Store(_)) | Self::Json(_) => {
                ExitCode::STORE_ERROR
            }
            Self::Control(_) => ExitCode::USAGE_ERROR,
            Self::Registry(_) => ExitCode::ERROR,
            Self::Io(_) => ExitCode::IO_ERROR,
        }
    }
}

// ============================================================================
// Configuration Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// YAML parsing failed
    #[error("parse error in {path}: {message}")]
    ParseError {
        /// Path to the configuration file
        path: PathBuf,
        /// Line number where the error occurred (if available)
        line: Option<usize>,
        /// Error message from the parser
        message: String,
    },

    /// Configuration validation failed
    #[error("validation failed for {path}: {}", summarize(.errors))]
    ValidationError {
        /// Path to the configuration file, or the timer id for dynamic timers
        path: String,
        /// List of validation issues found
        errors: Vec<ValidationIssue>,
    },

    /// Referenced configuration file not found
    #[error("file not found: {path}")]
    MissingFile {
        /// Path to the missing file
        path: PathBuf,
    },

    /// Field has an invalid value
    #[error("invalid value for '{field}': got '{value}', expected {expected}")]
    InvalidValue {
        /// Name of the field with invalid value
        field: String,
        /// The actual value provided
        value: String,
        /// Description of what was expected
        expected: String,
    },

    /// Environment variable referenced in configuration is not set
    #[error("environment variable '{var}' not set: {message}")]
    EnvVarNotSet {
        /// Name of the environment variable
        var: String,
        /// Message given in the `${VAR:?message}` reference
        message: String,
    },
}

fn summarize(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Validation Types
// ============================================================================

/// A single validation issue found during configuration validation.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the problematic field (e.g., "timer.kitchen.duration")
    pub path: String,
    /// Description of the validation issue
    pub message: String,
    /// Severity level of the issue
    pub severity: Severity,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{}: {} at {}", prefix, self.message, self.path)
    }
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Error - validation failure that prevents configuration from being used
    Error,
    /// Warning - potential issue that does not prevent configuration loading
    Warning,
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors returned by [`TimerRegistry`](crate::registry::TimerRegistry) operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No timer with the given id is registered
    #[error("timer not found: {0}")]
    NotFound(TimerId),

    /// A timer with the given id already exists
    #[error("timer already exists: {0}")]
    DuplicateId(TimerId),

    /// The timer is defined in the configuration file and cannot be edited
    #[error("timer is read-only (defined in configuration): {0}")]
    ReadOnly(TimerId),

    /// The supplied configuration failed validation
    #[error(transparent)]
    Validation(#[from] ConfigError),

    /// The transition completed but its snapshot could not be persisted
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// Store Errors
// ============================================================================

/// Snapshot store failures.
///
/// The timer core never retries; callers decide whether to.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error reading or writing the backing file
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backing file content could not be (de)serialized
    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Store is unavailable for another reason
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Control Protocol Errors
// ============================================================================

/// Errors parsing a control-protocol command line.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The line could not be tokenised (e.g. unbalanced quotes)
    #[error("malformed command line: {0}")]
    Malformed(String),

    /// The command word is not recognised
    #[error("unknown command '{command}'{}", .suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    UnknownCommand {
        /// The command word as typed
        command: String,
        /// Closest known command, if any is similar enough
        suggestion: Option<String>,
    },

    /// Wrong number or shape of arguments
    #[error("usage: {0}")]
    Usage(String),
}

// ============================================================================
// Result Type Alias
// ============================================================================

/// Result type alias for `countdown` operations.
pub type Result<T> = std::result::Result<T, CountdownError>;

// ============================================================================
// Tests
// ============================================================================
