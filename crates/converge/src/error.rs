//! Error types for reconciliation.
//!
//! Errors are categorized so callers can present them sensibly. Every layer
//! returns its failures; nothing here logs an error and carries on.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The desired configuration is missing, malformed, or invalid
    Configuration,
    /// Reading the current state of the machine failed
    Observation,
    /// An action failed to spawn or exited non-zero
    Execution,
    /// A resource could not be brought to its desired state
    Reconciler,
    /// The operation was cancelled or ran out of time
    Cancelled,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Configuration => "Configuration problem",
            Self::Observation => "Could not read machine state",
            Self::Execution => "Command failed",
            Self::Reconciler => "Could not converge resource",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Configuration => "Fix the config file and run the command again",
            Self::Observation => "Check that the machine is running (`devbox machine info`)",
            Self::Execution => "Inspect the command output above; nothing after it was run",
            Self::Reconciler => "Check the container runtime inside the machine",
            Self::Cancelled => "Run the command again when ready",
        }
    }
}

/// Errors raised while loading, validating, or saving the desired config.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No config file at the given path
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but is not valid YAML for the config schema
    #[error("malformed config {}: {source}", .path.display())]
    Malformed {
        /// Path of the offending file
        path: PathBuf,
        /// Underlying parse error
        source: serde_yaml::Error,
    },

    /// The file parsed but violates a semantic rule
    #[error("invalid config: {0}")]
    Invalid(String),

    /// Reading the file failed for a reason other than absence
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        /// Path of the file
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// Writing the file failed
    #[error("failed to write config {}: {source}", .path.display())]
    Write {
        /// Path of the file
        path: PathBuf,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The in-memory config could not be serialized
    #[error("failed to serialize config: {0}")]
    Serialize(serde_yaml::Error),
}

/// Errors that can occur while observing, planning, or running actions.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Output from the machine could not be interpreted
    #[error("failed to observe {what}: {message}")]
    Observation {
        /// What was being observed (mounts, sites, ...)
        what: String,
        /// Description of the problem
        message: String,
    },

    /// The VM manager binary is not installed
    #[error("`{binary}` not found in PATH")]
    BinaryNotFound {
        /// Name of the missing binary
        binary: String,
    },

    /// The child process could not be started
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Command line that failed to start
        command: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The child process exited unsuccessfully
    #[error("`{command}` failed ({})", describe_exit(.code))]
    CommandFailed {
        /// Command line that failed
        command: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Captured standard error (empty when stderr was inherited)
        stderr: String,
    },

    /// An interactive action was handed to the batch runner
    #[error("interactive action `{command}` cannot run as part of a batch")]
    InteractiveInBatch {
        /// Command line of the rejected action
        command: String,
    },

    /// A site sequence step was emitted out of order
    #[error("site {hostname}: cannot move from {from} to {to}")]
    StageOrder {
        /// Hostname being staged
        hostname: String,
        /// Stage the site was in
        from: String,
        /// Stage that was requested
        to: String,
    },

    /// A wait exceeded its deadline
    #[error("timed out after {}s waiting for {what}", .elapsed.as_secs())]
    Timeout {
        /// What was being waited on
        what: String,
        /// How long we waited
        elapsed: Duration,
    },

    /// The operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(|| "terminated by signal".to_string(), |c| format!("exit code {c}"))
}

impl Error {
    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) => ErrorCategory::Configuration,
            Error::Observation { .. } => ErrorCategory::Observation,
            Error::StageOrder { .. } => ErrorCategory::Reconciler,
            Error::Timeout { .. } | Error::Cancelled => ErrorCategory::Cancelled,
            _ => ErrorCategory::Execution,
        }
    }

    /// Whether the error means a command ran and exited non-zero.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Error::CommandFailed { .. })
    }

    pub(crate) fn observation(what: &str, message: impl Into<String>) -> Self {
        Error::Observation {
            what: what.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_for_config_errors() {
        let err: Error = ConfigError::Invalid("bad port".to_string()).into();
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(err.to_string(), "invalid config: bad port");
    }

    #[test]
    fn test_command_failed_message() {
        let err = Error::CommandFailed {
            command: "multipass mount a b".to_string(),
            code: Some(2),
            stderr: String::new(),
        };
        assert_eq!(err.to_string(), "`multipass mount a b` failed (exit code 2)");
        assert!(err.is_command_failure());
        assert_eq!(err.category(), ErrorCategory::Execution);
    }

    #[test]
    fn test_signal_exit_message() {
        let err = Error::CommandFailed {
            command: "multipass shell".to_string(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }

    #[test]
    fn test_timeout_is_cancelled_category() {
        let err = Error::Timeout {
            what: "dump".to_string(),
            elapsed: Duration::from_secs(3),
        };
        assert_eq!(err.category(), ErrorCategory::Cancelled);
        assert_eq!(err.to_string(), "timed out after 3s waiting for dump");
    }
}
