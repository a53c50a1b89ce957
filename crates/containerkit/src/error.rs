//! Error types for container operations.
//!
//! Categories are shared with the reconciliation core so the CLI presents
//! both the same way.

use converge::ErrorCategory;
use thiserror::Error;

/// Errors that can occur while talking to the container runtime.
#[derive(Debug, Error)]
pub enum Error {
    /// The docker CLI (or the VM manager wrapping it) is not installed
    #[error("`{binary}` not found in PATH")]
    RuntimeNotFound {
        /// Name of the missing binary
        binary: String,
    },

    /// The runtime command could not be started
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        /// Command line that failed to start
        command: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// The runtime command exited unsuccessfully
    #[error("`{command}` failed: {}", .stderr.trim())]
    CommandFailed {
        /// Command line that failed
        command: String,
        /// Captured standard error
        stderr: String,
    },

    /// A `--format '{{json .}}'` line did not parse
    #[error("unexpected {what} listing: {source}")]
    Parse {
        /// Kind of resource being listed
        what: &'static str,
        /// Underlying JSON error
        source: serde_json::Error,
    },

    /// A create call returned no identifier
    #[error("creating {kind} {name} returned no id")]
    MissingId {
        /// Kind of resource
        kind: &'static str,
        /// Requested name
        name: String,
    },

    /// A command run inside a container exited non-zero
    #[error("`{command}` in {container} exited with code {code}")]
    ExecFailed {
        /// Container the command ran in
        container: String,
        /// Command that ran
        command: String,
        /// Exit code
        code: i32,
    },

    /// No container with the given name exists
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Waiting was cancelled or timed out
    #[error(transparent)]
    Wait(#[from] converge::Error),
}

impl Error {
    /// Classify for presentation.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Wait(inner) => inner.category(),
            _ => ErrorCategory::Reconciler,
        }
    }
}

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_categories() {
        let failed = Error::CommandFailed {
            command: "docker network ls".into(),
            stderr: "boom\n".into(),
        };
        assert_eq!(failed.category(), ErrorCategory::Reconciler);
        assert_eq!(failed.to_string(), "`docker network ls` failed: boom");

        let timeout = Error::from(converge::Error::Timeout {
            what: "dump".into(),
            elapsed: Duration::from_secs(3),
        });
        assert_eq!(timeout.category(), ErrorCategory::Cancelled);
    }
}
