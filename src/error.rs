//! Error types for the build coordinator.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for build coordination.
#[derive(Error, Debug)]
pub enum Error {
    /// A required tool or package is missing or has an incompatible version.
    ///
    /// The message always carries a remediation command.
    #[error("{0}")]
    Dependency(String),

    /// The build tool recorded a failure in the error file.
    #[error("Ember CLI app {app:?} has failed to build")]
    Build {
        /// Name of the application that failed.
        app: String,
        /// Diagnostic lines read from the error file.
        trace: Vec<String>,
    },

    /// IO error while touching build state on disk.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// A package manifest could not be parsed.
    #[error("failed to parse manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An external command could not be started or exited unsuccessfully.
    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    /// A lifecycle operation was requested from a state that forbids it.
    #[error("cannot {action} while {state}")]
    InvalidTransition { action: &'static str, state: String },
}

impl Error {
    /// Returns the diagnostic trace of a build failure, if this is one.
    pub fn build_trace(&self) -> Option<&[String]> {
        match self {
            Error::Build { trace, .. } => Some(trace),
            _ => None,
        }
    }
}

/// Result type alias for coordinator operations.
pub type Result<T> = std::result::Result<T, Error>;
