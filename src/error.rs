//! Error types for tool resolution, sandbox execution and formatter runs.
//!
//! A formatter that exits non-zero is not an error here: that is reported as
//! [`crate::reconcile::FormatOutcome::Failed`]. These types cover the faults
//! around the tool, never the tool's own verdict.

use crate::digest::Digest;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The formatter's tool could not be resolved to a runnable executable.
#[derive(Debug, Error)]
pub enum ToolResolutionError {
    #[error("Tool '{tool}' not found (searched {searched})")]
    NotFound { tool: String, searched: String },

    #[error("Tool '{tool}' at {path} is not an executable file")]
    NotExecutable { tool: String, path: PathBuf },

    #[error("Failed to query version of '{tool}': {message}")]
    VersionProbe { tool: String, message: String },

    #[error("Tool '{tool}' has version {found}, which does not satisfy '{constraint}'")]
    VersionMismatch {
        tool: String,
        found: String,
        constraint: String,
    },

    #[error("Invalid version constraint '{constraint}' for tool '{tool}'")]
    InvalidConstraint { tool: String, constraint: String },
}

/// The sandbox machinery itself failed, independent of the tool's exit code.
#[derive(Debug, Error)]
pub enum ExecutionInfraError {
    #[error("Input digest {0} is not present in the content store")]
    MissingDigest(Digest),

    #[error("Refusing to materialize path outside the sandbox: {path}")]
    UnsafePath { path: String },

    #[error("Sandbox I/O failed at {path}: {source}")]
    Sandbox {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Process '{description}' timed out after {timeout_ms}ms")]
    Timeout { description: String, timeout_ms: u64 },
}

/// Failure of one formatter run, as seen by the aggregation goal.
#[derive(Debug, Error)]
pub enum FmtError {
    #[error(transparent)]
    ToolResolution(#[from] ToolResolutionError),

    #[error(transparent)]
    ExecutionInfra(#[from] ExecutionInfraError),

    #[error("Formatter run was cancelled")]
    Cancelled,

    #[error("Unknown formatter '{0}'")]
    UnknownFormatter(String),
}
