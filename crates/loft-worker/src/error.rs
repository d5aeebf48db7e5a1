//! Error taxonomy for the build worker.
//!
//! The variants mirror the failure categories surfaced to users through
//! the build log: a missing output directory is deliberately distinct
//! from a failed build command.

use thiserror::Error;

/// Result type alias for worker operations.
pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("repository URL is not valid: {0}")]
    InvalidRepoUrl(String),

    /// Clone failure. The text has already been scrubbed of credentials.
    #[error("git clone failed: {0}")]
    CloneFailed(String),

    #[error("build command exited with code {exit_code}")]
    BuildFailed { exit_code: i32 },

    /// None of the candidate output directories exist.
    #[error("no output folder found (searched: {searched})")]
    NoOutputDir { searched: String },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
