//! Error types for the dispatcher.

use thiserror::Error;

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("invalid subdomain {0:?}: must be lowercase alphanumeric with dashes")]
    InvalidSubdomain(String),

    #[error("failed to launch worker instance: {0}")]
    Launch(String),

    #[error(transparent)]
    State(#[from] loft_state::StateError),
}
