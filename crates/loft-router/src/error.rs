//! Error types for artifact serving.

use thiserror::Error;

/// Why a request could not be served. Each variant maps onto exactly one
/// client-facing response.
#[derive(Debug, Error)]
pub enum ServeError {
    /// No project is mapped to the requested subdomain.
    #[error("unknown tenant")]
    UnknownTenant,

    /// The tenant exists but the requested object does not.
    #[error("artifact not found")]
    NotFound,

    /// The metadata or object store failed.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}
