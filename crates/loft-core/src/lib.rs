//! loft-core — shared types for the Loft deploy platform.
//!
//! Everything that crosses a process boundary lives here: the deployment
//! lifecycle types the dispatcher persists and the status consumer
//! advances, the log/status events the build worker publishes, the
//! execution context handed to an isolated worker instance, and the
//! artifact key scheme the uploader and the router must agree on.

pub mod artifacts;
pub mod config;
pub mod context;
pub mod types;

pub use config::LoftConfig;
pub use context::WorkerContext;
pub use types::*;
