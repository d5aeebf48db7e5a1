//! loft-state — embedded store for Loft deployment metadata.
//!
//! Backed by [redb](https://docs.rs/redb), holds the project → subdomain
//! mapping, deployment records, persisted build logs, and raw analytics
//! records. All domain types are JSON-serialized into redb's `&[u8]` value
//! columns; composite keys (`{deployment_id}:{timestamp}:{seq}`) give
//! prefix scans in timestamp order.
//!
//! The `StateStore` is `Clone + Send + Sync` (backed by `Arc<Database>`)
//! and is passed as an explicit handle — consumers, dispatcher, router and
//! API all share one instance.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::{StateStore, StatusApplied};
