//! loft-router — the multi-tenant artifact router.
//!
//! Every inbound request is keyed by the first label of its host header:
//! that subdomain resolves to an object-store prefix, the artifact is
//! served from there (with `/` rewritten to `/index.html`), and an
//! analytics record is captured off the critical path. Geo resolution of
//! the client IP goes through a TTL-bounded cache with a static fallback
//! table, so the proxy hot path never waits on a slow lookup twice.

pub mod analytics;
pub mod error;
pub mod geo;
pub mod proxy;
pub mod server;

pub use analytics::{AnalyticsSummary, summarize};
pub use geo::{GeoService, Location};
pub use proxy::ArtifactRouter;
pub use server::RouterServer;
