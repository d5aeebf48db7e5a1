//! redb table definitions for the Loft state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain
//! types). Timestamped keys are zero-padded to 20 digits so lexicographic
//! key order matches timestamp order within a prefix.

use redb::TableDefinition;

/// Projects keyed by `{subdomain}` — the router's tenant lookup.
pub const PROJECTS: TableDefinition<&str, &[u8]> = TableDefinition::new("projects");

/// Deployment records keyed by `{deployment_id}`.
pub const DEPLOYMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("deployments");

/// Build log entries keyed by `{deployment_id}:{timestamp_ms:020}:{seq:06}`.
pub const LOGS: TableDefinition<&str, &[u8]> = TableDefinition::new("logs");

/// Analytics records keyed by `{subdomain}:{timestamp_ms:020}:{seq:06}`.
pub const ANALYTICS: TableDefinition<&str, &[u8]> = TableDefinition::new("analytics");
