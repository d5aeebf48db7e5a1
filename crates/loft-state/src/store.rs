//! StateStore — redb-backed persistence for Loft.
//!
//! Provides typed operations over projects, deployments, build logs, and
//! analytics records. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use loft_core::{AnalyticsRecord, Deployment, LogEvent, Project, StatusEvent};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Outcome of applying a status event to a deployment record.
///
/// The status channel has no cross-partition ordering guarantee, so the
/// store gates every update: terminal states are immutable, and an event
/// older than the record's last change is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusApplied {
    /// The record was advanced.
    Applied,
    /// Redelivery of the status the record already holds.
    Duplicate,
    /// The record is in a terminal state; the event was dropped.
    Terminal,
    /// The event's timestamp precedes the record's last update.
    Stale,
    /// No deployment record with this id exists.
    Unknown,
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    /// Disambiguates entries written within the same millisecond.
    seq: Arc<AtomicU64>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            seq: Arc::new(AtomicU64::new(0)),
        };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            seq: Arc::new(AtomicU64::new(0)),
        };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(PROJECTS).map_err(map_err!(Table))?;
        txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        txn.open_table(LOGS).map_err(map_err!(Table))?;
        txn.open_table(ANALYTICS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) % 1_000_000
    }

    // ── Projects ───────────────────────────────────────────────────

    /// Insert or update a project, keyed by its subdomain.
    pub fn put_project(&self, project: &Project) -> StateResult<()> {
        let value = serde_json::to_vec(project).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(PROJECTS).map_err(map_err!(Table))?;
            table
                .insert(project.subdomain.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(subdomain = %project.subdomain, "project stored");
        Ok(())
    }

    /// Resolve a tenant subdomain to its project.
    pub fn get_project(&self, subdomain: &str) -> StateResult<Option<Project>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(PROJECTS).map_err(map_err!(Table))?;
        match table.get(subdomain).map_err(map_err!(Read))? {
            Some(guard) => {
                let project: Project =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(project))
            }
            None => Ok(None),
        }
    }

    // ── Deployments ────────────────────────────────────────────────

    /// Insert or update a deployment record.
    pub fn put_deployment(&self, deployment: &Deployment) -> StateResult<()> {
        let value = serde_json::to_vec(deployment).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            table
                .insert(deployment.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(id = %deployment.id, status = %deployment.status, "deployment stored");
        Ok(())
    }

    /// Get a deployment by id.
    pub fn get_deployment(&self, id: &str) -> StateResult<Option<Deployment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        match table.get(id).map_err(map_err!(Read))? {
            Some(guard) => {
                let deployment: Deployment =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(deployment))
            }
            None => Ok(None),
        }
    }

    /// List all deployments.
    pub fn list_deployments(&self) -> StateResult<Vec<Deployment>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let deployment: Deployment =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(deployment);
        }
        Ok(results)
    }

    /// Apply a status event to the matching deployment record.
    ///
    /// The gate, in order: unknown record → `Unknown`; identical status →
    /// `Duplicate` (idempotent redelivery); terminal record → `Terminal`;
    /// event timestamp older than the record's `updated_at` → `Stale`.
    /// Otherwise the record is advanced and `updated_at` takes the event's
    /// timestamp. A URL carried on the event is written through.
    pub fn apply_status(&self, event: &StatusEvent) -> StateResult<StatusApplied> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let applied;
        {
            let mut table = txn.open_table(DEPLOYMENTS).map_err(map_err!(Table))?;
            let existing = match table
                .get(event.deployment_id.as_str())
                .map_err(map_err!(Read))?
            {
                Some(guard) => {
                    let deployment: Deployment =
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                    Some(deployment)
                }
                None => None,
            };

            match existing {
                None => applied = StatusApplied::Unknown,
                Some(mut deployment) => {
                    if deployment.status == event.status {
                        applied = StatusApplied::Duplicate;
                    } else if deployment.status.is_terminal() {
                        applied = StatusApplied::Terminal;
                    } else if event.timestamp < deployment.updated_at {
                        applied = StatusApplied::Stale;
                    } else {
                        deployment.status = event.status;
                        deployment.updated_at = event.timestamp;
                        if let Some(url) = &event.url {
                            deployment.url = Some(url.clone());
                        }
                        let value =
                            serde_json::to_vec(&deployment).map_err(map_err!(Serialize))?;
                        table
                            .insert(event.deployment_id.as_str(), value.as_slice())
                            .map_err(map_err!(Write))?;
                        applied = StatusApplied::Applied;
                    }
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(applied)
    }

    // ── Build logs ─────────────────────────────────────────────────

    /// Append a batch of log entries in one write transaction.
    ///
    /// Duplicates are stored as-is; the log table is append-only.
    pub fn append_logs(&self, events: &[LogEvent]) -> StateResult<usize> {
        if events.is_empty() {
            return Ok(0);
        }
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(LOGS).map_err(map_err!(Table))?;
            for event in events {
                let key = format!(
                    "{}:{:020}:{:06}",
                    event.deployment_id,
                    event.timestamp,
                    self.next_seq()
                );
                let value = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
                table
                    .insert(key.as_str(), value.as_slice())
                    .map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(events.len())
    }

    /// Append a single log entry (dispatcher's synthetic failure lines).
    pub fn append_log(&self, event: &LogEvent) -> StateResult<()> {
        self.append_logs(std::slice::from_ref(event)).map(|_| ())
    }

    /// All log entries for a deployment, sorted by timestamp.
    pub fn logs_for_deployment(&self, deployment_id: &str) -> StateResult<Vec<LogEvent>> {
        let prefix = format!("{deployment_id}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(LOGS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let event: LogEvent =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(event);
            }
        }
        // Key order already follows timestamps, but ordering is defined by
        // the event timestamp, so sort explicitly.
        results.sort_by_key(|e| e.timestamp);
        Ok(results)
    }

    // ── Analytics ──────────────────────────────────────────────────

    /// Append one analytics record.
    pub fn append_analytics(&self, record: &AnalyticsRecord) -> StateResult<()> {
        let key = format!(
            "{}:{:020}:{:06}",
            record.subdomain,
            record.timestamp,
            self.next_seq()
        );
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(ANALYTICS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Analytics records for a subdomain with `timestamp >= from_ms`.
    pub fn analytics_since(
        &self,
        subdomain: &str,
        from_ms: u64,
    ) -> StateResult<Vec<AnalyticsRecord>> {
        let prefix = format!("{subdomain}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(ANALYTICS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let record: AnalyticsRecord =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if record.timestamp >= from_ms {
                    results.push(record);
                }
            }
        }
        Ok(results)
    }
}
