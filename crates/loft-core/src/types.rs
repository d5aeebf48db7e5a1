//! Domain types for the Loft deploy platform.
//!
//! These types cross process boundaries: the dispatcher persists them, the
//! build worker publishes them onto the event channels, and the consumers
//! apply them back into the store. All of them are JSON-serialized.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a deployment (uuid v4, assigned by the dispatcher).
pub type DeploymentId = String;

/// Unique identifier for a project.
pub type ProjectId = String;

// ── Deployment ─────────────────────────────────────────────────────

/// Lifecycle status of a deployment.
///
/// Transitions are monotonic: `QUEUED → IN_PROGRESS → (READY | FAIL)`.
/// `READY` and `FAIL` are terminal and never overwritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    #[serde(rename = "QUEUED")]
    Queued,
    #[serde(rename = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "FAIL")]
    Fail,
}

impl DeploymentStatus {
    /// Stable wire-level string for this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Queued => "QUEUED",
            DeploymentStatus::InProgress => "IN_PROGRESS",
            DeploymentStatus::Ready => "READY",
            DeploymentStatus::Fail => "FAIL",
        }
    }

    /// READY and FAIL are absorbing states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Ready | DeploymentStatus::Fail)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One build-and-publish attempt for a project revision.
///
/// Created QUEUED by the dispatcher; only the status consumer (or the
/// dispatcher itself, on a failed launch) mutates it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deployment {
    pub id: DeploymentId,
    pub project_id: ProjectId,
    pub status: DeploymentStatus,
    /// Final reachable URL, set when the deployment goes READY.
    pub url: Option<String>,
    /// Unix timestamp (milliseconds) when the record was created.
    pub created_at: u64,
    /// Unix timestamp (milliseconds) of the last status change.
    pub updated_at: u64,
}

// ── Events ─────────────────────────────────────────────────────────

/// Severity assigned to a build output line by the worker's classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One line of build output, published on the log channel.
///
/// Append-only; ordering is defined by `timestamp`, not arrival order.
/// Duplicates are possible under at-least-once delivery and must be
/// tolerated by readers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEvent {
    pub deployment_id: DeploymentId,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub level: LogLevel,
    pub text: String,
}

/// A lifecycle transition, published on the status channel.
///
/// Transient message; only its effect on the `Deployment` record is
/// persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusEvent {
    pub deployment_id: DeploymentId,
    pub status: DeploymentStatus,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    /// Carried on READY: the final reachable URL.
    pub url: Option<String>,
}

// ── Project ────────────────────────────────────────────────────────

/// Project → subdomain mapping, read-only input to the worker and router.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    /// Routing key: the first host label that maps to this project.
    pub subdomain: String,
    /// Subdirectory of the repository to build from, if any.
    pub root_directory: Option<String>,
    /// Environment variables injected into the build.
    pub env_variables: HashMap<String, String>,
}

// ── Analytics ──────────────────────────────────────────────────────

/// One inbound request as observed by the artifact router.
///
/// Created once per request, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyticsRecord {
    pub subdomain: String,
    pub path: String,
    pub status_code: u16,
    pub response_time_ms: u64,
    pub client_ip: String,
    pub country: String,
    pub city: String,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
}

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_strings_are_stable() {
        for (status, wire) in [
            (DeploymentStatus::Queued, "\"QUEUED\""),
            (DeploymentStatus::InProgress, "\"IN_PROGRESS\""),
            (DeploymentStatus::Ready, "\"READY\""),
            (DeploymentStatus::Fail, "\"FAIL\""),
        ] {
            assert_eq!(serde_json::to_string(&status).unwrap(), wire);
            let parsed: DeploymentStatus = serde_json::from_str(wire).unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn terminal_statuses() {
        assert!(!DeploymentStatus::Queued.is_terminal());
        assert!(!DeploymentStatus::InProgress.is_terminal());
        assert!(DeploymentStatus::Ready.is_terminal());
        assert!(DeploymentStatus::Fail.is_terminal());
    }

    #[test]
    fn log_event_roundtrip() {
        let event = LogEvent {
            deployment_id: "d-1".to_string(),
            timestamp: 1000,
            level: LogLevel::Warn,
            text: "npm WARN deprecated".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"warn\""));
        let back: LogEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn epoch_millis_is_reasonable() {
        // After 2024-01-01.
        assert!(epoch_millis() > 1_704_067_200_000);
    }
}
