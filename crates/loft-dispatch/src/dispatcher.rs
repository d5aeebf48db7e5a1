//! Deployment launch: record creation plus worker instance start.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use loft_core::{
    Deployment, DeploymentStatus, LogEvent, LogLevel, Project, StatusEvent, WorkerContext,
    epoch_millis,
};
use loft_state::StateStore;

use crate::error::{DispatchError, DispatchResult};
use crate::launcher::WorkerLauncher;

/// A deployment request, manual or webhook-triggered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub git_url: String,
    pub project_id: String,
    #[serde(default)]
    pub branch: Option<String>,
    /// Tenant subdomain; generated when absent.
    #[serde(default)]
    pub subdomain: Option<String>,
    #[serde(default)]
    pub root_directory: Option<String>,
    #[serde(default)]
    pub env_variables: HashMap<String, String>,
    /// Credential for private repositories; forwarded to the worker's
    /// environment, never persisted.
    #[serde(default)]
    pub repo_access_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LaunchResponse {
    pub deployment_id: String,
    pub predicted_url: String,
}

/// Accepts deployment requests and starts build workers.
pub struct Dispatcher {
    store: StateStore,
    launcher: Arc<dyn WorkerLauncher>,
    base_domain: String,
}

impl Dispatcher {
    pub fn new(store: StateStore, launcher: Arc<dyn WorkerLauncher>, base_domain: String) -> Self {
        Self {
            store,
            launcher,
            base_domain,
        }
    }

    /// Create the deployment and fire off a worker instance.
    ///
    /// Returns as soon as the instance has been handed to the platform.
    /// If the launch itself fails, the deployment is transitioned straight
    /// to FAIL with a synthetic log entry — the worker never ran, so no
    /// other component will ever do it — and the response is still
    /// returned so the caller can query the record.
    pub async fn launch(&self, request: LaunchRequest) -> DispatchResult<LaunchResponse> {
        let subdomain = match &request.subdomain {
            Some(subdomain) => validate_subdomain(subdomain)?,
            None => generate_slug(),
        };
        let deployment_id = Uuid::new_v4().to_string();
        let now = epoch_millis();

        self.store.put_project(&Project {
            id: request.project_id.clone(),
            subdomain: subdomain.clone(),
            root_directory: request.root_directory.clone(),
            env_variables: request.env_variables.clone(),
        })?;
        self.store.put_deployment(&Deployment {
            id: deployment_id.clone(),
            project_id: request.project_id.clone(),
            status: DeploymentStatus::Queued,
            url: None,
            created_at: now,
            updated_at: now,
        })?;

        let ctx = WorkerContext {
            deployment_id: deployment_id.clone(),
            project_id: request.project_id.clone(),
            subdomain: subdomain.clone(),
            git_repository_url: request.git_url.clone(),
            branch: request.branch.clone(),
            root_directory: request.root_directory.clone(),
            env_variables: request.env_variables.clone(),
            repo_access_token: request.repo_access_token.clone(),
        };

        let predicted_url = format!("http://{subdomain}.{}", self.base_domain);

        if let Err(reason) = self.launcher.launch(&ctx).await {
            error!(deployment = %deployment_id, %reason, "worker launch failed");
            self.store.apply_status(&StatusEvent {
                deployment_id: deployment_id.clone(),
                status: DeploymentStatus::Fail,
                timestamp: epoch_millis(),
                url: None,
            })?;
            self.store.append_log(&LogEvent {
                deployment_id: deployment_id.clone(),
                timestamp: epoch_millis(),
                level: LogLevel::Error,
                text: format!("failed to launch build worker: {reason}"),
            })?;
        } else {
            info!(
                deployment = %deployment_id,
                %subdomain,
                repository = %request.git_url,
                "deployment queued"
            );
        }

        Ok(LaunchResponse {
            deployment_id,
            predicted_url,
        })
    }
}

/// Subdomains are DNS labels: lowercase alphanumeric plus dashes, at most
/// 63 characters, no leading dash.
fn validate_subdomain(subdomain: &str) -> DispatchResult<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern =
        PATTERN.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9-]{0,62}$").unwrap());
    if pattern.is_match(subdomain) {
        Ok(subdomain.to_string())
    } else {
        Err(DispatchError::InvalidSubdomain(subdomain.to_string()))
    }
}

/// Random 8-character tenant slug.
fn generate_slug() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
