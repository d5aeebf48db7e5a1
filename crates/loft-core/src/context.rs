//! Execution context handed to an isolated build worker instance.
//!
//! The dispatcher serializes the context into environment variables when
//! launching a worker; the worker binary reads it back with
//! [`WorkerContext::from_env`]. Both directions live here so the variable
//! names have a single definition.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("ENV_VARIABLES is not valid JSON: {0}")]
    BadEnvJson(String),
}

/// Everything a build worker needs to run one deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerContext {
    pub deployment_id: String,
    pub project_id: String,
    pub subdomain: String,
    pub git_repository_url: String,
    pub branch: Option<String>,
    pub root_directory: Option<String>,
    /// Injected into the build's environment.
    pub env_variables: HashMap<String, String>,
    /// Credential for cloning private repositories. Held in memory only;
    /// must never reach persisted logs.
    pub repo_access_token: Option<String>,
}

impl WorkerContext {
    /// Read the context from the process environment.
    pub fn from_env() -> Result<Self, ContextError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the context through an arbitrary variable lookup (testable seam).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ContextError> {
        let required = |name: &'static str| -> Result<String, ContextError> {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ContextError::MissingVar(name))
        };
        let optional = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let env_variables = match optional("ENV_VARIABLES") {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|e| ContextError::BadEnvJson(e.to_string()))?,
            None => HashMap::new(),
        };

        Ok(Self {
            deployment_id: required("DEPLOYMENT_ID")?,
            project_id: required("PROJECT_ID")?,
            subdomain: required("SUBDOMAIN")?,
            git_repository_url: required("GIT_REPOSITORY_URL")?,
            branch: optional("BRANCH"),
            root_directory: optional("ROOT_DIRECTORY"),
            env_variables,
            repo_access_token: optional("REPO_ACCESS_TOKEN"),
        })
    }

    /// Serialize the context into the environment variables a launched
    /// worker instance expects.
    pub fn to_env(&self) -> Vec<(String, String)> {
        let mut vars = vec![
            ("DEPLOYMENT_ID".to_string(), self.deployment_id.clone()),
            ("PROJECT_ID".to_string(), self.project_id.clone()),
            ("SUBDOMAIN".to_string(), self.subdomain.clone()),
            (
                "GIT_REPOSITORY_URL".to_string(),
                self.git_repository_url.clone(),
            ),
        ];
        if let Some(branch) = &self.branch {
            vars.push(("BRANCH".to_string(), branch.clone()));
        }
        if let Some(root) = &self.root_directory {
            vars.push(("ROOT_DIRECTORY".to_string(), root.clone()));
        }
        if !self.env_variables.is_empty() {
            // Infallible: string maps always serialize.
            let json = serde_json::to_string(&self.env_variables).unwrap_or_default();
            vars.push(("ENV_VARIABLES".to_string(), json));
        }
        if let Some(token) = &self.repo_access_token {
            vars.push(("REPO_ACCESS_TOKEN".to_string(), token.clone()));
        }
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup_from(vars: &HashMap<String, String>) -> impl Fn(&str) -> Option<String> + '_ {
        move |name| vars.get(name).cloned()
    }

    fn full_context() -> WorkerContext {
        WorkerContext {
            deployment_id: "d-1".to_string(),
            project_id: "p-1".to_string(),
            subdomain: "acme".to_string(),
            git_repository_url: "https://github.com/acme/site.git".to_string(),
            branch: Some("main".to_string()),
            root_directory: Some("web".to_string()),
            env_variables: HashMap::from([("API_URL".to_string(), "https://api".to_string())]),
            repo_access_token: Some("tok-secret".to_string()),
        }
    }

    #[test]
    fn roundtrip_through_env_vars() {
        let ctx = full_context();
        let vars: HashMap<String, String> = ctx.to_env().into_iter().collect();
        let back = WorkerContext::from_lookup(lookup_from(&vars)).unwrap();
        assert_eq!(back, ctx);
    }

    #[test]
    fn missing_required_var_is_named() {
        let mut vars: HashMap<String, String> = full_context().to_env().into_iter().collect();
        vars.remove("GIT_REPOSITORY_URL");

        let err = WorkerContext::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, ContextError::MissingVar("GIT_REPOSITORY_URL")));
    }

    #[test]
    fn optional_vars_default() {
        let vars = HashMap::from([
            ("DEPLOYMENT_ID".to_string(), "d-1".to_string()),
            ("PROJECT_ID".to_string(), "p-1".to_string()),
            ("SUBDOMAIN".to_string(), "acme".to_string()),
            (
                "GIT_REPOSITORY_URL".to_string(),
                "https://github.com/acme/site.git".to_string(),
            ),
        ]);
        let ctx = WorkerContext::from_lookup(lookup_from(&vars)).unwrap();
        assert!(ctx.branch.is_none());
        assert!(ctx.root_directory.is_none());
        assert!(ctx.env_variables.is_empty());
        assert!(ctx.repo_access_token.is_none());
    }

    #[test]
    fn malformed_env_json_is_rejected() {
        let mut vars: HashMap<String, String> = full_context().to_env().into_iter().collect();
        vars.insert("ENV_VARIABLES".to_string(), "{not json".to_string());

        let err = WorkerContext::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, ContextError::BadEnvJson(_)));
    }
}
