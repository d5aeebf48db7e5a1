//! The per-deployment pipeline runner.
//!
//! Drives the stage sequence and owns the status protocol: exactly one
//! IN_PROGRESS at the start, exactly one terminal READY or FAIL at the
//! end. Stage progress and the final error (if any) are narrated into the
//! build log so the log is the complete user-facing record of the run.

use std::path::PathBuf;
use std::sync::Arc;

use object_store::ObjectStore;
use tracing::{error, info};

use loft_core::{
    DeploymentStatus, LogEvent, LogLevel, StatusEvent, WorkerContext, epoch_millis,
};

use crate::error::WorkerResult;
use crate::sink::EventSink;
use crate::{build, output, repo, upload};

/// Pipeline stage, used for progress narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Cloning,
    Building,
    DetectingOutput,
    Uploading,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Cloning => "cloning repository",
            Stage::Building => "installing dependencies and building",
            Stage::DetectingOutput => "locating build output",
            Stage::Uploading => "uploading artifacts",
        }
    }
}

/// External handles and settings for one worker run.
///
/// Everything the pipeline touches goes through here — no ambient state —
/// so tests substitute an in-memory sink and store.
pub struct WorkerDeps {
    pub sink: Arc<dyn EventSink>,
    pub store: Arc<dyn ObjectStore>,
    pub artifact_prefix: String,
    pub base_domain: String,
    pub build_command: String,
    pub extra_output_dirs: Vec<String>,
    pub workspace_dir: PathBuf,
}

impl WorkerDeps {
    async fn log(&self, ctx: &WorkerContext, level: LogLevel, text: String) {
        self.sink
            .log(LogEvent {
                deployment_id: ctx.deployment_id.clone(),
                timestamp: epoch_millis(),
                level,
                text,
            })
            .await;
    }

    async fn status(&self, ctx: &WorkerContext, status: DeploymentStatus, url: Option<String>) {
        self.sink
            .status(StatusEvent {
                deployment_id: ctx.deployment_id.clone(),
                status,
                timestamp: epoch_millis(),
                url,
            })
            .await;
    }

    async fn stage(&self, ctx: &WorkerContext, stage: Stage) {
        info!(deployment = %ctx.deployment_id, stage = ?stage, "entering stage");
        self.log(ctx, LogLevel::Info, stage.as_str().to_string()).await;
    }
}

/// Run one deployment end to end.
///
/// Returns the published URL on success. On any failure the error has
/// already been written to the build log and a FAIL status emitted.
pub async fn run(ctx: &WorkerContext, deps: &WorkerDeps) -> WorkerResult<String> {
    deps.status(ctx, DeploymentStatus::InProgress, None).await;

    let checkout = deps.workspace_dir.join(&ctx.deployment_id);
    let result = execute(ctx, deps, &checkout).await;
    // One-shot scratch space; removal failures are irrelevant.
    let _ = tokio::fs::remove_dir_all(&checkout).await;

    match result {
        Ok(url) => {
            deps.log(ctx, LogLevel::Info, format!("deployment ready at {url}"))
                .await;
            deps.status(ctx, DeploymentStatus::Ready, Some(url.clone()))
                .await;
            Ok(url)
        }
        Err(e) => {
            error!(deployment = %ctx.deployment_id, error = %e, "deployment failed");
            deps.log(ctx, LogLevel::Error, e.to_string()).await;
            deps.status(ctx, DeploymentStatus::Fail, None).await;
            Err(e)
        }
    }
}

async fn execute(
    ctx: &WorkerContext,
    deps: &WorkerDeps,
    checkout: &std::path::Path,
) -> WorkerResult<String> {
    tokio::fs::create_dir_all(&deps.workspace_dir).await?;

    deps.stage(ctx, Stage::Cloning).await;
    repo::clone_repository(ctx, checkout).await?;

    let project_root = match &ctx.root_directory {
        Some(root) => checkout.join(root),
        None => checkout.to_path_buf(),
    };

    deps.stage(ctx, Stage::Building).await;
    build::run_build(
        &project_root,
        &deps.build_command,
        &ctx.env_variables,
        &ctx.deployment_id,
        deps.sink.as_ref(),
    )
    .await?;

    deps.stage(ctx, Stage::DetectingOutput).await;
    let output_dir = output::detect_output_dir(&project_root, &deps.extra_output_dirs)?;

    deps.stage(ctx, Stage::Uploading).await;
    let summary = upload::upload_directory(
        &deps.store,
        &deps.artifact_prefix,
        &ctx.subdomain,
        &output_dir,
        &ctx.deployment_id,
        deps.sink.as_ref(),
    )
    .await?;
    deps.log(
        ctx,
        LogLevel::Info,
        format!(
            "uploaded {} files ({} bytes), {} failed",
            summary.uploaded, summary.bytes, summary.failed
        ),
    )
    .await;

    Ok(format!("http://{}.{}", ctx.subdomain, deps.base_domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkerError;
    use crate::sink::testing::CollectingSink;
    use object_store::memory::InMemory;
    use object_store::path::Path as StorePath;
    use std::collections::HashMap;
    use std::path::Path;
    use std::process::Command;

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args([
                "-c",
                "user.email=test@loft.dev",
                "-c",
                "user.name=loft-test",
            ])
            .args(args)
            .current_dir(dir)
            .status()
            .expect("git not available");
        assert!(status.success(), "git {args:?} failed");
    }

    /// A minimal repository whose "build" copies index.html into dist/.
    fn source_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>deployed</h1>").unwrap();
        git(dir.path(), &["init", "-q", "."]);
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-q", "-m", "init"]);
        dir
    }

    fn test_ctx(git_url: &str) -> WorkerContext {
        WorkerContext {
            deployment_id: "d-1".to_string(),
            project_id: "p-1".to_string(),
            subdomain: "acme".to_string(),
            git_repository_url: git_url.to_string(),
            branch: None,
            root_directory: None,
            env_variables: HashMap::new(),
            repo_access_token: None,
        }
    }

    fn test_deps(workspace: &Path, sink: Arc<CollectingSink>) -> WorkerDeps {
        WorkerDeps {
            sink,
            store: Arc::new(InMemory::new()),
            artifact_prefix: "sites".to_string(),
            base_domain: "loft.dev".to_string(),
            build_command: "mkdir -p dist && cp index.html dist/index.html".to_string(),
            extra_output_dirs: Vec::new(),
            workspace_dir: workspace.to_path_buf(),
        }
    }

    fn statuses(sink: &CollectingSink) -> Vec<DeploymentStatus> {
        sink.statuses.lock().unwrap().iter().map(|e| e.status).collect()
    }

    #[tokio::test]
    async fn successful_run_publishes_ready_with_url() {
        let repo = source_repo();
        let workspace = tempfile::tempdir().unwrap();
        let sink = Arc::new(CollectingSink::default());
        let deps = test_deps(workspace.path(), sink.clone());
        let ctx = test_ctx(&repo.path().display().to_string());

        let url = run(&ctx, &deps).await.unwrap();
        assert_eq!(url, "http://acme.loft.dev");

        assert_eq!(
            statuses(&sink),
            vec![DeploymentStatus::InProgress, DeploymentStatus::Ready]
        );
        let last_status = sink.statuses.lock().unwrap().last().cloned().unwrap();
        assert_eq!(last_status.url.as_deref(), Some("http://acme.loft.dev"));

        // The artifact landed under the tenant prefix.
        let stored = deps
            .store
            .get(&StorePath::from("sites/acme/index.html"))
            .await
            .unwrap();
        assert_eq!(stored.bytes().await.unwrap().as_ref(), b"<h1>deployed</h1>");
    }

    #[tokio::test]
    async fn clone_failure_fails_without_leaking_token() {
        let workspace = tempfile::tempdir().unwrap();
        let sink = Arc::new(CollectingSink::default());
        let deps = test_deps(workspace.path(), sink.clone());

        // Connection refused immediately; no repository behind it.
        let mut ctx = test_ctx("http://127.0.0.1:1/acme/site.git");
        ctx.repo_access_token = Some("sekrit-token".to_string());

        let err = run(&ctx, &deps).await.unwrap_err();
        assert!(matches!(err, WorkerError::CloneFailed(_)));

        assert_eq!(
            statuses(&sink),
            vec![DeploymentStatus::InProgress, DeploymentStatus::Fail]
        );
        for event in sink.logs.lock().unwrap().iter() {
            assert!(
                !event.text.contains("sekrit-token"),
                "token leaked into log: {}",
                event.text
            );
        }
    }

    #[tokio::test]
    async fn build_failure_is_terminal() {
        let repo = source_repo();
        let workspace = tempfile::tempdir().unwrap();
        let sink = Arc::new(CollectingSink::default());
        let mut deps = test_deps(workspace.path(), sink.clone());
        deps.build_command = "echo compiling; exit 2".to_string();
        let ctx = test_ctx(&repo.path().display().to_string());

        let err = run(&ctx, &deps).await.unwrap_err();
        assert!(matches!(err, WorkerError::BuildFailed { exit_code: 2 }));
        assert_eq!(
            statuses(&sink),
            vec![DeploymentStatus::InProgress, DeploymentStatus::Fail]
        );
    }

    #[tokio::test]
    async fn missing_output_dir_is_distinct_failure() {
        let repo = source_repo();
        let workspace = tempfile::tempdir().unwrap();
        let sink = Arc::new(CollectingSink::default());
        let mut deps = test_deps(workspace.path(), sink.clone());
        // Build succeeds but produces nothing.
        deps.build_command = "true".to_string();
        let ctx = test_ctx(&repo.path().display().to_string());

        let err = run(&ctx, &deps).await.unwrap_err();
        assert!(matches!(err, WorkerError::NoOutputDir { .. }));

        // The failure reads differently from a build-command failure.
        let logs = sink.logs.lock().unwrap();
        assert!(logs.iter().any(|e| e.text.contains("no output folder")));
        assert!(!logs.iter().any(|e| e.text.contains("exited with code")));
    }

    #[tokio::test]
    async fn root_directory_scopes_the_build() {
        let repo = tempfile::tempdir().unwrap();
        std::fs::create_dir(repo.path().join("web")).unwrap();
        std::fs::write(repo.path().join("web/index.html"), "<p>sub</p>").unwrap();
        git(repo.path(), &["init", "-q", "."]);
        git(repo.path(), &["add", "."]);
        git(repo.path(), &["commit", "-q", "-m", "init"]);

        let workspace = tempfile::tempdir().unwrap();
        let sink = Arc::new(CollectingSink::default());
        let deps = test_deps(workspace.path(), sink.clone());
        let mut ctx = test_ctx(&repo.path().display().to_string());
        ctx.root_directory = Some("web".to_string());

        run(&ctx, &deps).await.unwrap();
        assert!(
            deps.store
                .get(&StorePath::from("sites/acme/index.html"))
                .await
                .is_ok()
        );
    }
}
