//! Install-and-build subprocess execution.
//!
//! The project's install and build commands run as a single `sh -c`
//! pipeline with both output streams captured and multiplexed into the
//! log-emission path: stdout lines are published verbatim as INFO, stderr
//! lines go through the severity classifier. A non-zero exit fails the
//! deployment.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use loft_core::{LogEvent, LogLevel, epoch_millis};

use crate::classify::classify_stderr;
use crate::error::{WorkerError, WorkerResult};
use crate::sink::EventSink;

fn line_event(deployment_id: &str, level: LogLevel, text: String) -> LogEvent {
    LogEvent {
        deployment_id: deployment_id.to_string(),
        timestamp: epoch_millis(),
        level,
        text,
    }
}

async fn pump_lines<R, F>(
    reader: R,
    deployment_id: &str,
    sink: &dyn EventSink,
    level_for: F,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
    F: Fn(&str) -> LogLevel,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let level = level_for(&line);
        sink.log(line_event(deployment_id, level, line)).await;
    }
    Ok(())
}

/// Run the build command in `project_dir`, streaming output as log events.
pub async fn run_build(
    project_dir: &Path,
    command: &str,
    env: &HashMap<String, String>,
    deployment_id: &str,
    sink: &dyn EventSink,
) -> WorkerResult<()> {
    debug!(%command, dir = %project_dir.display(), "starting build");

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .current_dir(project_dir)
        .envs(env)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

    let (stdout_result, stderr_result) = tokio::join!(
        pump_lines(stdout, deployment_id, sink, |_| LogLevel::Info),
        pump_lines(stderr, deployment_id, sink, classify_stderr),
    );
    stdout_result?;
    stderr_result?;

    let status = child.wait().await?;
    if !status.success() {
        return Err(WorkerError::BuildFailed {
            exit_code: status.code().unwrap_or(-1),
        });
    }

    info!("build complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::CollectingSink;

    async fn run(command: &str, env: &HashMap<String, String>) -> (WorkerResult<()>, CollectingSink) {
        let dir = tempfile::tempdir().unwrap();
        let sink = CollectingSink::default();
        let result = run_build(dir.path(), command, env, "d-1", &sink).await;
        (result, sink)
    }

    #[tokio::test]
    async fn stdout_lines_become_info_events() {
        let (result, sink) = run("echo one; echo two", &HashMap::new()).await;
        result.unwrap();

        let logs = sink.logs.lock().unwrap();
        let lines: Vec<(&str, LogLevel)> =
            logs.iter().map(|e| (e.text.as_str(), e.level)).collect();
        assert_eq!(
            lines,
            vec![("one", LogLevel::Info), ("two", LogLevel::Info)]
        );
    }

    #[tokio::test]
    async fn stderr_lines_are_classified() {
        let (result, sink) = run(
            "echo 'npm WARN deprecated pkg' >&2; echo 'module not found' >&2",
            &HashMap::new(),
        )
        .await;
        result.unwrap();

        let logs = sink.logs.lock().unwrap();
        let warn = logs.iter().find(|e| e.text.contains("WARN")).unwrap();
        let error = logs.iter().find(|e| e.text.contains("not found")).unwrap();
        assert_eq!(warn.level, LogLevel::Warn);
        assert_eq!(error.level, LogLevel::Error);
    }

    #[tokio::test]
    async fn project_env_is_injected() {
        let env = HashMap::from([("LOFT_TEST_VALUE".to_string(), "injected".to_string())]);
        let (result, sink) = run("echo \"$LOFT_TEST_VALUE\"", &env).await;
        result.unwrap();

        let logs = sink.logs.lock().unwrap();
        assert_eq!(logs[0].text, "injected");
    }

    #[tokio::test]
    async fn nonzero_exit_fails_with_code() {
        let (result, _sink) = run("echo started; exit 3", &HashMap::new()).await;
        match result {
            Err(WorkerError::BuildFailed { exit_code }) => assert_eq!(exit_code, 3),
            other => panic!("expected BuildFailed, got {other:?}"),
        }
    }
}
