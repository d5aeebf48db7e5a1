//! Artifact upload — best-effort, partial-failure tolerant.
//!
//! Walks the detected output directory (files only), computes each file's
//! storage key via the shared scheme, and uploads with the content type
//! derived from the extension. A single failed asset degrades the deploy
//! but never cancels it; only walk-level errors are fatal.

use std::path::Path;
use std::sync::Arc;

use object_store::path::Path as StorePath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use loft_core::artifacts::{content_type_for, object_key};
use loft_core::{LogEvent, LogLevel, epoch_millis};

use crate::error::WorkerResult;
use crate::sink::EventSink;

/// Result of one upload pass over the output directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub uploaded: u32,
    pub failed: u32,
    pub bytes: u64,
}

/// Upload every file under `output_dir` to the artifact store.
pub async fn upload_directory(
    store: &Arc<dyn ObjectStore>,
    prefix: &str,
    subdomain: &str,
    output_dir: &Path,
    deployment_id: &str,
    sink: &dyn EventSink,
) -> WorkerResult<UploadSummary> {
    let mut summary = UploadSummary::default();

    for entry in WalkDir::new(output_dir) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(output_dir)
            .map_err(std::io::Error::other)?;
        let key = object_key(prefix, subdomain, &rel.to_string_lossy());

        let data = match tokio::fs::read(entry.path()).await {
            Ok(data) => data,
            Err(e) => {
                summary.failed += 1;
                report_failure(sink, deployment_id, &key, &e.to_string()).await;
                continue;
            }
        };

        let digest = hex::encode(Sha256::digest(&data));
        let size = data.len() as u64;

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type_for(&key).into());
        let opts = PutOptions {
            attributes,
            ..Default::default()
        };

        match store
            .put_opts(&StorePath::from(key.clone()), data.into(), opts)
            .await
        {
            Ok(_) => {
                summary.uploaded += 1;
                summary.bytes += size;
                debug!(%key, size, %digest, "artifact uploaded");
            }
            Err(e) => {
                summary.failed += 1;
                report_failure(sink, deployment_id, &key, &e.to_string()).await;
            }
        }
    }

    Ok(summary)
}

async fn report_failure(sink: &dyn EventSink, deployment_id: &str, key: &str, error: &str) {
    warn!(%key, %error, "artifact upload failed");
    sink.log(LogEvent {
        deployment_id: deployment_id.to_string(),
        timestamp: epoch_millis(),
        level: LogLevel::Warn,
        text: format!("failed to upload {key}: {error}"),
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::testing::CollectingSink;
    use object_store::memory::InMemory;
    use std::fs;

    fn site_fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<h1>hi</h1>").unwrap();
        fs::create_dir(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets/app.js"), "console.log(1)").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        dir
    }

    #[tokio::test]
    async fn uploads_files_under_tenant_prefix() {
        let dir = site_fixture();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let sink = CollectingSink::default();

        let summary =
            upload_directory(&store, "sites", "acme", dir.path(), "d-1", &sink)
                .await
                .unwrap();

        assert_eq!(summary.uploaded, 2);
        assert_eq!(summary.failed, 0);

        let index = store
            .get(&StorePath::from("sites/acme/index.html"))
            .await
            .unwrap();
        assert_eq!(index.bytes().await.unwrap().as_ref(), b"<h1>hi</h1>");

        let js = store
            .get(&StorePath::from("sites/acme/assets/app.js"))
            .await
            .unwrap();
        assert_eq!(js.bytes().await.unwrap().as_ref(), b"console.log(1)");
    }

    #[tokio::test]
    async fn content_type_is_attached() {
        let dir = site_fixture();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let sink = CollectingSink::default();

        upload_directory(&store, "sites", "acme", dir.path(), "d-1", &sink)
            .await
            .unwrap();

        let result = store
            .get(&StorePath::from("sites/acme/index.html"))
            .await
            .unwrap();
        let content_type = result.attributes.get(&Attribute::ContentType);
        assert_eq!(content_type.map(|v| v.as_ref()), Some("text/html"));
    }

    #[tokio::test]
    async fn directories_are_skipped() {
        let dir = site_fixture();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let sink = CollectingSink::default();

        let summary =
            upload_directory(&store, "sites", "acme", dir.path(), "d-1", &sink)
                .await
                .unwrap();

        // Two files, none for "assets/" or "empty/" themselves.
        assert_eq!(summary.uploaded, 2);
        assert!(summary.bytes > 0);
    }

    #[tokio::test]
    async fn empty_output_dir_uploads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let sink = CollectingSink::default();

        let summary =
            upload_directory(&store, "sites", "acme", dir.path(), "d-1", &sink)
                .await
                .unwrap();
        assert_eq!(summary, UploadSummary::default());
    }
}
