//! Artifact key scheme and object-store construction.
//!
//! The uploader and the router must agree on the exact storage layout:
//! `{artifact_prefix}/{subdomain}/{relative_path}`. Both sides call
//! [`object_key`] so the scheme has a single definition.

use std::sync::Arc;

use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;

use crate::config::ArtifactsConfig;

/// Storage key for one artifact file of a tenant.
///
/// `relative_path` is relative to the detected output directory; a leading
/// slash is tolerated so the router can pass request paths directly.
pub fn object_key(prefix: &str, subdomain: &str, relative_path: &str) -> String {
    let rel = relative_path.trim_start_matches('/');
    format!("{prefix}/{subdomain}/{rel}")
}

/// Content type for a storage key, from the file extension.
///
/// Unknown extensions fall back to `application/octet-stream`.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default();
    match ext {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" | "mjs" => "application/javascript",
        "json" => "application/json",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "pdf" => "application/pdf",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "map" => "application/json",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// Build the artifact store handle from config.
///
/// Returned as `Arc<dyn ObjectStore>` so the worker, router and tests all
/// hold the same seam.
pub fn store_from_config(config: &ArtifactsConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config {
        ArtifactsConfig::Local { path } => {
            std::fs::create_dir_all(path)?;
            Ok(Arc::new(LocalFileSystem::new_with_prefix(path)?))
        }
        ArtifactsConfig::S3 {
            bucket,
            region,
            endpoint,
        } => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(region) = region {
                builder = builder.with_region(region);
            }
            if let Some(endpoint) = endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            Ok(Arc::new(builder.build()?))
        }
        ArtifactsConfig::Memory => Ok(Arc::new(InMemory::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_scheme() {
        assert_eq!(
            object_key("sites", "acme", "assets/app.js"),
            "sites/acme/assets/app.js"
        );
    }

    #[test]
    fn root_and_index_resolve_to_same_key() {
        // `/` is rewritten to `/index.html` by the router before key
        // construction; both spellings must land on one object.
        let direct = object_key("sites", "acme", "/index.html");
        let rewritten = object_key("sites", "acme", "index.html");
        assert_eq!(direct, rewritten);
        assert_eq!(direct, "sites/acme/index.html");
    }

    #[test]
    fn content_types() {
        assert_eq!(content_type_for("index.html"), "text/html");
        assert_eq!(content_type_for("assets/app.js"), "application/javascript");
        assert_eq!(content_type_for("style.css"), "text/css");
        assert_eq!(content_type_for("logo.svg"), "image/svg+xml");
        assert_eq!(content_type_for("no-extension"), "application/octet-stream");
    }

    #[test]
    fn memory_backend_builds() {
        let store = store_from_config(&ArtifactsConfig::Memory);
        assert!(store.is_ok());
    }
}
