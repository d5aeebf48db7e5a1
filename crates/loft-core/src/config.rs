//! loft.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoftConfig {
    pub platform: PlatformConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub geo: GeoConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Domain that tenant subdomains hang off, e.g. `loft.dev`.
    pub base_domain: String,
    /// Object-store prefix all artifacts are published under.
    #[serde(default = "default_artifact_prefix")]
    pub artifact_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Kafka bootstrap servers.
    pub brokers: String,
    pub log_topic: String,
    pub status_topic: String,
    /// Consumer group shared by the log and status ingestors.
    pub group: String,
    /// Max messages per ingestion batch.
    pub max_batch: usize,
    /// How long a partially filled batch may linger before being applied.
    pub batch_linger_ms: u64,
    /// Upper bound on batch processing time before the group evicts us.
    pub max_poll_interval_ms: u64,
    /// Publish attempts before an event is spilled to disk.
    pub send_retries: u32,
    pub send_backoff_ms: u64,
    /// Directory for the durable spill files of unsendable events.
    pub spill_dir: PathBuf,
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            log_topic: "deploy-logs".to_string(),
            status_topic: "deploy-status".to_string(),
            group: "loft-ingest".to_string(),
            max_batch: 100,
            batch_linger_ms: 500,
            max_poll_interval_ms: 300_000,
            send_retries: 3,
            send_backoff_ms: 250,
            spill_dir: PathBuf::from("/var/lib/loft/spill"),
        }
    }
}

/// Where published artifacts live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ArtifactsConfig {
    /// Local filesystem, rooted at `path`.
    Local { path: PathBuf },
    /// S3-compatible object store.
    S3 {
        bucket: String,
        region: Option<String>,
        endpoint: Option<String>,
    },
    /// Ephemeral in-memory store (tests, demos).
    Memory,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        ArtifactsConfig::Local {
            path: PathBuf::from("/var/lib/loft/artifacts"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Primary geo-resolution endpoint; `{ip}` is appended as a path
    /// segment. None disables the network lookup entirely.
    pub endpoint: Option<String>,
    /// Deadline for the primary lookup.
    pub timeout_ms: u64,
    pub cache_ttl_secs: u64,
    /// How often expired cache entries are purged.
    pub purge_interval_secs: u64,
    /// Secondary resolver: IP prefix → `Country/City`.
    #[serde(default)]
    pub static_table: HashMap<String, String>,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: 500,
            cache_ttl_secs: 3600,
            purge_interval_secs: 300,
            static_table: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Scratch directory a worker clones and builds under.
    pub workspace_dir: PathBuf,
    /// Install-and-build command run through `sh -c` in the project root.
    pub build_command: String,
    /// Output-dir candidates appended after the built-in priority list.
    #[serde(default)]
    pub extra_output_dirs: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            workspace_dir: PathBuf::from("/tmp/loft-build"),
            build_command: "npm install && npm run build".to_string(),
            extra_output_dirs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Path to the worker binary launched per deployment.
    pub worker_binary: PathBuf,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_binary: PathBuf::from("loft-worker"),
        }
    }
}

fn default_artifact_prefix() -> String {
    "sites".to_string()
}

impl LoftConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: LoftConfig = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal() {
        let toml_str = r#"
[platform]
base_domain = "loft.dev"
"#;
        let config: LoftConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.platform.base_domain, "loft.dev");
        assert_eq!(config.platform.artifact_prefix, "sites");
        assert_eq!(config.channels.log_topic, "deploy-logs");
        assert!(matches!(config.artifacts, ArtifactsConfig::Local { .. }));
    }

    #[test]
    fn parse_s3_backend() {
        let toml_str = r#"
[platform]
base_domain = "loft.dev"

[artifacts]
backend = "s3"
bucket = "loft-artifacts"
region = "eu-west-1"
"#;
        let config: LoftConfig = toml::from_str(toml_str).unwrap();
        match config.artifacts {
            ArtifactsConfig::S3 { bucket, region, endpoint } => {
                assert_eq!(bucket, "loft-artifacts");
                assert_eq!(region.as_deref(), Some("eu-west-1"));
                assert!(endpoint.is_none());
            }
            other => panic!("expected s3 backend, got {other:?}"),
        }
    }

    #[test]
    fn parse_geo_static_table() {
        let toml_str = r#"
[platform]
base_domain = "loft.dev"

[geo]
endpoint = "http://ip-api.example/json"
timeout_ms = 300
cache_ttl_secs = 60
purge_interval_secs = 10

[geo.static_table]
"10.1." = "Germany/Berlin"
"#;
        let config: LoftConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.geo.static_table["10.1."], "Germany/Berlin");
        assert_eq!(config.geo.timeout_ms, 300);
    }
}
