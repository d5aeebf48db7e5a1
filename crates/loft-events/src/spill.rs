//! Durable spill files for events that could not be published.
//!
//! One JSONL file per topic under the spill directory. `append` is called
//! by the producer after its retries are exhausted; `take` removes and
//! returns the backlog so it can be re-published when the channel is
//! reachable again.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Append-only spill storage, one file per topic.
#[derive(Debug, Clone)]
pub struct Spill {
    dir: PathBuf,
}

impl Spill {
    /// Create the spill directory if needed.
    pub fn new(dir: &Path) -> std::io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn file_for(&self, topic: &str) -> PathBuf {
        self.dir.join(format!("{topic}.jsonl"))
    }

    /// Append one serialized event. The payload must be a single JSON
    /// document without embedded newlines (serde_json's compact output).
    pub fn append(&self, topic: &str, payload: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_for(topic))?;
        file.write_all(payload)?;
        file.write_all(b"\n")?;
        Ok(())
    }

    /// Remove and return the spilled backlog for a topic, oldest first.
    pub fn take(&self, topic: &str) -> std::io::Result<Vec<Vec<u8>>> {
        let path = self.file_for(topic);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        fs::remove_file(&path)?;
        Ok(content
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| line.as_bytes().to_vec())
            .collect())
    }

    /// Number of spilled events for a topic (without consuming them).
    pub fn backlog(&self, topic: &str) -> usize {
        fs::read_to_string(self.file_for(topic))
            .map(|content| content.lines().filter(|l| !l.is_empty()).count())
            .unwrap_or(0)
    }
}
