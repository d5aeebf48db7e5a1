//! Build output directory detection.
//!
//! Frameworks disagree about where the static output lands. A fixed,
//! ordered candidate list is scanned relative to the project root; the
//! first existing directory wins. Nothing is ever silently defaulted —
//! no match is its own failure category, distinct from a build failure.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

/// Built-in candidates, highest priority first.
pub const OUTPUT_CANDIDATES: &[&str] = &["build", "dist", "out", ".next", ".output", "public"];

/// Find the output directory under `project_root`.
///
/// `extra` candidates (from config) are tried after the built-in list.
pub fn detect_output_dir(project_root: &Path, extra: &[String]) -> WorkerResult<PathBuf> {
    let candidates = OUTPUT_CANDIDATES
        .iter()
        .map(|s| s.to_string())
        .chain(extra.iter().cloned());

    let mut searched = Vec::new();
    for candidate in candidates {
        let path = project_root.join(&candidate);
        if path.is_dir() {
            debug!(dir = %candidate, "output directory detected");
            return Ok(path);
        }
        searched.push(candidate);
    }

    Err(WorkerError::NoOutputDir {
        searched: searched.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn first_existing_candidate_wins() {
        let dir = tempfile::tempdir().unwrap();
        // "build" is absent; "dist" and "public" both exist.
        fs::create_dir(dir.path().join("dist")).unwrap();
        fs::create_dir(dir.path().join("public")).unwrap();

        let detected = detect_output_dir(dir.path(), &[]).unwrap();
        assert_eq!(detected, dir.path().join("dist"));
    }

    #[test]
    fn files_do_not_count_as_output_dirs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("build"), "not a directory").unwrap();
        fs::create_dir(dir.path().join("out")).unwrap();

        let detected = detect_output_dir(dir.path(), &[]).unwrap();
        assert_eq!(detected, dir.path().join("out"));
    }

    #[test]
    fn no_candidate_is_a_distinct_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = detect_output_dir(dir.path(), &[]).unwrap_err();
        match err {
            WorkerError::NoOutputDir { searched } => {
                assert!(searched.contains("build"));
                assert!(searched.contains("public"));
            }
            other => panic!("expected NoOutputDir, got {other:?}"),
        }
    }

    #[test]
    fn extra_candidates_come_last() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("public")).unwrap();
        fs::create_dir(dir.path().join("_site")).unwrap();

        // Built-in "public" outranks the configured extra.
        let detected = detect_output_dir(dir.path(), &["_site".to_string()]).unwrap();
        assert_eq!(detected, dir.path().join("public"));

        fs::remove_dir(dir.path().join("public")).unwrap();
        let detected = detect_output_dir(dir.path(), &["_site".to_string()]).unwrap();
        assert_eq!(detected, dir.path().join("_site"));
    }
}
