//! Severity classification of build stderr lines.
//!
//! Build tools write plenty of non-fatal chatter to stderr. A fixed,
//! data-driven substring table decides which lines are warnings; anything
//! unmatched is an error. Matching is case-insensitive, first match wins.

use loft_core::LogLevel;

/// Marker → severity, checked in order against the lowercased line.
const RULES: &[(&str, LogLevel)] = &[
    ("warn", LogLevel::Warn),
    ("deprecated", LogLevel::Warn),
    ("outdated", LogLevel::Warn),
    ("notice", LogLevel::Warn),
    ("skipping", LogLevel::Warn),
];

/// Classify one stderr line.
pub fn classify_stderr(line: &str) -> LogLevel {
    let lower = line.to_lowercase();
    for (marker, level) in RULES {
        if lower.contains(marker) {
            return *level;
        }
    }
    LogLevel::Error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn npm_warnings_are_warn() {
        assert_eq!(
            classify_stderr("npm WARN deprecated left-pad@1.0.0"),
            LogLevel::Warn
        );
        assert_eq!(classify_stderr("package is outdated"), LogLevel::Warn);
        assert_eq!(
            classify_stderr("npm notice a new version is available"),
            LogLevel::Warn
        );
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(classify_stderr("WARNING: something"), LogLevel::Warn);
        assert_eq!(classify_stderr("Deprecated API used"), LogLevel::Warn);
    }

    #[test]
    fn unmatched_lines_are_error() {
        assert_eq!(
            classify_stderr("Error: Cannot find module 'react'"),
            LogLevel::Error
        );
        assert_eq!(classify_stderr("segmentation fault"), LogLevel::Error);
    }
}
