//! Result aggregation.
//!
//! Each function reduces a collaborator-produced report or log into
//! non-negative counts. Aggregation is read-only and idempotent: calling
//! it twice over the same input yields the same counts. An absent or
//! malformed report degrades to `Aggregated::Missing` rather than an
//! error; absence is distinct from a count of zero.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gantry_domain::{Aggregated, SceneCounts, TestCounts};

/// How the compiler formats warning lines in the build log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WarningStyle {
    /// MSVC style: `path(line): warning C1234: ...`
    Windows,

    /// gcc/clang style: `path:line:col: warning: ...`
    PosixLike,
}

impl WarningStyle {
    fn matches(&self, line: &str) -> bool {
        match self {
            WarningStyle::Windows => line.contains(": warning "),
            WarningStyle::PosixLike => line.contains("warning:"),
        }
    }
}

impl std::str::FromStr for WarningStyle {
    type Err = gantry_domain::PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "windows" => Ok(WarningStyle::Windows),
            "posix" | "posix-like" => Ok(WarningStyle::PosixLike),
            other => Err(gantry_domain::PipelineError::Usage(format!(
                "unknown warning style: {other}"
            ))),
        }
    }
}

/// Reduce a unit-test report into counts.
pub fn aggregate_tests(report: &Path) -> Aggregated<TestCounts> {
    read_report(report, "test")
}

/// Reduce a scene-test report into counts.
pub fn aggregate_scenes(report: &Path) -> Aggregated<SceneCounts> {
    read_report(report, "scene")
}

fn read_report<T: serde::de::DeserializeOwned>(report: &Path, kind: &str) -> Aggregated<T> {
    let data = match fs::read_to_string(report) {
        Ok(data) => data,
        Err(e) => {
            warn!(report = %report.display(), error = %e, "{kind} report absent");
            return Aggregated::Missing;
        }
    };
    match serde_json::from_str(&data) {
        Ok(counts) => Aggregated::Counted(counts),
        Err(e) => {
            warn!(report = %report.display(), error = %e, "{kind} report malformed");
            Aggregated::Missing
        }
    }
}

/// Count deduplicated compiler warnings in a build log.
///
/// Warning lines are trimmed of surrounding whitespace and deduplicated
/// by exact text equality before counting, so a header included from many
/// translation units counts once.
pub fn aggregate_warnings(log: &Path, style: WarningStyle) -> Aggregated<u64> {
    let data = match fs::read_to_string(log) {
        Ok(data) => data,
        Err(e) => {
            warn!(log = %log.display(), error = %e, "build log absent");
            return Aggregated::Missing;
        }
    };

    let mut seen: HashSet<&str> = HashSet::new();
    for line in data.lines() {
        let line = line.trim();
        if !line.is_empty() && style.matches(line) {
            seen.insert(line);
        }
    }

    debug!(log = %log.display(), count = seen.len(), "counted warnings");
    Aggregated::Counted(seen.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_aggregate_tests_reads_counts() {
        let dir = tempfile::tempdir().unwrap();
        let report = write_file(
            &dir,
            "tests.json",
            &json!({
                "suites": 4,
                "total": 120,
                "disabled": 3,
                "failures": 2,
                "errors": 1
            })
            .to_string(),
        );

        let counts = aggregate_tests(&report);
        let counts = counts.counted().copied().unwrap();
        assert_eq!(counts.suites, 4);
        assert_eq!(counts.total, 120);
        assert_eq!(counts.problems(), 3);
    }

    #[test]
    fn test_aggregate_tests_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let counts = aggregate_tests(&dir.path().join("absent.json"));
        assert!(counts.is_missing());
    }

    #[test]
    fn test_aggregate_tests_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let report = write_file(&dir, "bad.json", "not json at all");
        assert!(aggregate_tests(&report).is_missing());
    }

    #[test]
    fn test_aggregate_scenes_reads_counts() {
        let dir = tempfile::tempdir().unwrap();
        let report = write_file(
            &dir,
            "scenes.json",
            &json!({
                "total": 30,
                "successes": 27,
                "errors": 2,
                "crashes": 1
            })
            .to_string(),
        );

        let counts = aggregate_scenes(&report).counted().copied().unwrap();
        assert_eq!(counts.total, 30);
        assert_eq!(counts.problems(), 3);
    }

    #[test]
    fn test_warnings_posix_style() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_file(
            &dir,
            "build.log",
            "compiling a.c\n\
             a.c:10:3: warning: unused variable 'x'\n\
             b.c:4:1: warning: implicit declaration\n\
             linking\n",
        );

        assert_eq!(
            aggregate_warnings(&log, WarningStyle::PosixLike),
            Aggregated::Counted(2)
        );
    }

    #[test]
    fn test_warnings_windows_style() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_file(
            &dir,
            "build.log",
            "a.cpp(10): warning C4244: conversion\n\
             b.cpp(20): warning C4018: signed/unsigned mismatch\n\
             note: see declaration of 'x'\n",
        );

        assert_eq!(
            aggregate_warnings(&log, WarningStyle::Windows),
            Aggregated::Counted(2)
        );
    }

    #[test]
    fn test_warnings_deduplicate_after_trim() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_file(
            &dir,
            "build.log",
            "  a.c:10:3: warning: unused variable 'x'\n\
             a.c:10:3: warning: unused variable 'x'   \n\
             a.c:10:3: warning: unused variable 'x'\n",
        );

        assert_eq!(
            aggregate_warnings(&log, WarningStyle::PosixLike),
            Aggregated::Counted(1)
        );
    }

    #[test]
    fn test_warnings_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_file(&dir, "build.log", "a.c:1:1: warning: w1\n");

        let first = aggregate_warnings(&log, WarningStyle::PosixLike);
        let second = aggregate_warnings(&log, WarningStyle::PosixLike);
        assert_eq!(first, second);
    }

    #[test]
    fn test_warnings_missing_log() {
        let dir = tempfile::tempdir().unwrap();
        let counts = aggregate_warnings(&dir.path().join("absent.log"), WarningStyle::PosixLike);
        assert!(counts.is_missing());
    }

    #[test]
    fn test_warnings_zero_is_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let log = write_file(&dir, "clean.log", "compiling\nlinking\ndone\n");
        assert_eq!(
            aggregate_warnings(&log, WarningStyle::PosixLike),
            Aggregated::Counted(0)
        );
    }
}
