//! Aggregated result counts.
//!
//! A report category that was never produced is `Missing`, which is not
//! the same thing as a count of zero: zero means "ran and found nothing",
//! Missing means "the report was absent or malformed".

use serde::{Deserialize, Serialize};

/// Counts reduced from a unit-test report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestCounts {
    /// Number of test suites.
    pub suites: u64,

    /// Total tests run.
    pub total: u64,

    /// Tests disabled/skipped.
    pub disabled: u64,

    /// Assertion failures.
    pub failures: u64,

    /// Tests that errored rather than failed.
    pub errors: u64,
}

impl TestCounts {
    /// Failures plus errors.
    pub fn problems(&self) -> u64 {
        self.failures + self.errors
    }
}

/// Counts reduced from a scene-test report.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SceneCounts {
    /// Total scenes rendered.
    pub total: u64,

    /// Scenes that matched their reference output.
    pub successes: u64,

    /// Scenes that produced wrong output.
    pub errors: u64,

    /// Scenes that crashed the renderer.
    pub crashes: u64,
}

impl SceneCounts {
    /// Errors plus crashes.
    pub fn problems(&self) -> u64 {
        self.errors + self.crashes
    }
}

/// Outcome of one aggregation: a count, or nothing to count from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Aggregated<T> {
    /// The report existed and reduced to this value.
    Counted(T),

    /// The report was absent or malformed.
    Missing,
}

impl<T> Aggregated<T> {
    /// Whether the report was absent.
    pub fn is_missing(&self) -> bool {
        matches!(self, Aggregated::Missing)
    }

    /// The counted value, if present.
    pub fn counted(&self) -> Option<&T> {
        match self {
            Aggregated::Counted(value) => Some(value),
            Aggregated::Missing => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_test_problems() {
        let counts = TestCounts {
            suites: 3,
            total: 10,
            disabled: 1,
            failures: 2,
            errors: 1,
        };
        assert_eq!(counts.problems(), 3);
    }

    #[test]
    fn test_scene_problems() {
        let counts = SceneCounts {
            total: 20,
            successes: 17,
            errors: 2,
            crashes: 1,
        };
        assert_eq!(counts.problems(), 3);
    }

    #[test]
    fn test_missing_is_not_zero() {
        let missing: Aggregated<TestCounts> = Aggregated::Missing;
        let zero = Aggregated::Counted(TestCounts::default());
        assert!(missing.is_missing());
        assert!(!zero.is_missing());
        assert_ne!(missing, zero);
    }

    #[test]
    fn test_counted_accessor() {
        let counts = Aggregated::Counted(SceneCounts::default());
        assert!(counts.counted().is_some());
        let missing: Aggregated<SceneCounts> = Aggregated::Missing;
        assert!(missing.counted().is_none());
    }

    #[test]
    fn test_aggregated_serde_roundtrip() {
        let counts = Aggregated::Counted(TestCounts {
            suites: 1,
            total: 5,
            disabled: 0,
            failures: 1,
            errors: 0,
        });
        let json = serde_json::to_string(&counts).unwrap();
        let back: Aggregated<TestCounts> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, counts);
    }
}
