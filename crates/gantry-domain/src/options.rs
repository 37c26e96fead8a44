//! Typed build options.
//!
//! Options are parsed once per pipeline run and membership-tested only;
//! the set is immutable and order-insensitive.

use std::collections::BTreeSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A named flag controlling one pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildOption {
    /// Discard all prior artifacts and rebuild from scratch.
    ForceFullBuild,

    /// Run the unit-test suite after a successful compile.
    RunUnitTests,

    /// Run the scene-test suite after a successful compile.
    RunSceneTests,

    /// Enable every optional plugin in the configure step.
    BuildAllPlugins,
}

impl BuildOption {
    /// Command-line spelling of this option.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildOption::ForceFullBuild => "force-full-build",
            BuildOption::RunUnitTests => "run-unit-tests",
            BuildOption::RunSceneTests => "run-scene-tests",
            BuildOption::BuildAllPlugins => "build-all-plugins",
        }
    }
}

impl FromStr for BuildOption {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "force-full-build" => Ok(BuildOption::ForceFullBuild),
            "run-unit-tests" => Ok(BuildOption::RunUnitTests),
            "run-scene-tests" => Ok(BuildOption::RunSceneTests),
            "build-all-plugins" => Ok(BuildOption::BuildAllPlugins),
            other => Err(PipelineError::Usage(format!(
                "unknown build option: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for BuildOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable set of build options for one pipeline run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildOptions(BTreeSet<BuildOption>);

impl BuildOptions {
    /// The empty option set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a comma-separated option list, e.g. `"run-unit-tests,force-full-build"`.
    ///
    /// Empty segments are ignored; unknown names are a usage error.
    pub fn parse_list(list: &str) -> crate::Result<Self> {
        let mut set = BTreeSet::new();
        for part in list.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            set.insert(part.parse::<BuildOption>()?);
        }
        Ok(BuildOptions(set))
    }

    /// Whether the given option was requested.
    pub fn contains(&self, option: BuildOption) -> bool {
        self.0.contains(&option)
    }

    /// Number of options in the set.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no options were requested.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate the options in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = BuildOption> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<BuildOption> for BuildOptions {
    fn from_iter<I: IntoIterator<Item = BuildOption>>(iter: I) -> Self {
        BuildOptions(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let options = BuildOptions::parse_list("run-unit-tests,force-full-build").unwrap();
        assert!(options.contains(BuildOption::RunUnitTests));
        assert!(options.contains(BuildOption::ForceFullBuild));
        assert!(!options.contains(BuildOption::RunSceneTests));
        assert_eq!(options.len(), 2);
    }

    #[test]
    fn test_parse_list_ignores_empty_segments() {
        let options = BuildOptions::parse_list("run-unit-tests,,").unwrap();
        assert_eq!(options.len(), 1);
    }

    #[test]
    fn test_parse_list_empty_string() {
        let options = BuildOptions::parse_list("").unwrap();
        assert!(options.is_empty());
    }

    #[test]
    fn test_parse_list_unknown_option_is_usage_error() {
        let err = BuildOptions::parse_list("run-unit-tests,bogus").unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_order_insensitive() {
        let a = BuildOptions::parse_list("run-unit-tests,run-scene-tests").unwrap();
        let b = BuildOptions::parse_list("run-scene-tests,run-unit-tests").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_duplicates_collapse() {
        let options = BuildOptions::parse_list("run-unit-tests,run-unit-tests").unwrap();
        assert_eq!(options.len(), 1);
    }

    #[test]
    fn test_option_roundtrip_via_str() {
        for option in [
            BuildOption::ForceFullBuild,
            BuildOption::RunUnitTests,
            BuildOption::RunSceneTests,
            BuildOption::BuildAllPlugins,
        ] {
            assert_eq!(option.as_str().parse::<BuildOption>().unwrap(), option);
        }
    }
}
