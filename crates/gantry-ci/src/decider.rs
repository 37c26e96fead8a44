//! Full vs. incremental build decision.
//!
//! The rules are evaluated in strict priority order; the first match
//! wins. Build-configuration-script changes force a full build because
//! they can silently corrupt a partially-configured build directory,
//! which is cheaper to avoid than to model.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use gantry_domain::{BuildCacheState, BuildOption, BuildOptions, PipelineError, RevisionId};

/// Why a full build was chosen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FullBuildReason {
    /// The force-full-build option was set.
    Forced,

    /// No configured build exists in the directory.
    NoPreviousBuild,

    /// The directory has a cache but no recorded revision.
    LastRevisionUnknown,

    /// A build-configuration script changed since the last build.
    BuildScriptChanged,

    /// The changed-paths query failed; assume changed to be safe.
    ChangesUnknown,
}

impl std::fmt::Display for FullBuildReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            FullBuildReason::Forced => "forced",
            FullBuildReason::NoPreviousBuild => "no previous build detected",
            FullBuildReason::LastRevisionUnknown => "last build's commit not found",
            FullBuildReason::BuildScriptChanged => "build script changed",
            FullBuildReason::ChangesUnknown => "changed files could not be determined",
        };
        write!(f, "{msg}")
    }
}

/// The decision: wipe and rebuild, or reuse prior artifacts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "mode", content = "reason")]
pub enum BuildMode {
    Full(FullBuildReason),
    Incremental,
}

impl BuildMode {
    pub fn is_full(&self) -> bool {
        matches!(self, BuildMode::Full(_))
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BuildMode::Full(reason) => write!(f, "full ({reason})"),
            BuildMode::Incremental => write!(f, "incremental"),
        }
    }
}

/// Whether a changed path is a build-configuration script.
///
/// Matches a `cmake/` path segment combined with a `.cmake` suffix,
/// case-sensitive.
pub fn is_build_script(path: &Path) -> bool {
    let in_cmake_dir = path
        .components()
        .any(|c| c.as_os_str().to_str() == Some("cmake"));
    let cmake_suffix = path.extension().and_then(|e| e.to_str()) == Some("cmake");
    in_cmake_dir && cmake_suffix
}

/// Decide between a full and an incremental build.
///
/// Priority order, first match wins:
/// 1. force-full-build option
/// 2. no prior build cache
/// 3. no recorded last-built revision
/// 4. a build-configuration script changed
/// 5. otherwise incremental
pub fn decide(
    options: &BuildOptions,
    cache: &BuildCacheState,
    changed_paths: &BTreeSet<PathBuf>,
) -> BuildMode {
    if options.contains(BuildOption::ForceFullBuild) {
        return BuildMode::Full(FullBuildReason::Forced);
    }
    if !cache.has_cache {
        return BuildMode::Full(FullBuildReason::NoPreviousBuild);
    }
    if cache.last_built_revision.is_none() {
        return BuildMode::Full(FullBuildReason::LastRevisionUnknown);
    }
    if changed_paths.iter().any(|p| is_build_script(p)) {
        return BuildMode::Full(FullBuildReason::BuildScriptChanged);
    }
    BuildMode::Incremental
}

/// Applies a [`BuildMode`] decision to a build directory.
pub struct BuildModeDecider;

impl BuildModeDecider {
    /// Carry out the decision's side effects and return the cache state
    /// to persist for this run.
    ///
    /// Full: wipe the build directory contents (retrying once; a failed
    /// wipe is logged and tolerated since the configure step overwrites
    /// a stale directory anyway), then record the current revision with
    /// the full-build marker set.
    ///
    /// Incremental: no destructive action; the current revision is
    /// recorded and any stale full-build marker is cleared.
    pub fn apply(
        mode: &BuildMode,
        build_dir: &Path,
        current_revision: &RevisionId,
    ) -> BuildCacheState {
        let is_full = mode.is_full();
        info!(mode = %mode, build_dir = %build_dir.display(), "applying build mode");

        if is_full {
            if let Err(first) = wipe_dir_contents(build_dir) {
                warn!(error = %first, "build directory wipe failed, retrying once");
                if let Err(second) = wipe_dir_contents(build_dir) {
                    // Known flaky on some platforms; the configure step
                    // will overwrite whatever is left behind.
                    let err = PipelineError::CacheResetFailed(format!(
                        "{}: {second}",
                        build_dir.display()
                    ));
                    warn!(error = %err, "proceeding with a partially wiped directory");
                }
            }
        }

        BuildCacheState {
            has_cache: !is_full && BuildCacheState::load(build_dir).has_cache,
            last_built_revision: Some(current_revision.clone()),
            is_full_build: is_full,
        }
    }
}

fn wipe_dir_contents(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cached_state() -> BuildCacheState {
        BuildCacheState {
            has_cache: true,
            last_built_revision: Some(RevisionId::new("abc123")),
            is_full_build: false,
        }
    }

    fn paths(items: &[&str]) -> BTreeSet<PathBuf> {
        items.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_forced_wins_over_everything() {
        let options = BuildOptions::parse_list("force-full-build").unwrap();
        let mode = decide(&options, &cached_state(), &BTreeSet::new());
        assert_eq!(mode, BuildMode::Full(FullBuildReason::Forced));

        // Even with no cache, the forced reason takes priority.
        let mode = decide(&options, &BuildCacheState::fresh(), &BTreeSet::new());
        assert_eq!(mode, BuildMode::Full(FullBuildReason::Forced));
    }

    #[test]
    fn test_no_cache_forces_full() {
        let mode = decide(
            &BuildOptions::empty(),
            &BuildCacheState::fresh(),
            &BTreeSet::new(),
        );
        assert_eq!(mode, BuildMode::Full(FullBuildReason::NoPreviousBuild));
    }

    #[test]
    fn test_missing_revision_forces_full() {
        let cache = BuildCacheState {
            has_cache: true,
            last_built_revision: None,
            is_full_build: false,
        };
        let mode = decide(&BuildOptions::empty(), &cache, &BTreeSet::new());
        assert_eq!(mode, BuildMode::Full(FullBuildReason::LastRevisionUnknown));
    }

    #[test]
    fn test_build_script_change_forces_full() {
        let changed = paths(&["cmake/platform.cmake", "src/main.c"]);
        let mode = decide(&BuildOptions::empty(), &cached_state(), &changed);
        assert_eq!(mode, BuildMode::Full(FullBuildReason::BuildScriptChanged));
    }

    #[test]
    fn test_source_only_changes_are_incremental() {
        let changed = paths(&["src/main.c", "src/render/shade.c", "docs/notes.md"]);
        let mode = decide(&BuildOptions::empty(), &cached_state(), &changed);
        assert_eq!(mode, BuildMode::Incremental);
    }

    #[test]
    fn test_empty_changes_are_incremental() {
        let mode = decide(&BuildOptions::empty(), &cached_state(), &BTreeSet::new());
        assert_eq!(mode, BuildMode::Incremental);
    }

    #[test]
    fn test_is_build_script_requires_both_conditions() {
        assert!(is_build_script(Path::new("cmake/macros.cmake")));
        assert!(is_build_script(Path::new("build_files/cmake/platform.cmake")));
        // .cmake suffix outside a cmake/ directory does not match.
        assert!(!is_build_script(Path::new("scripts/helper.cmake")));
        // A cmake/ directory with a different suffix does not match.
        assert!(!is_build_script(Path::new("cmake/readme.txt")));
        // Case-sensitive on the directory segment.
        assert!(!is_build_script(Path::new("CMake/macros.cmake")));
    }

    #[test]
    fn test_reason_messages() {
        assert_eq!(FullBuildReason::Forced.to_string(), "forced");
        assert_eq!(
            FullBuildReason::NoPreviousBuild.to_string(),
            "no previous build detected"
        );
        assert_eq!(
            FullBuildReason::LastRevisionUnknown.to_string(),
            "last build's commit not found"
        );
        assert_eq!(
            FullBuildReason::BuildScriptChanged.to_string(),
            "build script changed"
        );
    }

    #[test]
    fn test_apply_full_wipes_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stale.o"), "x").unwrap();
        fs::create_dir(dir.path().join("objects")).unwrap();
        fs::write(dir.path().join("objects/a.o"), "x").unwrap();

        let rev = RevisionId::new("abc123");
        let state = BuildModeDecider::apply(
            &BuildMode::Full(FullBuildReason::Forced),
            dir.path(),
            &rev,
        );

        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
        assert!(state.is_full_build);
        assert_eq!(state.last_built_revision, Some(rev));
        assert!(!state.has_cache);
    }

    #[test]
    fn test_apply_full_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let build_dir = dir.path().join("fresh");
        let state = BuildModeDecider::apply(
            &BuildMode::Full(FullBuildReason::NoPreviousBuild),
            &build_dir,
            &RevisionId::new("abc"),
        );
        assert!(build_dir.exists());
        assert!(state.is_full_build);
    }

    #[test]
    fn test_apply_incremental_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(gantry_domain::cache::CONFIGURE_CACHE_FILE),
            "# cache",
        )
        .unwrap();
        fs::write(dir.path().join("keep.o"), "x").unwrap();

        let rev = RevisionId::new("def456");
        let state = BuildModeDecider::apply(&BuildMode::Incremental, dir.path(), &rev);

        assert!(dir.path().join("keep.o").exists());
        assert!(!state.is_full_build);
        assert!(state.has_cache);
        assert_eq!(state.last_built_revision, Some(rev));
    }
}
