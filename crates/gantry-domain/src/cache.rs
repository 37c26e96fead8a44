//! Persisted build-cache state.
//!
//! Each build directory owns exactly one cache state, laid out as:
//! - `last-commit-built` — the revision id of the last completed build
//! - `full-build` — marker file, present when the current run is a full build
//! - the configure tool's own cache file, whose presence means a prior
//!   build exists at all
//!
//! The state is read once at pipeline start and written back once after
//! the full/incremental decision. No locking: the enclosing scheduler
//! guarantees one run per build directory at a time.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::revision::RevisionId;

/// File recording the revision of the last completed build.
pub const LAST_COMMIT_BUILT_FILE: &str = "last-commit-built";

/// Marker file present while a full build is in progress.
pub const FULL_BUILD_MARKER: &str = "full-build";

/// The configure tool's cache file; its presence means a prior build exists.
pub const CONFIGURE_CACHE_FILE: &str = "CMakeCache.txt";

/// Facts about a build directory relevant to the full/incremental decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildCacheState {
    /// Whether a prior configured build exists in the directory.
    pub has_cache: bool,

    /// Revision of the last completed build, if recorded.
    pub last_built_revision: Option<RevisionId>,

    /// Whether the current run is a full build.
    pub is_full_build: bool,
}

impl BuildCacheState {
    /// Fresh state for an empty build directory.
    pub fn fresh() -> Self {
        Self::default()
    }

    /// Read the cache state from a build directory.
    ///
    /// Absent files simply mean "no cache" / "no recorded revision";
    /// this never fails on a missing or empty directory.
    pub fn load(build_dir: &Path) -> Self {
        let has_cache = build_dir.join(CONFIGURE_CACHE_FILE).exists();
        let last_built_revision = fs::read_to_string(build_dir.join(LAST_COMMIT_BUILT_FILE))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(RevisionId::new);
        let is_full_build = build_dir.join(FULL_BUILD_MARKER).exists();

        debug!(
            has_cache,
            is_full_build,
            last_built = last_built_revision.as_ref().map(|r| r.short().to_string()),
            "loaded build cache state"
        );

        BuildCacheState {
            has_cache,
            last_built_revision,
            is_full_build,
        }
    }

    /// Write the revision record and full-build marker back to the
    /// build directory, creating it if needed.
    pub fn store(&self, build_dir: &Path) -> std::io::Result<()> {
        fs::create_dir_all(build_dir)?;

        match &self.last_built_revision {
            Some(revision) => {
                fs::write(build_dir.join(LAST_COMMIT_BUILT_FILE), revision.as_str())?
            }
            None => {
                let record = build_dir.join(LAST_COMMIT_BUILT_FILE);
                if record.exists() {
                    fs::remove_file(record)?;
                }
            }
        }

        let marker = build_dir.join(FULL_BUILD_MARKER);
        if self.is_full_build {
            fs::write(marker, "")?;
        } else if marker.exists() {
            fs::remove_file(marker)?;
        }

        Ok(())
    }
}
