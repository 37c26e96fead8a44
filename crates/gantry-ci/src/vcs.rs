//! Version-control collaborator and revision tracking.
//!
//! The pipeline never parses repository internals itself: it asks a
//! [`Vcs`] implementation for the current revision and for the paths
//! changed between two revisions. Any failure to query the collaborator
//! surfaces as `VcsUnavailable` and callers degrade to a conservative
//! full build.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use gantry_domain::{PipelineError, Result, RevisionId};

/// Read-only view of the version-control system.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// The revision currently checked out in the source directory.
    async fn current_revision(&self) -> Result<RevisionId>;

    /// Paths changed between two revisions.
    async fn changed_paths_between(
        &self,
        from: &RevisionId,
        to: &RevisionId,
    ) -> Result<BTreeSet<PathBuf>>;
}

/// Git-backed [`Vcs`] shelling out to the `git` binary.
pub struct GitVcs {
    repo_dir: PathBuf,
}

impl GitVcs {
    /// Create a client for the repository at `repo_dir`.
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        GitVcs {
            repo_dir: repo_dir.into(),
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PipelineError::VcsUnavailable(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::VcsUnavailable(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl Vcs for GitVcs {
    async fn current_revision(&self) -> Result<RevisionId> {
        let stdout = self.run_git(&["rev-parse", "HEAD"]).await?;
        let sha = stdout.trim();
        if sha.is_empty() {
            return Err(PipelineError::VcsUnavailable(
                "git rev-parse HEAD returned empty output".to_string(),
            ));
        }
        Ok(RevisionId::new(sha))
    }

    async fn changed_paths_between(
        &self,
        from: &RevisionId,
        to: &RevisionId,
    ) -> Result<BTreeSet<PathBuf>> {
        let range = format!("{}..{}", from.as_str(), to.as_str());
        let stdout = self.run_git(&["diff", "--name-only", &range]).await?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(PathBuf::from)
            .collect())
    }
}

/// Records which revision was last fully built and answers change queries.
///
/// Read-only: the cache state itself is mutated by the decider, not here.
pub struct RevisionTracker {
    vcs: Arc<dyn Vcs>,
}

impl RevisionTracker {
    pub fn new(vcs: Arc<dyn Vcs>) -> Self {
        RevisionTracker { vcs }
    }

    /// The revision currently checked out.
    pub async fn current_revision(&self) -> Result<RevisionId> {
        self.vcs.current_revision().await
    }

    /// Paths changed between two revisions.
    ///
    /// A `VcsUnavailable` result must be treated by the caller as
    /// "assume changed".
    pub async fn changed_paths_between(
        &self,
        from: &RevisionId,
        to: &RevisionId,
    ) -> Result<BTreeSet<PathBuf>> {
        if from == to {
            debug!(revision = %from.short(), "revisions identical, no changed paths");
            return Ok(BTreeSet::new());
        }
        self.vcs.changed_paths_between(from, to).await
    }
}

/// Check whether a directory is inside a git work tree.
pub fn is_git_repo(dir: &Path) -> bool {
    std::process::Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[tokio::test]
    async fn current_revision_returns_40_hex_chars() {
        let repo = make_git_repo();
        let vcs = GitVcs::new(repo.path());
        let rev = vcs.current_revision().await.unwrap();
        assert_eq!(rev.as_str().len(), 40);
        assert!(rev.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn current_revision_fails_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let vcs = GitVcs::new(dir.path());
        let err = vcs.current_revision().await.unwrap_err();
        assert!(matches!(err, PipelineError::VcsUnavailable(_)));
    }

    #[tokio::test]
    async fn changed_paths_between_commits() {
        let repo = make_git_repo();
        let vcs = GitVcs::new(repo.path());
        let first = vcs.current_revision().await.unwrap();

        std::fs::write(repo.path().join("cmake_file.txt"), "x").unwrap();
        run_git(repo.path(), &["add", "."]);
        run_git(repo.path(), &["commit", "-m", "add file"]);
        let second = vcs.current_revision().await.unwrap();

        let changed = vcs.changed_paths_between(&first, &second).await.unwrap();
        assert!(changed.contains(&PathBuf::from("cmake_file.txt")));
    }

    #[tokio::test]
    async fn tracker_shortcuts_identical_revisions() {
        let dir = tempfile::tempdir().unwrap();
        // Not a repo, but the shortcut avoids querying at all.
        let tracker = RevisionTracker::new(Arc::new(GitVcs::new(dir.path())));
        let rev = RevisionId::new("same");
        let changed = tracker.changed_paths_between(&rev, &rev).await.unwrap();
        assert!(changed.is_empty());
    }

    #[test]
    fn is_git_repo_false_for_plain_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!is_git_repo(dir.path()));
    }
}
