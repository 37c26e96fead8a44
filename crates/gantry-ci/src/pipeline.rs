//! Pipeline orchestration.
//!
//! One [`PipelineController`] drives one run through a strictly linear
//! state machine: Init -> Configuring -> Compiling -> Testing ->
//! ScenesTesting -> Reporting -> Done, with two early-exit edges: the
//! ignore marker (Init -> Done) and any state -> Reporting on an
//! unrecoverable collaborator error.
//!
//! Exactly one terminal [`BuildStatus`] is reached per run and reported
//! to both sinks before the run ends; ignored runs log only.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use gantry_domain::{
    Aggregated, BuildCacheState, BuildOption, BuildOptions, BuildStatus, PipelineError, Result,
    RevisionId, SceneCounts, StatusTracker, TestCounts,
};

use crate::aggregate::{aggregate_scenes, aggregate_tests, aggregate_warnings, WarningStyle};
use crate::build::{Builder, TestHarness};
use crate::decider::{decide, BuildMode, BuildModeDecider, FullBuildReason};
use crate::notify::{
    compose_final_message, NotificationDispatcher, NotificationSink, NotifyEvent,
};
use crate::vcs::{RevisionTracker, Vcs};

/// Commit-message marker that skips the run entirely.
pub const IGNORE_MARKER: &str = "[skip ci]";

/// Marker file persisted by the external scheduler when it aborts a run.
pub const ABORTED_MARKER: &str = "aborted";

/// States of the pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Init,
    Configuring,
    Compiling,
    Testing,
    ScenesTesting,
    Reporting,
    Done,
}

/// Immutable configuration for one pipeline run.
///
/// Replaces the environment-variable soup of ad-hoc CI scripts with one
/// explicit value constructed up front.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Source checkout directory.
    pub source_dir: PathBuf,

    /// Build directory owned exclusively by this
    /// (platform, compiler, architecture, build-type) combination.
    pub build_dir: PathBuf,

    /// Compiler identifier (e.g. "gcc-13", "msvc-2022").
    pub compiler: String,

    /// Target architecture (e.g. "x86_64", "arm64").
    pub architecture: String,

    /// Build type (e.g. "Release", "Debug").
    pub build_type: String,

    /// Warning format of the platform's compiler.
    pub warning_style: WarningStyle,

    /// Option flags for this run.
    pub options: BuildOptions,

    /// Message of the triggering commit, checked for the ignore marker.
    pub commit_message: String,
}

/// Final report of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Run ID.
    pub run_id: String,

    /// Terminal status.
    pub status: BuildStatus,

    /// The build-mode decision, absent when the run never got that far.
    pub mode: Option<BuildMode>,

    /// Revision that was built, absent for ignored runs.
    pub revision: Option<RevisionId>,

    /// Unit-test counts.
    pub tests: Aggregated<TestCounts>,

    /// Scene-test counts.
    pub scenes: Aggregated<SceneCounts>,

    /// Deduplicated compiler warning count.
    pub warnings: Aggregated<u64>,

    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl PipelineReport {
    /// Process exit code for the orchestration boundary.
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// Top-level orchestration of one CI run.
pub struct PipelineController {
    config: PipelineConfig,
    tracker: RevisionTracker,
    builder: Arc<dyn Builder>,
    harness: Arc<dyn TestHarness>,
    dispatcher: NotificationDispatcher,

    run_id: String,
    state: PipelineState,
    status: StatusTracker,
    mode: Option<BuildMode>,
    revision: Option<RevisionId>,
    tests: Aggregated<TestCounts>,
    scenes: Aggregated<SceneCounts>,
    warnings: Aggregated<u64>,
}

impl PipelineController {
    pub fn new(
        config: PipelineConfig,
        vcs: Arc<dyn Vcs>,
        builder: Arc<dyn Builder>,
        harness: Arc<dyn TestHarness>,
        sinks: Vec<Arc<dyn NotificationSink>>,
    ) -> Self {
        PipelineController {
            config,
            tracker: RevisionTracker::new(vcs),
            builder,
            harness,
            dispatcher: NotificationDispatcher::new(sinks),
            run_id: Uuid::new_v4().to_string(),
            state: PipelineState::Init,
            status: StatusTracker::new(),
            mode: None,
            revision: None,
            tests: Aggregated::Missing,
            scenes: Aggregated::Missing,
            warnings: Aggregated::Missing,
        }
    }

    /// The run's identifier.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Current state machine position.
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Execute the pipeline to completion and return the final report.
    ///
    /// Collaborator errors are classified, reported to both sinks, and
    /// folded into the report; this method itself does not fail.
    pub async fn run(mut self) -> PipelineReport {
        let start = Instant::now();
        info!(run_id = %self.run_id, "starting pipeline");

        if self.config.commit_message.contains(IGNORE_MARKER) {
            // Informational log only; no sink sees ignored runs.
            info!(run_id = %self.run_id, "commit message contains ignore marker, skipping run");
            self.finalize(BuildStatus::Ignored);
            self.state = PipelineState::Done;
            return self.into_report(start.elapsed().as_millis() as u64);
        }

        match self.execute().await {
            Ok(()) => {}
            Err(e) => {
                error!(run_id = %self.run_id, error = %e, "pipeline error");
                self.finalize(BuildStatus::Error);
            }
        }

        self.report_final().await;
        self.state = PipelineState::Done;
        info!(run_id = %self.run_id, status = %self.status.current(), "pipeline finished");
        self.into_report(start.elapsed().as_millis() as u64)
    }

    async fn execute(&mut self) -> Result<()> {
        // An abort marker can only refer to the run it was written
        // during; one still present now is left over from an earlier
        // aborted run and must not poison this one.
        if self.take_abort_marker() {
            info!(run_id = %self.run_id, "discarded stale abort marker from an earlier run");
        }

        self.advance_status(BuildStatus::Building);
        let revision = self.tracker.current_revision().await?;
        self.revision = Some(revision.clone());

        self.dispatcher
            .notify(
                NotifyEvent::PipelineStart,
                BuildStatus::Building,
                format!("building {}", revision.short()),
                BTreeMap::from([("revision".to_string(), revision.to_string())]),
            )
            .await;

        // Decide full vs. incremental, then apply and persist the decision.
        let cache = BuildCacheState::load(&self.config.build_dir);
        let mode = self.decide_mode(&cache, &revision).await;
        info!(run_id = %self.run_id, mode = %mode, "build mode decided");
        self.mode = Some(mode);

        let new_cache = BuildModeDecider::apply(&mode, &self.config.build_dir, &revision);
        new_cache.store(&self.config.build_dir)?;

        // Configure.
        self.state = PipelineState::Configuring;
        let configure = self.builder.configure(&self.config, &mode).await?;
        if !configure.succeeded() {
            return Err(PipelineError::collaborator(
                "configure",
                format!("exit code {}", configure.exit_code),
            ));
        }

        // Compile.
        self.state = PipelineState::Compiling;
        let compile = self.builder.compile(&self.config).await?;
        if let Some(log) = &compile.log {
            self.warnings = aggregate_warnings(log, self.config.warning_style);
        }

        if !compile.succeeded() {
            self.finalize(BuildStatus::Failure);
            self.dispatcher
                .notify(
                    NotifyEvent::CompileResult,
                    BuildStatus::Failure,
                    format!("compile failed (exit code {})", compile.exit_code),
                    BTreeMap::new(),
                )
                .await;
            return Ok(());
        }

        self.dispatcher
            .notify(
                NotifyEvent::CompileResult,
                BuildStatus::Building,
                "compile succeeded",
                self.warning_fields(),
            )
            .await;

        if self.take_abort_marker() {
            self.finalize(BuildStatus::Aborted);
            return Ok(());
        }

        // Tests and scenes are optional and never fail the run; a runner
        // error degrades the corresponding counts to Missing.
        if self.config.options.contains(BuildOption::RunUnitTests) {
            self.state = PipelineState::Testing;
            self.run_unit_tests().await;
        }
        if self.config.options.contains(BuildOption::RunSceneTests) {
            self.state = PipelineState::ScenesTesting;
            self.run_scene_tests().await;
        }

        if self.take_abort_marker() {
            self.finalize(BuildStatus::Aborted);
            return Ok(());
        }

        self.finalize(BuildStatus::Success);
        Ok(())
    }

    async fn decide_mode(&self, cache: &BuildCacheState, current: &RevisionId) -> BuildMode {
        // Only query the VCS when the decision actually depends on it.
        let needs_diff = cache.has_cache
            && cache.last_built_revision.is_some()
            && !self.config.options.contains(BuildOption::ForceFullBuild);

        let changed_paths = if needs_diff {
            let last = cache
                .last_built_revision
                .as_ref()
                .cloned()
                .unwrap_or_else(|| current.clone());
            match self.tracker.changed_paths_between(&last, current).await {
                Ok(paths) => paths,
                Err(e) => {
                    warn!(error = %e, "changed-paths query failed, assuming changed");
                    return BuildMode::Full(FullBuildReason::ChangesUnknown);
                }
            }
        } else {
            BTreeSet::new()
        };

        decide(&self.config.options, cache, &changed_paths)
    }

    async fn run_unit_tests(&mut self) {
        match self.harness.run_unit_tests(&self.config).await {
            Ok(report) => self.tests = aggregate_tests(&report),
            Err(e) => {
                warn!(error = %e, "unit-test runner failed");
                self.tests = Aggregated::Missing;
            }
        }

        let (message, fields) = match self.tests.counted() {
            Some(counts) => (
                format!(
                    "unit tests: {} run, {} problems",
                    counts.total,
                    counts.problems()
                ),
                BTreeMap::from([
                    ("tests_total".to_string(), counts.total.to_string()),
                    ("tests_failures".to_string(), counts.failures.to_string()),
                    ("tests_errors".to_string(), counts.errors.to_string()),
                    ("tests_disabled".to_string(), counts.disabled.to_string()),
                ]),
            ),
            None => ("unit tests: no report".to_string(), BTreeMap::new()),
        };
        self.dispatcher
            .notify(
                NotifyEvent::TestResult,
                BuildStatus::Building,
                message,
                fields,
            )
            .await;
    }

    async fn run_scene_tests(&mut self) {
        match self.harness.run_scene_tests(&self.config).await {
            Ok(report) => self.scenes = aggregate_scenes(&report),
            Err(e) => {
                warn!(error = %e, "scene-test runner failed");
                self.scenes = Aggregated::Missing;
            }
        }

        let (message, fields) = match self.scenes.counted() {
            Some(counts) => (
                format!(
                    "scene tests: {} run, {} problems",
                    counts.total,
                    counts.problems()
                ),
                BTreeMap::from([
                    ("scenes_total".to_string(), counts.total.to_string()),
                    ("scenes_errors".to_string(), counts.errors.to_string()),
                    ("scenes_crashes".to_string(), counts.crashes.to_string()),
                ]),
            ),
            None => ("scene tests: no report".to_string(), BTreeMap::new()),
        };
        self.dispatcher
            .notify(
                NotifyEvent::SceneResult,
                BuildStatus::Building,
                message,
                fields,
            )
            .await;
    }

    async fn report_final(&mut self) {
        self.state = PipelineState::Reporting;
        let status = self.status.current();
        let base = match status {
            BuildStatus::Success => "build successful",
            BuildStatus::Failure => "build failed",
            BuildStatus::Error => "build error",
            BuildStatus::Aborted => "build aborted",
            // Ignored runs return before reaching here; Pending/Building
            // cannot be terminal.
            _ => "build finished",
        };
        let message = compose_final_message(base, &self.tests, &self.scenes);

        let mut fields = self.warning_fields();
        if let Some(mode) = &self.mode {
            fields.insert("build_mode".to_string(), mode.to_string());
        }

        self.dispatcher
            .notify(NotifyEvent::FinalStatus, status, message, fields)
            .await;
    }

    fn warning_fields(&self) -> BTreeMap<String, String> {
        match self.warnings.counted() {
            Some(count) => BTreeMap::from([("warnings".to_string(), count.to_string())]),
            None => BTreeMap::new(),
        }
    }

    /// Consume the scheduler's abort marker if one is present.
    ///
    /// Removing the file is part of the check: a marker only ever counts
    /// once, so a later run over the same build directory starts clean.
    fn take_abort_marker(&self) -> bool {
        let marker = self.config.build_dir.join(ABORTED_MARKER);
        match std::fs::remove_file(&marker) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => {
                // Treat an unremovable marker as set for this run; the
                // next run will retry the removal.
                warn!(error = %e, marker = %marker.display(), "could not remove abort marker");
                true
            }
        }
    }

    fn advance_status(&mut self, next: BuildStatus) {
        // Transitions are driven by the linear control flow above, so a
        // rejected transition is a controller bug; log it rather than
        // unwind mid-report.
        if let Err(e) = self.status.advance(next) {
            error!(error = %e, "rejected status transition");
        }
    }

    fn finalize(&mut self, status: BuildStatus) {
        if !self.status.current().is_terminal() {
            self.advance_status(status);
        }
    }

    fn into_report(self, duration_ms: u64) -> PipelineReport {
        PipelineReport {
            run_id: self.run_id,
            status: self.status.current(),
            mode: self.mode,
            revision: self.revision,
            tests: self.tests,
            scenes: self.scenes,
            warnings: self.warnings,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_exit_codes() {
        let report = PipelineReport {
            run_id: "r".to_string(),
            status: BuildStatus::Success,
            mode: Some(BuildMode::Incremental),
            revision: Some(RevisionId::new("abc")),
            tests: Aggregated::Missing,
            scenes: Aggregated::Missing,
            warnings: Aggregated::Missing,
            duration_ms: 5,
        };
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_ignore_marker_constant() {
        assert!("chore: bump version [skip ci]".contains(IGNORE_MARKER));
        assert!(!"fix: render crash".contains(IGNORE_MARKER));
    }
}
