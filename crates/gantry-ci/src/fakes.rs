//! In-memory fakes for the collaborator traits (testing only).
//!
//! Provides `MemoryVcs`, `RecordingSink`, `ScriptedBuilder`, and
//! `ScriptedHarness` that satisfy the trait contracts without any
//! external tools or network.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use gantry_domain::{PipelineError, Result, RevisionId};

use crate::build::{Builder, StepOutcome, TestHarness};
use crate::decider::BuildMode;
use crate::notify::{Notification, NotificationSink, NotifyEvent, SinkKind};
use crate::pipeline::PipelineConfig;
use crate::vcs::Vcs;

// ---------------------------------------------------------------------------
// MemoryVcs
// ---------------------------------------------------------------------------

/// Scripted version-control collaborator.
pub struct MemoryVcs {
    current: RevisionId,
    changed: BTreeSet<PathBuf>,
    unavailable: bool,
}

impl MemoryVcs {
    pub fn new(current: impl Into<String>) -> Self {
        MemoryVcs {
            current: RevisionId::new(current),
            changed: BTreeSet::new(),
            unavailable: false,
        }
    }

    /// Script the changed-paths answer.
    pub fn with_changed_paths(mut self, paths: &[&str]) -> Self {
        self.changed = paths.iter().map(PathBuf::from).collect();
        self
    }

    /// Make every query fail with `VcsUnavailable`.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }
}

#[async_trait]
impl Vcs for MemoryVcs {
    async fn current_revision(&self) -> Result<RevisionId> {
        if self.unavailable {
            return Err(PipelineError::VcsUnavailable("scripted outage".to_string()));
        }
        Ok(self.current.clone())
    }

    async fn changed_paths_between(
        &self,
        _from: &RevisionId,
        _to: &RevisionId,
    ) -> Result<BTreeSet<PathBuf>> {
        if self.unavailable {
            return Err(PipelineError::VcsUnavailable("scripted outage".to_string()));
        }
        Ok(self.changed.clone())
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// Sink that records every delivered notification in order.
pub struct RecordingSink {
    kind: SinkKind,
    sent: Mutex<Vec<(NotifyEvent, Notification)>>,
    unreachable: bool,
}

impl RecordingSink {
    pub fn new(kind: SinkKind) -> Self {
        RecordingSink {
            kind,
            sent: Mutex::new(Vec::new()),
            unreachable: false,
        }
    }

    /// Make every delivery fail with `SinkUnreachable`.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Everything delivered so far, in delivery order.
    pub fn sent(&self) -> Vec<(NotifyEvent, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    /// Notifications delivered for one event.
    pub fn sent_for(&self, event: NotifyEvent) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, n)| n.clone())
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    fn kind(&self) -> SinkKind {
        self.kind
    }

    async fn send(&self, event: NotifyEvent, notification: &Notification) -> Result<()> {
        if self.unreachable {
            return Err(PipelineError::SinkUnreachable {
                sink: self.kind.to_string(),
                message: "scripted outage".to_string(),
            });
        }
        self.sent
            .lock()
            .unwrap()
            .push((event, notification.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedBuilder
// ---------------------------------------------------------------------------

/// Builder whose configure/compile outcomes are scripted.
pub struct ScriptedBuilder {
    configure_exit: i32,
    compile_exit: i32,
    compile_log: Option<String>,
    marker_during_compile: Option<String>,
    configure_calls: AtomicUsize,
    compile_calls: AtomicUsize,
}

impl ScriptedBuilder {
    /// A builder where both steps succeed and produce no log.
    pub fn succeeding() -> Self {
        ScriptedBuilder {
            configure_exit: 0,
            compile_exit: 0,
            compile_log: None,
            marker_during_compile: None,
            configure_calls: AtomicUsize::new(0),
            compile_calls: AtomicUsize::new(0),
        }
    }

    /// Script the compile exit code.
    pub fn with_compile_exit(mut self, exit_code: i32) -> Self {
        self.compile_exit = exit_code;
        self
    }

    /// Script the configure exit code.
    pub fn with_configure_exit(mut self, exit_code: i32) -> Self {
        self.configure_exit = exit_code;
        self
    }

    /// Script the compile log content, written into the build directory.
    pub fn with_compile_log(mut self, content: impl Into<String>) -> Self {
        self.compile_log = Some(content.into());
        self
    }

    /// Drop an empty marker file into the build directory while the
    /// compile step runs, as an external scheduler would.
    pub fn with_marker_during_compile(mut self, name: impl Into<String>) -> Self {
        self.marker_during_compile = Some(name.into());
        self
    }

    /// How many times configure was invoked.
    pub fn configure_calls(&self) -> usize {
        self.configure_calls.load(Ordering::SeqCst)
    }

    /// How many times compile was invoked.
    pub fn compile_calls(&self) -> usize {
        self.compile_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Builder for ScriptedBuilder {
    async fn configure(&self, _config: &PipelineConfig, _mode: &BuildMode) -> Result<StepOutcome> {
        self.configure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(StepOutcome {
            exit_code: self.configure_exit,
            log: None,
            duration_ms: 1,
        })
    }

    async fn compile(&self, config: &PipelineConfig) -> Result<StepOutcome> {
        self.compile_calls.fetch_add(1, Ordering::SeqCst);
        let log = match &self.compile_log {
            Some(content) => {
                std::fs::create_dir_all(&config.build_dir)?;
                let path = config.build_dir.join("compile.log");
                std::fs::write(&path, content)?;
                Some(path)
            }
            None => None,
        };
        if let Some(name) = &self.marker_during_compile {
            std::fs::create_dir_all(&config.build_dir)?;
            std::fs::write(config.build_dir.join(name), "")?;
        }
        Ok(StepOutcome {
            exit_code: self.compile_exit,
            log,
            duration_ms: 1,
        })
    }
}

// ---------------------------------------------------------------------------
// ScriptedHarness
// ---------------------------------------------------------------------------

/// Test harness that writes scripted JSON reports into the build directory.
pub struct ScriptedHarness {
    test_report: Option<serde_json::Value>,
    scene_report: Option<serde_json::Value>,
    test_calls: AtomicUsize,
    scene_calls: AtomicUsize,
}

impl ScriptedHarness {
    /// A harness that fails every run (no reports scripted).
    pub fn empty() -> Self {
        ScriptedHarness {
            test_report: None,
            scene_report: None,
            test_calls: AtomicUsize::new(0),
            scene_calls: AtomicUsize::new(0),
        }
    }

    /// Script the unit-test report.
    pub fn with_test_report(mut self, report: serde_json::Value) -> Self {
        self.test_report = Some(report);
        self
    }

    /// Script the scene-test report.
    pub fn with_scene_report(mut self, report: serde_json::Value) -> Self {
        self.scene_report = Some(report);
        self
    }

    pub fn test_calls(&self) -> usize {
        self.test_calls.load(Ordering::SeqCst)
    }

    pub fn scene_calls(&self) -> usize {
        self.scene_calls.load(Ordering::SeqCst)
    }

    fn write_report(
        config: &PipelineConfig,
        name: &str,
        report: &Option<serde_json::Value>,
    ) -> Result<PathBuf> {
        let report = report
            .as_ref()
            .ok_or_else(|| PipelineError::collaborator(name, "scripted to fail"))?;
        std::fs::create_dir_all(&config.build_dir)?;
        let path = config.build_dir.join(format!("{name}.json"));
        std::fs::write(&path, report.to_string())?;
        Ok(path)
    }
}

#[async_trait]
impl TestHarness for ScriptedHarness {
    async fn run_unit_tests(&self, config: &PipelineConfig) -> Result<PathBuf> {
        self.test_calls.fetch_add(1, Ordering::SeqCst);
        Self::write_report(config, "unit-tests", &self.test_report)
    }

    async fn run_scene_tests(&self, config: &PipelineConfig) -> Result<PathBuf> {
        self.scene_calls.fetch_add(1, Ordering::SeqCst);
        Self::write_report(config, "scene-tests", &self.scene_report)
    }
}
