//! Configure/compile/test collaborators.
//!
//! The pipeline treats each external tool invocation as a single
//! blocking call with a success/failure/error outcome. No timeout is
//! imposed here; timeouts belong to the enclosing CI scheduler.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::info;

use gantry_domain::{PipelineError, Result};

use crate::decider::BuildMode;
use crate::pipeline::PipelineConfig;

/// Outcome of one external tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    /// Exit code (0 = success).
    pub exit_code: i32,

    /// Path to the captured log, if one was produced.
    pub log: Option<PathBuf>,

    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl StepOutcome {
    /// Whether the step exited cleanly.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// The build-configuration/compile collaborator.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Configure the build directory for the given mode.
    async fn configure(&self, config: &PipelineConfig, mode: &BuildMode) -> Result<StepOutcome>;

    /// Compile the configured build.
    async fn compile(&self, config: &PipelineConfig) -> Result<StepOutcome>;
}

/// The test/scene runner collaborator. Each run produces a report handle
/// consumable by the aggregator.
#[async_trait]
pub trait TestHarness: Send + Sync {
    /// Run the unit-test suite and return the report path.
    async fn run_unit_tests(&self, config: &PipelineConfig) -> Result<PathBuf>;

    /// Run the scene-test suite and return the report path.
    async fn run_scene_tests(&self, config: &PipelineConfig) -> Result<PathBuf>;
}

/// CMake-backed [`Builder`] shelling out to the configure tool.
pub struct CmakeBuilder;

impl CmakeBuilder {
    async fn run_logged(
        step: &str,
        mut command: Command,
        log_path: PathBuf,
    ) -> Result<StepOutcome> {
        let start = Instant::now();
        let output = command
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PipelineError::collaborator(step, e.to_string()))?;

        let mut log = output.stdout;
        log.extend_from_slice(&output.stderr);
        tokio::fs::write(&log_path, &log)
            .await
            .map_err(|e| PipelineError::collaborator(step, format!("writing log: {e}")))?;

        let outcome = StepOutcome {
            exit_code: output.status.code().unwrap_or(-1),
            log: Some(log_path),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            step,
            exit_code = outcome.exit_code,
            duration_ms = outcome.duration_ms,
            "step finished"
        );
        Ok(outcome)
    }
}

#[async_trait]
impl Builder for CmakeBuilder {
    async fn configure(&self, config: &PipelineConfig, mode: &BuildMode) -> Result<StepOutcome> {
        let mut command = Command::new("cmake");
        command
            .arg("-S")
            .arg(&config.source_dir)
            .arg("-B")
            .arg(&config.build_dir)
            .arg(format!("-DCMAKE_BUILD_TYPE={}", config.build_type));
        if mode.is_full() {
            command.arg("--fresh");
        }
        for option in config.options.iter() {
            command.arg(format!("-DGANTRY_OPT_{}=ON", option.as_str().replace('-', "_")));
        }
        Self::run_logged(
            "configure",
            command,
            config.build_dir.join("configure.log"),
        )
        .await
    }

    async fn compile(&self, config: &PipelineConfig) -> Result<StepOutcome> {
        let mut command = Command::new("cmake");
        command.arg("--build").arg(&config.build_dir);
        Self::run_logged("compile", command, config.build_dir.join("compile.log")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_outcome_succeeded() {
        let outcome = StepOutcome {
            exit_code: 0,
            log: None,
            duration_ms: 10,
        };
        assert!(outcome.succeeded());
    }

    #[test]
    fn test_step_outcome_failed() {
        let outcome = StepOutcome {
            exit_code: 2,
            log: None,
            duration_ms: 10,
        };
        assert!(!outcome.succeeded());
    }
}
