//! Build status lifecycle.
//!
//! One [`BuildStatus`] value exists per pipeline run. Transitions are
//! monotonic toward a terminal state; once terminal, the status never
//! changes again. [`StatusTracker`] enforces both rules.

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Lifecycle status of a pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    /// Run created, nothing started yet.
    Pending,

    /// Configure/compile in progress.
    Building,

    /// Compile succeeded. Test or scene problems do not demote this.
    Success,

    /// Compile failed in an expected way (non-zero exit).
    Failure,

    /// An external collaborator failed unexpectedly.
    Error,

    /// The enclosing scheduler aborted the run.
    Aborted,

    /// The triggering commit asked to be ignored.
    Ignored,
}

impl BuildStatus {
    /// Whether this status ends the run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Pending | BuildStatus::Building)
    }

    /// Process exit code for the orchestration boundary.
    ///
    /// 0 on Success/Ignored; distinct non-zero codes otherwise. Pending
    /// and Building never reach the exit path but map to the error code.
    pub fn exit_code(&self) -> i32 {
        match self {
            BuildStatus::Success | BuildStatus::Ignored => 0,
            BuildStatus::Failure => 1,
            BuildStatus::Error | BuildStatus::Pending | BuildStatus::Building => 2,
            BuildStatus::Aborted => 3,
        }
    }

    /// The status-API vocabulary: `pending`, `success`, `failure`, `error`.
    pub fn api_state(&self) -> &'static str {
        match self {
            BuildStatus::Pending | BuildStatus::Building => "pending",
            BuildStatus::Success | BuildStatus::Ignored => "success",
            BuildStatus::Failure => "failure",
            BuildStatus::Error | BuildStatus::Aborted => "error",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            BuildStatus::Pending => 0,
            BuildStatus::Building => 1,
            _ => 2,
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BuildStatus::Pending => "pending",
            BuildStatus::Building => "building",
            BuildStatus::Success => "success",
            BuildStatus::Failure => "failure",
            BuildStatus::Error => "error",
            BuildStatus::Aborted => "aborted",
            BuildStatus::Ignored => "ignored",
        };
        write!(f, "{name}")
    }
}

/// Records the status of one run and rejects invalid transitions.
#[derive(Debug, Clone)]
pub struct StatusTracker {
    current: BuildStatus,
    history: Vec<BuildStatus>,
}

impl StatusTracker {
    /// Start a new run at `Pending`.
    pub fn new() -> Self {
        StatusTracker {
            current: BuildStatus::Pending,
            history: vec![BuildStatus::Pending],
        }
    }

    /// The current status.
    pub fn current(&self) -> BuildStatus {
        self.current
    }

    /// Every status the run has held, in order.
    pub fn history(&self) -> &[BuildStatus] {
        &self.history
    }

    /// Move to `next`.
    ///
    /// Rejected when the current status is already terminal, or when the
    /// move would go backwards (e.g. `Building -> Pending`).
    pub fn advance(&mut self, next: BuildStatus) -> crate::Result<()> {
        if self.current == next {
            return Ok(());
        }
        if self.current.is_terminal() || next.rank() < self.current.rank() {
            return Err(PipelineError::InvalidStatusTransition {
                current: self.current.to_string(),
                requested: next.to_string(),
            });
        }
        self.current = next;
        self.history.push(next);
        Ok(())
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new()
    }
}
