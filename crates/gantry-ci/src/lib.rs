//! Gantry CI - pipeline core
//!
//! Provides the decision and state-tracking heart of the CI pipeline:
//! - Decides full vs. incremental builds from revision and cache state
//! - Aggregates test/scene/warning counts from collaborator reports
//! - Dispatches status notifications to the status API and the dashboard
//! - Orchestrates configure -> compile -> test -> report as a state machine

pub mod aggregate;
pub mod build;
pub mod decider;
pub mod fakes;
pub mod notify;
pub mod pipeline;
pub mod sinks;
pub mod telemetry;
pub mod vcs;

// Re-export key types
pub use aggregate::{aggregate_scenes, aggregate_tests, aggregate_warnings, WarningStyle};
pub use build::{Builder, CmakeBuilder, StepOutcome, TestHarness};
pub use decider::{decide, BuildMode, BuildModeDecider, FullBuildReason};
pub use notify::{
    compose_final_message, Notification, NotificationDispatcher, NotificationSink, NotifyEvent,
    SinkKind,
};
pub use pipeline::{
    PipelineConfig, PipelineController, PipelineReport, PipelineState, ABORTED_MARKER,
    IGNORE_MARKER,
};
pub use sinks::{DashboardClient, StatusApiClient};
pub use telemetry::init_tracing;
pub use vcs::{is_git_repo, GitVcs, RevisionTracker, Vcs};
