//! Notification dispatch to the status API and the dashboard.
//!
//! Guarantees per pipeline run:
//! - at most one delivery per (sink, logical event) pair
//! - per-sink ordering follows the order events occur in the pipeline
//! - the two sinks are independent; one failing never blocks the other
//! - sink failures are logged and swallowed, never fatal

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use gantry_domain::{Aggregated, BuildStatus, SceneCounts, TestCounts};

/// Which external system a notification goes to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    StatusApi,
    Dashboard,
}

impl std::fmt::Display for SinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SinkKind::StatusApi => write!(f, "status-api"),
            SinkKind::Dashboard => write!(f, "dashboard"),
        }
    }
}

/// Logical notification points in one pipeline run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotifyEvent {
    PipelineStart,
    CompileResult,
    TestResult,
    SceneResult,
    FinalStatus,
}

/// One message destined for a sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Build status at the time of sending.
    pub status: BuildStatus,

    /// Human-readable message.
    pub message: String,

    /// Extra key/value fields. The dashboard accumulates these across
    /// calls for the same run; later messages augment, never erase.
    pub fields: BTreeMap<String, String>,

    /// When the notification was dispatched.
    pub sent_at: DateTime<Utc>,
}

/// An external system accepting status notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Which sink this is.
    fn kind(&self) -> SinkKind;

    /// Deliver one notification. Errors are logged by the dispatcher and
    /// never propagated into the pipeline.
    async fn send(
        &self,
        event: NotifyEvent,
        notification: &Notification,
    ) -> gantry_domain::Result<()>;
}

/// Fans notifications out to the configured sinks, exactly once per
/// (sink, event) pair.
pub struct NotificationDispatcher {
    sinks: Vec<Arc<dyn NotificationSink>>,
    delivered: HashSet<(SinkKind, NotifyEvent)>,
}

impl NotificationDispatcher {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        NotificationDispatcher {
            sinks,
            delivered: HashSet::new(),
        }
    }

    /// Dispatch one logical event to every sink that has not seen it yet.
    pub async fn notify(
        &mut self,
        event: NotifyEvent,
        status: BuildStatus,
        message: impl Into<String>,
        fields: BTreeMap<String, String>,
    ) {
        let notification = Notification {
            status,
            message: message.into(),
            fields,
            sent_at: Utc::now(),
        };

        for sink in &self.sinks {
            let key = (sink.kind(), event);
            if self.delivered.contains(&key) {
                debug!(sink = %sink.kind(), event = ?event, "event already delivered, skipping");
                continue;
            }
            match sink.send(event, &notification).await {
                Ok(()) => {
                    self.delivered.insert(key);
                }
                Err(e) => {
                    // Reporting failures must not fail the pipeline.
                    warn!(sink = %sink.kind(), event = ?event, error = %e, "notification failed");
                }
            }
        }
    }

    /// Whether a (sink, event) pair has been delivered.
    pub fn was_delivered(&self, sink: SinkKind, event: NotifyEvent) -> bool {
        self.delivered.contains(&(sink, event))
    }
}

/// Compose the human-readable final-status message.
///
/// Test and scene problems are appended as counts but never demote the
/// machine status: "compiled with failing tests" is still a successful
/// build, distinct from "did not compile".
pub fn compose_final_message(
    base: &str,
    tests: &Aggregated<TestCounts>,
    scenes: &Aggregated<SceneCounts>,
) -> String {
    let mut message = base.to_string();
    if let Some(counts) = tests.counted() {
        if counts.problems() > 0 {
            message.push_str(&format!(", {} unit-test problems", counts.problems()));
        }
    }
    if let Some(counts) = scenes.counted() {
        if counts.problems() > 0 {
            message.push_str(&format!(", {} scene problems", counts.problems()));
        }
    }
    message
}
