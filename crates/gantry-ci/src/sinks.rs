//! HTTP implementations of the notification sinks.
//!
//! - [`StatusApiClient`] posts {state, description} per revision to the
//!   source-hosting status API.
//! - [`DashboardClient`] posts key=value field mappings; fields
//!   accumulate across calls for the same run.
//!
//! Both map connection failures and non-2xx responses to
//! `SinkUnreachable`, which the dispatcher logs and swallows.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use gantry_domain::{PipelineError, Result, RevisionId};

use crate::notify::{Notification, NotificationSink, NotifyEvent, SinkKind};

/// Client for the source-hosting status API.
pub struct StatusApiClient {
    base_url: String,
    revision: RevisionId,
    token: Option<String>,
    http: reqwest::Client,
}

impl StatusApiClient {
    /// Create a client reporting against one revision.
    pub fn new(base_url: impl Into<String>, revision: RevisionId, token: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gantry-ci/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        StatusApiClient {
            base_url: base_url.into(),
            revision,
            token,
            http,
        }
    }
}

#[async_trait]
impl NotificationSink for StatusApiClient {
    fn kind(&self) -> SinkKind {
        SinkKind::StatusApi
    }

    async fn send(&self, event: NotifyEvent, notification: &Notification) -> Result<()> {
        let url = format!(
            "{}/status/{}",
            self.base_url.trim_end_matches('/'),
            self.revision
        );
        let body = json!({
            "state": notification.status.api_state(),
            "description": notification.message,
        });

        let mut request = self.http.post(&url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| PipelineError::SinkUnreachable {
                sink: self.kind().to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(PipelineError::SinkUnreachable {
                sink: self.kind().to_string(),
                message: format!("HTTP {} from {url}", response.status()),
            });
        }

        debug!(event = ?event, url = %url, "status API notified");
        Ok(())
    }
}

/// Client for the CI dashboard.
///
/// The dashboard accepts arbitrary key=value fields per call and treats
/// them as accumulating for the run, so each send merges the new fields
/// into everything reported so far and posts the full mapping.
pub struct DashboardClient {
    base_url: String,
    run_id: String,
    http: reqwest::Client,
    fields: Mutex<BTreeMap<String, String>>,
}

impl DashboardClient {
    /// Create a client reporting one run.
    pub fn new(base_url: impl Into<String>, run_id: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("gantry-ci/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        DashboardClient {
            base_url: base_url.into(),
            run_id: run_id.into(),
            http,
            fields: Mutex::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl NotificationSink for DashboardClient {
    fn kind(&self) -> SinkKind {
        SinkKind::Dashboard
    }

    async fn send(&self, event: NotifyEvent, notification: &Notification) -> Result<()> {
        let merged = {
            let mut fields = self.fields.lock().unwrap();
            for (key, value) in &notification.fields {
                fields.insert(key.clone(), value.clone());
            }
            fields.insert("status".to_string(), notification.status.to_string());
            fields.insert("message".to_string(), notification.message.clone());
            fields.clone()
        };

        let url = format!(
            "{}/runs/{}",
            self.base_url.trim_end_matches('/'),
            self.run_id
        );
        let response = self.http.post(&url).json(&merged).send().await.map_err(|e| {
            PipelineError::SinkUnreachable {
                sink: self.kind().to_string(),
                message: e.to_string(),
            }
        })?;

        if !response.status().is_success() {
            return Err(PipelineError::SinkUnreachable {
                sink: self.kind().to_string(),
                message: format!("HTTP {} from {url}", response.status()),
            });
        }

        debug!(event = ?event, url = %url, fields = merged.len(), "dashboard notified");
        Ok(())
    }
}
