//! Opaque source revision identifiers.

use serde::{Deserialize, Serialize};

/// Identifier of a source snapshot (e.g. a commit hash).
///
/// The value is opaque to the pipeline: it supports equality and display
/// only. Queries about what changed between two revisions go through the
/// version-control collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(String);

impl RevisionId {
    /// Wrap a revision string as reported by the version-control tool.
    pub fn new(id: impl Into<String>) -> Self {
        RevisionId(id.into())
    }

    /// The full revision string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 12 characters) for log lines and messages.
    ///
    /// Counts characters rather than bytes; the id is opaque and not
    /// guaranteed to be ASCII.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(12) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl std::fmt::Display for RevisionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for RevisionId {
    fn from(s: &str) -> Self {
        RevisionId::new(s)
    }
}
