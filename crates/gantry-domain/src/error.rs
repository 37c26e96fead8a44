//! Pipeline error taxonomy.

/// Errors produced by the pipeline core.
///
/// Propagation policy:
/// - `Usage` is fatal before any notification is sent.
/// - `VcsUnavailable` degrades the decision to a conservative full build.
/// - `CacheResetFailed` is retried once, then logged and ignored.
/// - `Collaborator` is classified at the controller, reported to both
///   sinks, then terminates the run.
/// - `SinkUnreachable` is logged and never propagated.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("usage error: {0}")]
    Usage(String),

    #[error("version control unavailable: {0}")]
    VcsUnavailable(String),

    #[error("build cache reset failed: {0}")]
    CacheResetFailed(String),

    #[error("{step} step failed: {message}")]
    Collaborator { step: String, message: String },

    #[error("notification sink {sink} unreachable: {message}")]
    SinkUnreachable { sink: String, message: String },

    #[error("invalid build status transition: {current} -> {requested}")]
    InvalidStatusTransition { current: String, requested: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Helper for collaborator failures.
    pub fn collaborator(step: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::Collaborator {
            step: step.into(),
            message: message.into(),
        }
    }
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_error_display() {
        let err = PipelineError::Usage("unknown build option: bogus".to_string());
        assert!(err.to_string().contains("usage error"));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_collaborator_error_display() {
        let err = PipelineError::collaborator("compile", "exit code 2");
        assert_eq!(err.to_string(), "compile step failed: exit code 2");
    }

    #[test]
    fn test_cache_reset_failed_display() {
        let err = PipelineError::CacheResetFailed("/builds/gcc: permission denied".to_string());
        assert!(err.to_string().contains("build cache reset failed"));
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_sink_unreachable_display() {
        let err = PipelineError::SinkUnreachable {
            sink: "dashboard".to_string(),
            message: "connection refused".to_string(),
        };
        assert!(err.to_string().contains("dashboard"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PipelineError = io.into();
        assert!(err.to_string().contains("io error"));
    }
}
