//! Gantry domain model.
//!
//! Pure data types shared by the pipeline core and the CLI:
//! - Build options (typed flag set)
//! - Revision identifiers
//! - Build status lifecycle with monotonic transitions
//! - Test/scene/warning counts with Missing-vs-zero semantics
//! - Build cache state and its on-disk layout
//! - The pipeline error taxonomy

pub mod cache;
pub mod counts;
pub mod error;
pub mod options;
pub mod revision;
pub mod status;

pub use cache::BuildCacheState;
pub use counts::{Aggregated, SceneCounts, TestCounts};
pub use error::{PipelineError, Result};
pub use options::{BuildOption, BuildOptions};
pub use revision::RevisionId;
pub use status::{BuildStatus, StatusTracker};
