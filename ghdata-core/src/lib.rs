//! ghdata core library
//!
//! Pulls repositories and issues for one GitHub account into a local SQLite
//! snapshot. The API client, row mapping, storage and sync orchestration live
//! here; the `ghdata` binary in `ghdata-cli` is a thin wrapper around them.

pub mod constants;
pub mod context;
pub mod error;
pub mod github;
pub mod link;
pub mod storage;
pub mod sync;
pub mod transform;

// Re-export commonly used items
pub use context::Context;
pub use error::{GhDataError, Result};
pub use github::{GitHubClient, RateLimitStatus};
pub use storage::{Metrics, RepoOpenIssues, Storage};
pub use sync::{FailurePolicy, IssueSyncOptions, IssueSyncSummary, SyncPhase, SyncProgress};
pub use transform::{IssueRow, IssueState, RepoRow};
