//! Sync orchestration: client -> transform -> storage
//!
//! Repository sync pulls the whole account listing in one batch. Issue sync then
//! walks the top-N stored repositories (by stars, then forks) one at a time, each
//! repository being its own fetch + upsert unit.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::constants::{ISSUES_SINCE_PREFIX, REPOS_SYNCED_AT};
use crate::error::{GhDataError, Result};
use crate::github::GitHubClient;
use crate::storage::Storage;
use crate::transform::{issues_from_json, repos_from_json, RepoRow};

/// Where an issue sync run currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncPhase {
    NotStarted,
    SelectingRepositories,
    FetchingIssues { repo: String },
    TransformingIssues { repo: String },
    PersistingIssues { repo: String },
    Completed,
}

/// Progress events emitted during sync operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncProgress {
    /// The run moved to a new phase.
    Phase(SyncPhase),
    /// Repositories chosen for issue sync, in processing order.
    Selected { repos: Vec<String> },
    /// One repository's issues were stored.
    RepoSynced {
        repo: String,
        count: usize,
        total_so_far: usize,
    },
    /// One repository failed and the run carried on (isolate policy only).
    RepoFailed { repo: String, error: String },
}

pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is set.
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(callback) = on_progress {
        callback(event);
    }
}

/// What to do when one repository's issue sync fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Stop the run at the first error. Repositories already persisted stay persisted.
    #[default]
    Abort,
    /// Record the failure and continue with the next repository.
    Isolate,
}

#[derive(Debug, Clone)]
pub struct IssueSyncOptions {
    /// How many of the top stored repositories to cover
    pub top_n: usize,
    pub per_page: u32,
    /// Only fetch items updated since the last successful sync of each repository
    pub incremental: bool,
    pub failure_policy: FailurePolicy,
}

impl Default for IssueSyncOptions {
    fn default() -> Self {
        Self {
            top_n: crate::constants::DEFAULT_TOP_N,
            per_page: crate::constants::DEFAULT_PER_PAGE,
            incremental: false,
            failure_policy: FailurePolicy::Abort,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSyncCount {
    pub full_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSyncFailure {
    pub full_name: String,
    pub error: String,
}

/// Outcome of an issue sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSyncSummary {
    pub total: usize,
    pub repos: Vec<RepoSyncCount>,
    pub failures: Vec<RepoSyncFailure>,
}

/// State key holding the `since` cursor for one repository.
pub fn issues_since_key(full_name: &str) -> String {
    format!("{}{}", ISSUES_SINCE_PREFIX, full_name)
}

fn now_cursor() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Fetch every repository of the account, store them, and return how many were stored.
pub async fn sync_repositories(
    client: &GitHubClient,
    storage: &Storage,
    per_page: u32,
) -> Result<usize> {
    let started_at = now_cursor();
    let items = client.fetch_all_repositories_for_user(per_page).await?;
    let rows = repos_from_json(&items)?;
    let count = storage.upsert_repos(&rows).await?;
    storage.set_state(REPOS_SYNCED_AT, &started_at).await?;
    info!("Synced {} repositories", count);
    Ok(count)
}

/// Sync issues and pull requests for the top `options.top_n` stored repositories.
pub async fn sync_issues(
    client: &GitHubClient,
    storage: &Storage,
    options: &IssueSyncOptions,
    on_progress: Option<&ProgressCallback>,
) -> Result<IssueSyncSummary> {
    emit(on_progress, SyncProgress::Phase(SyncPhase::NotStarted));
    emit(on_progress, SyncProgress::Phase(SyncPhase::SelectingRepositories));

    let repos = storage.list_repos(options.top_n).await?;
    emit(
        on_progress,
        SyncProgress::Selected {
            repos: repos.iter().map(|r| r.full_name.clone()).collect(),
        },
    );
    info!("Syncing issues for {} repositories", repos.len());

    let mut summary = IssueSyncSummary::default();
    for repo in &repos {
        match sync_repo_issues(client, storage, repo, options, on_progress).await {
            Ok(count) => {
                summary.total += count;
                summary.repos.push(RepoSyncCount {
                    full_name: repo.full_name.clone(),
                    count,
                });
                info!("{}: {} issues/PRs", repo.full_name, count);
                emit(
                    on_progress,
                    SyncProgress::RepoSynced {
                        repo: repo.full_name.clone(),
                        count,
                        total_so_far: summary.total,
                    },
                );
            }
            Err(err) if options.failure_policy == FailurePolicy::Isolate => {
                warn!("Issue sync failed for {}: {}", repo.full_name, err);
                emit(
                    on_progress,
                    SyncProgress::RepoFailed {
                        repo: repo.full_name.clone(),
                        error: err.to_string(),
                    },
                );
                summary.failures.push(RepoSyncFailure {
                    full_name: repo.full_name.clone(),
                    error: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    emit(on_progress, SyncProgress::Phase(SyncPhase::Completed));
    info!(
        "Synced {} issues/PRs across {} repositories ({} failed)",
        summary.total,
        summary.repos.len(),
        summary.failures.len()
    );
    Ok(summary)
}

async fn sync_repo_issues(
    client: &GitHubClient,
    storage: &Storage,
    repo: &RepoRow,
    options: &IssueSyncOptions,
    on_progress: Option<&ProgressCallback>,
) -> Result<usize> {
    let (owner, name) = repo.owner_and_name().ok_or_else(|| {
        GhDataError::Mapping(format!("repository full_name {:?} is not owner/name", repo.full_name))
    })?;

    let cursor_key = issues_since_key(&repo.full_name);
    let since = if options.incremental {
        storage.get_state(&cursor_key).await?
    } else {
        None
    };
    // Taken before fetching so items updated mid-fetch are picked up next time
    let started_at = now_cursor();

    emit(
        on_progress,
        SyncProgress::Phase(SyncPhase::FetchingIssues {
            repo: repo.full_name.clone(),
        }),
    );
    let items = client
        .fetch_all_issues(owner, name, options.per_page, since.as_deref())
        .await?;

    emit(
        on_progress,
        SyncProgress::Phase(SyncPhase::TransformingIssues {
            repo: repo.full_name.clone(),
        }),
    );
    let rows = issues_from_json(repo.repo_id, &items)?;

    emit(
        on_progress,
        SyncProgress::Phase(SyncPhase::PersistingIssues {
            repo: repo.full_name.clone(),
        }),
    );
    let count = storage.upsert_issues(&rows).await?;
    storage.set_state(&cursor_key, &started_at).await?;

    Ok(count)
}
