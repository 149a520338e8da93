//! Raw API objects -> normalized rows
//!
//! Decoding is schema-validated: a missing or mistyped mandatory field fails the
//! item with [`GhDataError::Mapping`], and the batch helpers stop at the first
//! failure rather than silently dropping rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GhDataError, Result};

/// Normalized repository row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRow {
    pub repo_id: i64,
    pub name: String,
    pub full_name: String,
    pub is_private: bool,
    pub html_url: String,
    pub stargazers_count: i64,
    pub forks_count: i64,
    pub open_issues_count: i64,
    pub pushed_at: Option<DateTime<Utc>>,
}

impl RepoRow {
    /// Split `full_name` into `(owner, name)`.
    pub fn owner_and_name(&self) -> Option<(&str, &str)> {
        let (owner, name) = self.full_name.split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some((owner, name))
    }
}

/// Normalized issue row, pull requests included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRow {
    pub issue_id: i64,
    pub repo_id: i64,
    pub number: i64,
    pub title: String,
    pub state: IssueState,
    pub is_pull_request: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub html_url: String,
    pub user_login: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueState::Open => crate::constants::OPEN,
            IssueState::Closed => crate::constants::CLOSED,
        }
    }
}

impl std::str::FromStr for IssueState {
    type Err = GhDataError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(IssueState::Open),
            "closed" => Ok(IssueState::Closed),
            other => Err(GhDataError::Mapping(format!("unknown issue state {:?}", other))),
        }
    }
}

impl std::fmt::Display for IssueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Wire shapes. Only the fields we keep are declared; everything else is ignored.

#[derive(Deserialize)]
struct RawRepo {
    id: i64,
    name: String,
    full_name: String,
    #[serde(default)]
    private: Option<bool>,
    html_url: String,
    #[serde(default)]
    stargazers_count: Option<i64>,
    #[serde(default)]
    forks_count: Option<i64>,
    #[serde(default)]
    open_issues_count: Option<i64>,
    #[serde(default)]
    pushed_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawIssue {
    id: i64,
    number: i64,
    #[serde(default)]
    title: Option<String>,
    state: IssueState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    closed_at: Option<DateTime<Utc>>,
    html_url: String,
    #[serde(default)]
    user: Option<RawUser>,
    // Present (any value, even null) only on pull requests
    #[serde(default, deserialize_with = "present")]
    pull_request: bool,
}

#[derive(Deserialize)]
struct RawUser {
    #[serde(default)]
    login: Option<String>,
}

fn present<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde::de::IgnoredAny::deserialize(deserializer).map(|_| true)
}

pub fn repo_from_json(item: &Value) -> Result<RepoRow> {
    let raw = RawRepo::deserialize(item)
        .map_err(|e| GhDataError::Mapping(format!("repository {}: {}", describe(item), e)))?;

    Ok(RepoRow {
        repo_id: raw.id,
        name: raw.name,
        full_name: raw.full_name,
        is_private: raw.private.unwrap_or(false),
        html_url: raw.html_url,
        stargazers_count: raw.stargazers_count.unwrap_or(0),
        forks_count: raw.forks_count.unwrap_or(0),
        open_issues_count: raw.open_issues_count.unwrap_or(0),
        pushed_at: raw.pushed_at,
    })
}

/// `repo_id` comes from the repository the issue was fetched for.
pub fn issue_from_json(repo_id: i64, item: &Value) -> Result<IssueRow> {
    let raw = RawIssue::deserialize(item)
        .map_err(|e| GhDataError::Mapping(format!("issue {}: {}", describe(item), e)))?;

    Ok(IssueRow {
        issue_id: raw.id,
        repo_id,
        number: raw.number,
        title: raw.title.unwrap_or_default(),
        state: raw.state,
        is_pull_request: raw.pull_request,
        created_at: raw.created_at,
        updated_at: raw.updated_at,
        closed_at: raw.closed_at,
        html_url: raw.html_url,
        user_login: raw.user.and_then(|u| u.login).filter(|l| !l.is_empty()),
    })
}

pub fn repos_from_json(items: &[Value]) -> Result<Vec<RepoRow>> {
    items.iter().map(repo_from_json).collect()
}

pub fn issues_from_json(repo_id: i64, items: &[Value]) -> Result<Vec<IssueRow>> {
    items.iter().map(|item| issue_from_json(repo_id, item)).collect()
}

// Best identifier available for error messages.
fn describe(item: &Value) -> String {
    match item.get("id") {
        Some(id) => format!("id={}", id),
        None => "without id".to_string(),
    }
}
