//! SQLite storage for repositories, issues and sync state
//!
//! A connection is opened for each call and dropped when it returns, so a long
//! multi-repository sync never holds the database open between batches. Each
//! upsert batch runs in its own transaction.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};
use tracing::{debug, info};

use crate::constants::TOP_OPEN_LIMIT;
use crate::error::Result;
use crate::transform::{IssueRow, IssueState, RepoRow};

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS repos (
        repo_id INTEGER PRIMARY KEY,
        name TEXT NOT NULL,
        full_name TEXT NOT NULL,
        is_private INTEGER NOT NULL,
        html_url TEXT NOT NULL,
        stargazers_count INTEGER NOT NULL,
        forks_count INTEGER NOT NULL,
        open_issues_count INTEGER NOT NULL,
        pushed_at TEXT
    )
    "#,
    // issue_id is global across issues and pull requests
    r#"
    CREATE TABLE IF NOT EXISTS issues (
        issue_id INTEGER PRIMARY KEY,
        repo_id INTEGER NOT NULL,
        number INTEGER NOT NULL,
        title TEXT NOT NULL,
        state TEXT NOT NULL,
        is_pull_request INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        closed_at TEXT,
        html_url TEXT NOT NULL,
        user_login TEXT,
        FOREIGN KEY (repo_id) REFERENCES repos(repo_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_issues_repo_state ON issues(repo_id, state)",
    r#"
    CREATE TABLE IF NOT EXISTS state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
];

const UPSERT_REPO: &str = r#"
    INSERT INTO repos (
        repo_id, name, full_name, is_private, html_url,
        stargazers_count, forks_count, open_issues_count, pushed_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(repo_id) DO UPDATE SET
        name = excluded.name,
        full_name = excluded.full_name,
        is_private = excluded.is_private,
        html_url = excluded.html_url,
        stargazers_count = excluded.stargazers_count,
        forks_count = excluded.forks_count,
        open_issues_count = excluded.open_issues_count,
        pushed_at = excluded.pushed_at
"#;

const UPSERT_ISSUE: &str = r#"
    INSERT INTO issues (
        issue_id, repo_id, number, title, state, is_pull_request,
        created_at, updated_at, closed_at, html_url, user_login
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(issue_id) DO UPDATE SET
        repo_id = excluded.repo_id,
        number = excluded.number,
        title = excluded.title,
        state = excluded.state,
        is_pull_request = excluded.is_pull_request,
        created_at = excluded.created_at,
        updated_at = excluded.updated_at,
        closed_at = excluded.closed_at,
        html_url = excluded.html_url,
        user_login = excluded.user_login
"#;

const METRICS_COUNTS: &str = r#"
    SELECT
        COUNT(*) AS total,
        COALESCE(SUM(CASE WHEN is_pull_request = 0 AND state = 'open' THEN 1 ELSE 0 END), 0) AS issues_open,
        COALESCE(SUM(CASE WHEN is_pull_request = 0 AND state = 'closed' THEN 1 ELSE 0 END), 0) AS issues_closed,
        COALESCE(SUM(CASE WHEN is_pull_request = 1 AND state = 'open' THEN 1 ELSE 0 END), 0) AS prs_open,
        COALESCE(SUM(CASE WHEN is_pull_request = 1 AND state = 'closed' THEN 1 ELSE 0 END), 0) AS prs_closed
    FROM issues
"#;

// Equal counts are ordered by full_name so the report is stable across runs
const TOP_OPEN_ISSUES: &str = r#"
    SELECT r.full_name AS full_name, COUNT(*) AS open_issues
    FROM issues i
    JOIN repos r ON r.repo_id = i.repo_id
    WHERE i.is_pull_request = 0 AND i.state = 'open'
    GROUP BY r.repo_id, r.full_name
    ORDER BY open_issues DESC, r.full_name ASC
    LIMIT ?
"#;

const LIST_REPOS: &str = r#"
    SELECT repo_id, name, full_name, is_private, html_url,
           stargazers_count, forks_count, open_issues_count, pushed_at
    FROM repos
    ORDER BY stargazers_count DESC, forks_count DESC, full_name ASC
    LIMIT ?
"#;

/// Aggregates over the issues table, computed at query time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub total: i64,
    pub issues_open: i64,
    pub issues_closed: i64,
    pub prs_open: i64,
    pub prs_closed: i64,
    pub top_open_issues: Vec<RepoOpenIssues>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoOpenIssues {
    pub full_name: String,
    pub open_issues: i64,
}

#[derive(Debug, Clone)]
pub struct Storage {
    path: PathBuf,
    options: SqliteConnectOptions,
}

impl Storage {
    /// Open (creating if needed) the database file and make sure the schema exists.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let storage = Self { path, options };
        storage.ensure_schema().await?;
        Ok(storage)
    }

    async fn connect(&self) -> Result<SqliteConnection> {
        Ok(self.options.connect().await?)
    }

    async fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.connect().await?;
        for sql in SCHEMA {
            sqlx::query(sql).execute(&mut conn).await?;
        }
        debug!("Schema verified at {}", self.path.display());
        Ok(())
    }

    /// Insert new repositories and overwrite existing ones. Returns the number of rows submitted.
    pub async fn upsert_repos(&self, rows: &[RepoRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;
        for row in rows {
            sqlx::query(UPSERT_REPO)
                .bind(row.repo_id)
                .bind(&row.name)
                .bind(&row.full_name)
                .bind(row.is_private)
                .bind(&row.html_url)
                .bind(row.stargazers_count)
                .bind(row.forks_count)
                .bind(row.open_issues_count)
                .bind(row.pushed_at)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!("Upserted {} repositories", rows.len());
        Ok(rows.len())
    }

    /// Insert new issues and overwrite existing ones. Returns the number of rows submitted.
    ///
    /// Every row must reference a stored repository; a foreign key violation fails
    /// the whole batch and nothing from it is kept.
    pub async fn upsert_issues(&self, rows: &[IssueRow]) -> Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connect().await?;
        let mut tx = conn.begin().await?;
        for row in rows {
            sqlx::query(UPSERT_ISSUE)
                .bind(row.issue_id)
                .bind(row.repo_id)
                .bind(row.number)
                .bind(&row.title)
                .bind(row.state.as_str())
                .bind(row.is_pull_request)
                .bind(row.created_at)
                .bind(row.updated_at)
                .bind(row.closed_at)
                .bind(&row.html_url)
                .bind(&row.user_login)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!("Upserted {} issues", rows.len());
        Ok(rows.len())
    }

    pub async fn metrics(&self) -> Result<Metrics> {
        let mut conn = self.connect().await?;

        let row = sqlx::query(METRICS_COUNTS).fetch_one(&mut conn).await?;
        let mut metrics = Metrics {
            total: row.try_get("total")?,
            issues_open: row.try_get("issues_open")?,
            issues_closed: row.try_get("issues_closed")?,
            prs_open: row.try_get("prs_open")?,
            prs_closed: row.try_get("prs_closed")?,
            top_open_issues: Vec::new(),
        };

        let rows = sqlx::query(TOP_OPEN_ISSUES)
            .bind(TOP_OPEN_LIMIT)
            .fetch_all(&mut conn)
            .await?;
        for row in rows {
            metrics.top_open_issues.push(RepoOpenIssues {
                full_name: row.try_get("full_name")?,
                open_issues: row.try_get("open_issues")?,
            });
        }

        Ok(metrics)
    }

    /// Repositories by stars, then forks, descending.
    pub async fn list_repos(&self, limit: usize) -> Result<Vec<RepoRow>> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(LIST_REPOS)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&mut conn)
            .await?;
        rows.iter().map(repo_from_row).collect()
    }

    pub async fn count_repos(&self) -> Result<i64> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT COUNT(*) AS count FROM repos")
            .fetch_one(&mut conn)
            .await?;
        Ok(row.try_get("count")?)
    }

    pub async fn list_issues(&self, repo_id: i64) -> Result<Vec<IssueRow>> {
        let mut conn = self.connect().await?;
        let rows = sqlx::query(
            r#"
            SELECT issue_id, repo_id, number, title, state, is_pull_request,
                   created_at, updated_at, closed_at, html_url, user_login
            FROM issues
            WHERE repo_id = ?
            ORDER BY number ASC
            "#,
        )
        .bind(repo_id)
        .fetch_all(&mut conn)
        .await?;
        rows.iter().map(issue_from_row).collect()
    }

    pub async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connect().await?;
        let row = sqlx::query("SELECT value FROM state WHERE key = ?")
            .bind(key)
            .fetch_optional(&mut conn)
            .await?;
        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    pub async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connect().await?;
        sqlx::query(
            r#"
            INSERT INTO state (key, value)
            VALUES (?, ?)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&mut conn)
        .await?;
        debug!("State {} = {}", key, value);
        Ok(())
    }
}

fn repo_from_row(row: &SqliteRow) -> Result<RepoRow> {
    Ok(RepoRow {
        repo_id: row.try_get("repo_id")?,
        name: row.try_get("name")?,
        full_name: row.try_get("full_name")?,
        is_private: row.try_get("is_private")?,
        html_url: row.try_get("html_url")?,
        stargazers_count: row.try_get("stargazers_count")?,
        forks_count: row.try_get("forks_count")?,
        open_issues_count: row.try_get("open_issues_count")?,
        pushed_at: row.try_get::<Option<DateTime<Utc>>, _>("pushed_at")?,
    })
}

fn issue_from_row(row: &SqliteRow) -> Result<IssueRow> {
    let state: String = row.try_get("state")?;
    Ok(IssueRow {
        issue_id: row.try_get("issue_id")?,
        repo_id: row.try_get("repo_id")?,
        number: row.try_get("number")?,
        title: row.try_get("title")?,
        state: state.parse::<IssueState>()?,
        is_pull_request: row.try_get("is_pull_request")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        closed_at: row.try_get("closed_at")?,
        html_url: row.try_get("html_url")?,
        user_login: row.try_get("user_login")?,
    })
}
