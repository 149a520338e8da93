use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_API_URL, DEFAULT_DB_PATH, DEFAULT_PER_PAGE, DEFAULT_TIMEOUT_SECS, DEFAULT_TOP_N,
    USER_AGENT,
};
use crate::error::{GhDataError, Result};

/// Runtime configuration handed to the client, storage and sync constructors.
///
/// Nothing in the core reads the process environment on its own; callers build a
/// `Context` (usually via [`Context::from_env`]) and pass it down explicitly.
#[derive(Clone, Serialize, Deserialize)]
pub struct Context {
    // From GITHUB_TOKEN, sent as a bearer token when present
    #[serde(skip_serializing, default)]
    pub github_token: Option<String>,

    // From GHDATA_DB, default "ghdata.sqlite"
    pub db_path: PathBuf,

    // From GHDATA_API_URL, default "https://api.github.com"
    pub api_url: String,

    // From GHDATA_TIMEOUT, per-request timeout in seconds, default 10
    pub timeout_secs: u64,

    // From GHDATA_PER_PAGE, default 100 (the API maximum)
    pub per_page: u32,

    // From GHDATA_TOP_N, how many repositories issue sync covers, default 10
    pub top_n: usize,

    pub user_agent: String,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            github_token: None,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            per_page: DEFAULT_PER_PAGE,
            top_n: DEFAULT_TOP_N,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

// Keeps the token out of logs.
impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("github_token", &self.github_token.as_ref().map(|_| "<redacted>"))
            .field("db_path", &self.db_path)
            .field("api_url", &self.api_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("per_page", &self.per_page)
            .field("top_n", &self.top_n)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Context {
    /// Load context from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a context from an arbitrary key lookup, unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut ctx = Self::default();

        if let Some(token) = lookup("GITHUB_TOKEN") {
            let token = token.trim().to_string();
            if !token.is_empty() {
                ctx.github_token = Some(token);
            }
        }

        if let Some(db) = lookup("GHDATA_DB") {
            ctx.db_path = PathBuf::from(db);
        }

        if let Some(api_url) = lookup("GHDATA_API_URL") {
            ctx.api_url = api_url.trim_end_matches('/').to_string();
        }

        if let Some(timeout) = lookup("GHDATA_TIMEOUT") {
            ctx.timeout_secs = parse_var("GHDATA_TIMEOUT", &timeout)?;
        }

        if let Some(per_page) = lookup("GHDATA_PER_PAGE") {
            ctx.per_page = parse_var("GHDATA_PER_PAGE", &per_page)?;
        }

        if let Some(top_n) = lookup("GHDATA_TOP_N") {
            ctx.top_n = parse_var("GHDATA_TOP_N", &top_n)?;
        }

        ctx.validate()?;
        Ok(ctx)
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(GhDataError::Config("timeout must be at least 1 second".to_string()));
        }
        if self.per_page == 0 || self.per_page > 100 {
            return Err(GhDataError::Config(format!(
                "per_page must be between 1 and 100, got {}",
                self.per_page
            )));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| GhDataError::Config(format!("{} has an invalid value: {:?}", name, value)))
}
