//! GitHub REST API client
//!
//! Every public fetch either returns the complete result (all pages, in order)
//! or a single terminal [`GhDataError`]. Nothing is retried here.

use std::collections::HashSet;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::constants::{
    ACCEPT_JSON, ALL, LINK, MAX_ERROR_BODY, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET,
};
use crate::context::Context;
use crate::error::{GhDataError, Result};
use crate::link::next_link;

/// Counters for the primary (core) quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub limit: i64,
    pub remaining: i64,
    pub reset: i64,
}

#[derive(Deserialize)]
struct RateLimitBody {
    rate: Option<RateLimitStatus>,
    resources: Option<RateLimitResources>,
}

#[derive(Deserialize)]
struct RateLimitResources {
    core: Option<RateLimitStatus>,
}

/// Body and headers of one successful response.
struct Page {
    body: Value,
    link: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    base_url: Url,
}

impl GitHubClient {
    pub fn new(ctx: &Context) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_JSON));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&ctx.user_agent)
                .map_err(|e| GhDataError::Config(format!("invalid user agent: {}", e)))?,
        );
        if let Some(token) = &ctx.github_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| GhDataError::Config("token contains invalid characters".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(ctx.timeout())
            .build()
            .map_err(|e| GhDataError::Config(format!("cannot build HTTP client: {}", e)))?;

        // A trailing slash makes Url::join keep any path prefix (GitHub Enterprise /api/v3)
        let base_url = Url::parse(&format!("{}/", ctx.api_url.trim_end_matches('/')))?;

        Ok(Self { http, base_url })
    }

    /// `GET /user`
    pub async fn fetch_authenticated_user(&self) -> Result<Value> {
        let url = self.endpoint("user", &[])?;
        let page = self.get(&url).await?;
        match page.body {
            Value::Object(_) => Ok(page.body),
            _ => Err(GhDataError::MalformedResponse(
                "expected an object for /user".to_string(),
            )),
        }
    }

    /// `GET /rate_limit`
    pub async fn fetch_rate_limit_status(&self) -> Result<RateLimitStatus> {
        let url = self.endpoint("rate_limit", &[])?;
        let page = self.get(&url).await?;
        let body: RateLimitBody = serde_json::from_value(page.body).map_err(|e| {
            GhDataError::MalformedResponse(format!("unexpected /rate_limit body: {}", e))
        })?;
        body.resources
            .and_then(|r| r.core)
            .or(body.rate)
            .ok_or_else(|| {
                GhDataError::MalformedResponse("no core quota in /rate_limit".to_string())
            })
    }

    /// `GET /user/repos`, every page.
    pub async fn fetch_all_repositories_for_user(&self, per_page: u32) -> Result<Vec<Value>> {
        let per_page = per_page.to_string();
        let url = self.endpoint("user/repos", &[("per_page", &per_page), ("page", "1")])?;
        let items = self.fetch_all(url).await?;
        info!("Fetched {} repositories", items.len());
        Ok(items)
    }

    /// `GET /repos/{owner}/{repo}/issues?state=all`, every page.
    ///
    /// The issues endpoint returns pull requests too. `since` is an ISO-8601 instant;
    /// only items updated at or after it are returned.
    pub async fn fetch_all_issues(
        &self,
        owner: &str,
        repo: &str,
        per_page: u32,
        since: Option<&str>,
    ) -> Result<Vec<Value>> {
        let per_page = per_page.to_string();
        let mut query = vec![("state", ALL), ("per_page", per_page.as_str()), ("page", "1")];
        if let Some(since) = since {
            query.push(("since", since));
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| GhDataError::Config(format!("API URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["repos", owner, repo, "issues"]);
        url.query_pairs_mut().extend_pairs(query);

        let items = self.fetch_all(url).await?;
        info!("Fetched {} issues/PRs for {}/{}", items.len(), owner, repo);
        Ok(items)
    }

    fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Follow `rel="next"` links from `first` until there are none left.
    ///
    /// Next links must stay on the API origin; the client sends the token on every request.
    async fn fetch_all(&self, first: Url) -> Result<Vec<Value>> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next.take() {
            if !visited.insert(url.as_str().to_string()) {
                return Err(GhDataError::Protocol(format!(
                    "pagination cycle: {} was already fetched",
                    url
                )));
            }

            let page = self.get(&url).await?;
            match page.body {
                Value::Array(page_items) => {
                    debug!("Page {} returned {} items", visited.len(), page_items.len());
                    items.extend(page_items);
                }
                _ => {
                    return Err(GhDataError::MalformedResponse(format!(
                        "expected a list response for {}",
                        url.path()
                    )))
                }
            }

            next = match next_link(page.link.as_deref(), &url)? {
                Some(next_url) if next_url.origin() != self.base_url.origin() => {
                    return Err(GhDataError::Protocol(format!(
                        "next link {} leaves the API origin {}",
                        next_url,
                        self.base_url.origin().ascii_serialization()
                    )))
                }
                other => other,
            };
        }

        Ok(items)
    }

    async fn get(&self, url: &Url) -> Result<Page> {
        debug!("GET {}", url);
        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(GhDataError::Network)?;

        let status = resp.status();
        let headers = resp.headers().clone();
        let text = resp.text().await.map_err(GhDataError::Network)?;

        if let Some(err) = classify_status(status, &headers, &text) {
            return Err(err);
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| {
            GhDataError::MalformedResponse(format!("invalid JSON from {}: {}", url.path(), e))
        })?;
        let link = headers
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Ok(Page { body, link })
    }
}

/// Map a non-success status to its error kind, `None` for 2xx/3xx.
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> Option<GhDataError> {
    if status == StatusCode::UNAUTHORIZED {
        return Some(GhDataError::Auth);
    }

    if status == StatusCode::FORBIDDEN {
        let remaining = header_str(headers, RATE_LIMIT_REMAINING);
        if remaining.map(str::trim) == Some("0") {
            let reset = header_str(headers, RATE_LIMIT_RESET).and_then(|v| v.trim().parse().ok());
            return Some(GhDataError::RateLimited { reset });
        }
    }

    if status.is_client_error() || status.is_server_error() {
        return Some(GhDataError::Http {
            status: status.as_u16(),
            body: truncate(body, MAX_ERROR_BODY),
        });
    }

    None
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
