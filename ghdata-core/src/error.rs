use thiserror::Error;

/// Custom error type for ghdata operations
#[derive(Debug, Error)]
pub enum GhDataError {
    /// HTTP 401 from the API
    #[error("Unauthorized (401). Check your GITHUB_TOKEN")]
    Auth,
    /// HTTP 403 with the primary quota exhausted
    #[error("Rate limited. Resets at unix time {}", fmt_reset(.reset))]
    RateLimited { reset: Option<i64> },
    /// Any other non-success status
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Timeouts and connection failures
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),
    /// 2xx response whose body is not what the endpoint promises
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
    /// Pagination protocol violations (next-link cycles)
    #[error("Protocol error: {0}")]
    Protocol(String),
    /// Raw API object could not be mapped to a row
    #[error("Mapping error: {0}")]
    Mapping(String),
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

fn fmt_reset(reset: &Option<i64>) -> String {
    match reset {
        Some(ts) => ts.to_string(),
        None => "unknown".to_string(),
    }
}

impl GhDataError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GhDataError::RateLimited { .. })
    }

    /// Errors produced by the API client, as opposed to mapping or storage.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GhDataError::Auth
                | GhDataError::RateLimited { .. }
                | GhDataError::Http { .. }
                | GhDataError::Network(_)
                | GhDataError::MalformedResponse(_)
                | GhDataError::Protocol(_)
        )
    }
}

impl From<reqwest::Error> for GhDataError {
    fn from(err: reqwest::Error) -> Self {
        GhDataError::Network(err)
    }
}

impl From<url::ParseError> for GhDataError {
    fn from(err: url::ParseError) -> Self {
        GhDataError::Config(format!("invalid URL: {}", err))
    }
}

/// Result type alias for ghdata operations
pub type Result<T> = std::result::Result<T, GhDataError>;
