// Constants used throughout ghdata

// GitHub API
pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const ACCEPT_JSON: &str = "application/vnd.github+json";
pub const USER_AGENT: &str = concat!("ghdata/", env!("CARGO_PKG_VERSION"));
pub const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";
pub const LINK: &str = "link";

// Defaults
pub const DEFAULT_DB_PATH: &str = "ghdata.sqlite";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_PER_PAGE: u32 = 100;
pub const DEFAULT_TOP_N: usize = 10;
pub const MAX_ERROR_BODY: usize = 200;
pub const TOP_OPEN_LIMIT: i64 = 5;

// Issue states
pub const OPEN: &str = "open";
pub const CLOSED: &str = "closed";
pub const ALL: &str = "all";

// Sync state keys
pub const REPOS_SYNCED_AT: &str = "repos_synced_at";
pub const ISSUES_SINCE_PREFIX: &str = "issues_since:";
