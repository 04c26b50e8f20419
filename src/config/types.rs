use serde::{Deserialize, Serialize};

/// Main configuration structure for Forge-Ripple
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub html: HtmlConfig,
    pub storage: StorageConfig,
}

/// Traversal mode of a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CrawlMode {
    /// Paginated REST API traversal
    Api,
    /// HTML page scraping, no token required
    Html,
}

impl std::fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrawlMode::Api => write!(f, "api"),
            CrawlMode::Html => write!(f, "html"),
        }
    }
}

/// Traversal bounds and pacing
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of identities (or repositories in HTML mode) per run
    pub max_iterations: u32,

    /// Delay between identities and between pages (milliseconds)
    pub delay_ms: u64,

    /// Maximum length of the pending identity queue
    pub queue_cap: usize,

    /// Also expand starred repositories of each identity
    pub include_starred: bool,

    /// Mode used when a request does not name one
    pub default_mode: Option<CrawlMode>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20_000,
            delay_ms: 1_000,
            queue_cap: 100,
            include_starred: false,
            default_mode: None,
        }
    }
}

/// REST API client configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApiConfig {
    pub base_url: String,

    /// Personal access token; `--token` and `GITHUB_TOKEN` take precedence
    pub token: Option<String>,

    pub user_agent: String,

    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// Attempts allowed for rate-limited requests
    pub max_retries: u32,

    /// First abuse-detection backoff, doubled on each retry (milliseconds)
    pub initial_backoff_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            token: None,
            user_agent: "forge-ripple/1.0".to_string(),
            timeout_secs: 15,
            max_retries: 5,
            initial_backoff_ms: 5_000,
        }
    }
}

/// HTML fallback configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct HtmlConfig {
    pub base_url: String,

    /// Listing pages fetched per organization
    pub max_pages: u32,

    /// Upper bound on listing pages in flight at once
    pub max_concurrent_pages: u32,
}

impl Default for HtmlConfig {
    fn default() -> Self {
        Self {
            base_url: "https://github.com".to_string(),
            max_pages: 50,
            max_concurrent_pages: 50,
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}
