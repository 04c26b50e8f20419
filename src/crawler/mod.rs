//! Crawler module for graph traversal
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with rate-limit aware retries
//! - Paginated REST API fetchers and their typed payloads
//! - Per-run frontier state
//! - API-mode coordination and the HTML fallback
//! - HTML parsing of repository listings

mod coordinator;
mod fetcher;
mod fetchers;
mod frontier;
mod html;
mod parser;
pub mod payloads;

pub use coordinator::{Coordinator, CrawlReport, CrawlSettings};
pub use fetcher::{
    build_http_client, classify_rate_limit, FetchClient, FetchError, RateLimit, RetryPolicy,
    API_ACCEPT,
};
pub use fetchers::{GithubFetcher, Paged, CONTRIBUTOR_PAGE_CAP, PER_PAGE, STARRED_PAGE_CAP};
pub use frontier::{Frontier, StopHandle};
pub use html::{HtmlCrawler, HtmlReport, HtmlSettings, DEFAULT_LOGIN};
pub use parser::{
    parse_org_repositories, parse_repo_href, parse_stars, parse_trending_developers,
    parse_user_repositories, RepoLink, ScrapedRepo,
};
