//! Forge-Ripple: a collaboration-graph crawler
//!
//! This crate walks a code-hosting platform breadth-first from seed identities,
//! through the paginated REST API or an HTML fallback, and keeps profiles,
//! repositories, issues and pull requests in a content-addressed store that
//! skips unchanged records.

pub mod config;
pub mod crawler;
pub mod graph;
pub mod output;
pub mod service;
pub mod storage;

use thiserror::Error;

/// Main error type for Forge-Ripple operations
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] crawler::FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Invalid repository id '{0}', expected OWNER/NAME")]
    InvalidRepositoryId(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Forge-Ripple operations
pub type Result<T> = std::result::Result<T, ForgeError>;

// Re-export commonly used types
pub use config::{Config, CrawlMode};
pub use service::{CrawlRequest, CrawlService};
pub use storage::{Store, StoreCounts};
