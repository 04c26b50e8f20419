//! Output module for reporting crawl results
//!
//! This module handles:
//! - Loading aggregate statistics from the store
//! - Printing statistics and repository listings for the CLI

pub mod stats;

pub use stats::{load_statistics, print_repositories, print_statistics, CrawlStatistics};
