//! Statistics generation from the store
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::storage::{Repository, StorageResult, Store, StoreCounts};
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Record counts per collection
    pub counts: StoreCounts,

    /// Repositories per primary language (empty language as "unknown")
    pub repositories_by_language: HashMap<String, u64>,

    /// Repositories whose license key names an open license
    pub open_license_repositories: u64,

    /// Most-starred repositories, highest first
    pub top_starred: Vec<(String, u64)>,
}

const TOP_STARRED: usize = 10;

/// Loads statistics from the store
///
/// # Arguments
///
/// * `store` - The store to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub fn load_statistics(store: &Store) -> StorageResult<CrawlStatistics> {
    let counts = store.counts()?;
    let repositories = store.list_repositories()?;
    Ok(summarize(counts, &repositories))
}

fn summarize(counts: StoreCounts, repositories: &[Repository]) -> CrawlStatistics {
    let mut repositories_by_language = HashMap::new();
    for repo in repositories {
        let language = if repo.language.is_empty() {
            "unknown".to_string()
        } else {
            repo.language.clone()
        };
        *repositories_by_language.entry(language).or_insert(0) += 1;
    }

    let mut top_starred: Vec<(String, u64)> = repositories
        .iter()
        .filter(|r| r.stars > 0)
        .map(|r| (r.id.clone(), r.stars))
        .collect();
    top_starred.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_starred.truncate(TOP_STARRED);

    CrawlStatistics {
        counts,
        repositories_by_language,
        open_license_repositories: repositories.iter().filter(|r| r.has_open_license).count() as u64,
        top_starred,
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Repositories: {}", stats.counts.repositories);
    println!("  Contacts: {}", stats.counts.contacts);
    println!("  Issues: {}", stats.counts.issues);
    println!("  Pull requests: {}", stats.counts.pull_requests);
    println!();

    if !stats.repositories_by_language.is_empty() {
        println!("Repositories by Language:");
        // Sort languages by count (descending)
        let mut languages: Vec<_> = stats.repositories_by_language.iter().collect();
        languages.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        for (language, count) in languages {
            let percentage = if stats.counts.repositories > 0 {
                (*count as f64 / stats.counts.repositories as f64) * 100.0
            } else {
                0.0
            };
            println!("  {}: {} ({:.1}%)", language, count, percentage);
        }
        println!();
    }

    if !stats.top_starred.is_empty() {
        println!("Most Starred:");
        for (id, stars) in &stats.top_starred {
            println!("  {} ({} stars)", id, stars);
        }
        println!();
    }

    println!(
        "Open licenses: {} / {} repositories",
        stats.open_license_repositories, stats.counts.repositories
    );
}

/// Prints one line per repository
pub fn print_repositories(repositories: &[Repository]) {
    for repo in repositories {
        let language = if repo.language.is_empty() { "-" } else { repo.language.as_str() };
        println!("{}\t{}\t{}\t{}", repo.id, repo.stars, language, repo.url);
    }
    println!("\n{} repositories", repositories.len());
}
