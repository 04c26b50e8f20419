//! Forge-Ripple main entry point
//!
//! This is the command-line interface for the Forge-Ripple collaboration-graph crawler.

use anyhow::{bail, Context};
use clap::Parser;
use forge_ripple::config::{load_config_with_hash, Config, CrawlMode};
use forge_ripple::output::{load_statistics, print_repositories, print_statistics};
use forge_ripple::service::{CrawlRequest, CrawlService, RunSummary};
use forge_ripple::storage::{split_repository_id, Store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Forge-Ripple: a collaboration-graph crawler
///
/// Forge-Ripple walks developers, repositories, issues and pull requests
/// breadth-first from seed identities, through the REST API or, without a
/// token, by scraping HTML pages. Results land in a content-addressed store
/// that skips unchanged records.
#[derive(Parser, Debug)]
#[command(name = "forge-ripple")]
#[command(version = "0.1.0")]
#[command(about = "A collaboration-graph crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Login (or organization in HTML mode) to start from; repeatable
    #[arg(long = "seed", value_name = "LOGIN")]
    seeds: Vec<String>,

    /// Traversal mode; defaults to api with a token and html without
    #[arg(long, value_enum)]
    mode: Option<CrawlMode>,

    /// API token, overrides the configured one
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Override the configured iteration cap
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Override the configured delay between requests (milliseconds)
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats", "list_repos", "delete_repo"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "list_repos", "delete_repo"])]
    stats: bool,

    /// List stored repositories and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats", "delete_repo"])]
    list_repos: bool,

    /// Delete a repository with its issues and pull requests, then exit
    #[arg(long, value_name = "OWNER/NAME", conflicts_with_all = ["dry_run", "stats", "list_repos"])]
    delete_repo: Option<String>,
}

impl Cli {
    fn crawl_request(&self) -> CrawlRequest {
        CrawlRequest {
            seeds: self.seeds.clone(),
            max_iterations: self.max_iterations,
            delay_ms: self.delay_ms,
            token: self.token.clone(),
            mode: self.mode,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config, &cli)
    } else if cli.stats {
        handle_stats(&config)
    } else if cli.list_repos {
        handle_list_repos(&config)
    } else if let Some(id) = &cli.delete_repo {
        handle_delete_repo(&config, id)
    } else {
        handle_crawl(config, cli.crawl_request()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("forge_ripple=info,warn"),
            1 => EnvFilter::new("forge_ripple=debug,info"),
            2 => EnvFilter::new("forge_ripple=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn open_store(config: &Config) -> anyhow::Result<Store> {
    let path = Path::new(&config.storage.database_path);
    Store::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

/// Handles the --dry-run mode: validates config and shows what would be crawled
fn handle_dry_run(config: &Config, cli: &Cli) -> anyhow::Result<()> {
    println!("=== Forge-Ripple Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max iterations: {}", config.crawler.max_iterations);
    println!("  Delay: {}ms", config.crawler.delay_ms);
    println!("  Queue cap: {}", config.crawler.queue_cap);
    println!("  Include starred: {}", config.crawler.include_starred);

    println!("\nAPI:");
    println!("  Base URL: {}", config.api.base_url);
    println!("  User agent: {}", config.api.user_agent);
    println!("  Max retries: {}", config.api.max_retries);

    println!("\nHTML:");
    println!("  Base URL: {}", config.html.base_url);
    println!("  Max pages: {}", config.html.max_pages);
    println!("  Max concurrent pages: {}", config.html.max_concurrent_pages);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    // Resolution needs no open database
    let service = CrawlService::new(config.clone(), Arc::new(Store::in_memory()));
    let effective = service.resolve(&cli.crawl_request())?;

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start a {} crawl ({}) with {} seeds, max {} iterations",
        effective.mode,
        if effective.authenticated { "authenticated" } else { "anonymous" },
        effective.seeds.len(),
        effective.max_iterations
    );
    for seed in &effective.seeds {
        println!("    * {}", seed);
    }

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let store = open_store(config)?;
    let stats = load_statistics(&store).context("Failed to load statistics")?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --list-repos mode
fn handle_list_repos(config: &Config) -> anyhow::Result<()> {
    let store = open_store(config)?;
    let repositories = store
        .list_repositories()
        .context("Failed to list repositories")?;
    print_repositories(&repositories);
    Ok(())
}

/// Handles the --delete-repo mode
fn handle_delete_repo(config: &Config, id: &str) -> anyhow::Result<()> {
    let Some((owner, name)) = split_repository_id(id) else {
        bail!(forge_ripple::ForgeError::InvalidRepositoryId(id.to_string()));
    };

    let store = open_store(config)?;
    let removed = store
        .delete_repository(owner, name)
        .with_context(|| format!("Failed to delete {}", id))?;

    println!("✓ Deleted {} and {} issues / pull requests", id, removed);
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, request: CrawlRequest) -> anyhow::Result<()> {
    let service = Arc::new(CrawlService::open(config).context("Failed to initialize crawl service")?);

    let effective = service.start_crawl(request)?;
    tracing::info!(
        "Crawl started in {} mode with {} seeds",
        effective.mode,
        effective.seeds.len()
    );

    // Ctrl-C asks the runs to stop at their next checkpoint
    let interrupt = {
        let service = service.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, finishing current work");
                service.stop();
            }
        })
    };

    let summaries = service.wait().await;
    interrupt.abort();

    for summary in &summaries {
        match summary {
            RunSummary::Api { seeds, report } => tracing::info!(
                "API run from {:?}: {} identities, {} repositories changed, {} errors",
                seeds,
                report.identities,
                report.repositories_changed,
                report.errors
            ),
            RunSummary::Html { seeds, report } => tracing::info!(
                "HTML run from {:?}: {} repositories found, {} changed, {} errors",
                seeds,
                report.repositories_found,
                report.repositories_changed,
                report.errors
            ),
        }
    }

    let counts = service.get_stats().context("Failed to count records")?;
    tracing::info!(
        "Store now holds {} repositories, {} contacts, {} issues, {} pull requests",
        counts.repositories,
        counts.contacts,
        counts.issues,
        counts.pull_requests
    );

    Ok(())
}
