//! Crawl service
//!
//! The entry point other layers talk to. It owns the store and the shared
//! transition graph, starts crawl runs as background tasks, stops them, and
//! answers queries against the store.

use crate::config::{Config, CrawlMode};
use crate::crawler::{
    Coordinator, CrawlReport, CrawlSettings, FetchClient, Frontier, GithubFetcher, HtmlCrawler,
    HtmlReport, HtmlSettings, StopHandle, CONTRIBUTOR_PAGE_CAP, DEFAULT_LOGIN, STARRED_PAGE_CAP,
};
use crate::graph::{SharedGraph, TransitionGraph};
use crate::storage::{
    Contact, Issue, PullRequest, Repository, StorageResult, Store, StoreCounts,
};
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinSet;

/// Parameters of one `start_crawl` call; unset fields fall back to config
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CrawlRequest {
    #[serde(default)]
    pub seeds: Vec<String>,
    pub max_iterations: Option<u32>,
    pub delay_ms: Option<u64>,
    pub token: Option<String>,
    pub mode: Option<CrawlMode>,
}

/// The settings a started crawl actually runs with
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveCrawlConfig {
    pub mode: CrawlMode,
    pub seeds: Vec<String>,
    pub max_iterations: u32,
    pub delay_ms: u64,
    pub authenticated: bool,
}

/// Outcome of one background run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum RunSummary {
    Api { seeds: Vec<String>, report: CrawlReport },
    Html { seeds: Vec<String>, report: HtmlReport },
}

/// Starts, stops and queries crawls over one store
pub struct CrawlService {
    config: Config,
    store: Arc<Store>,
    graph: SharedGraph,
    runs: Mutex<JoinSet<RunSummary>>,
    stop: Mutex<StopHandle>,
}

fn recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl CrawlService {
    pub fn new(config: Config, store: Arc<Store>) -> Self {
        Self {
            config,
            store,
            graph: TransitionGraph::shared(0),
            runs: Mutex::new(JoinSet::new()),
            stop: Mutex::new(StopHandle::new()),
        }
    }

    /// Opens the store named by `config.storage.database_path`
    pub fn open(config: Config) -> crate::Result<Self> {
        let store = Store::open(Path::new(&config.storage.database_path))?;
        Ok(Self::new(config, Arc::new(store)))
    }

    /// Replaces the transition graph, e.g. with a seeded one
    pub fn with_graph(mut self, graph: SharedGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Resolves the request against configuration
    ///
    /// Without an explicit mode the configured default applies; failing that,
    /// a token selects API mode and its absence selects HTML mode.
    pub fn resolve(&self, request: &CrawlRequest) -> crate::Result<EffectiveCrawlConfig> {
        let max_iterations = request
            .max_iterations
            .unwrap_or(self.config.crawler.max_iterations);
        if max_iterations < 1 {
            return Err(ConfigError::Validation(
                "max_iterations must be >= 1".to_string(),
            )
            .into());
        }

        let authenticated = self.token_for(request).is_some();
        let mode = request
            .mode
            .or(self.config.crawler.default_mode)
            .unwrap_or(if authenticated { CrawlMode::Api } else { CrawlMode::Html });

        Ok(EffectiveCrawlConfig {
            mode,
            seeds: request
                .seeds
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            max_iterations,
            delay_ms: request.delay_ms.unwrap_or(self.config.crawler.delay_ms),
            authenticated,
        })
    }

    fn token_for(&self, request: &CrawlRequest) -> Option<String> {
        request
            .token
            .clone()
            .or_else(|| self.config.api.token.clone())
            .filter(|t| !t.trim().is_empty())
    }

    /// Starts a crawl in the background and returns immediately
    ///
    /// API mode spawns one task per seed, each with its own frontier. HTML
    /// mode spawns a single task that crawls the seeds as organizations and
    /// falls back to their user pages when an organization yields nothing.
    /// Must be called from within a Tokio runtime.
    pub fn start_crawl(&self, request: CrawlRequest) -> crate::Result<EffectiveCrawlConfig> {
        let effective = self.resolve(&request)?;
        let client = FetchClient::from_config(&self.config.api, self.token_for(&request))?;
        let delay = Duration::from_millis(effective.delay_ms);
        let fetcher = GithubFetcher::new(client.clone(), &self.config.api.base_url, delay);
        let stop = self.current_stop_handle();

        tracing::info!(
            "Starting {} crawl: {} seeds, max {} iterations, {}ms delay",
            effective.mode,
            effective.seeds.len(),
            effective.max_iterations,
            effective.delay_ms
        );

        let mut runs = recover(&self.runs);
        match effective.mode {
            CrawlMode::Api => {
                let settings = CrawlSettings {
                    delay,
                    include_starred: self.config.crawler.include_starred,
                    starred_page_cap: STARRED_PAGE_CAP,
                    contributor_page_cap: CONTRIBUTOR_PAGE_CAP,
                };
                let batches: Vec<Vec<String>> = if effective.seeds.is_empty() {
                    vec![Vec::new()]
                } else {
                    effective.seeds.iter().map(|s| vec![s.clone()]).collect()
                };

                for seeds in batches {
                    let coordinator = Coordinator::new(
                        fetcher.clone(),
                        self.store.clone(),
                        self.graph.clone(),
                        settings.clone(),
                    )
                    .with_stop_handle(stop.clone());
                    let discovery = fetcher.clone();
                    let max_iterations = effective.max_iterations;
                    let queue_cap = self.config.crawler.queue_cap;

                    runs.spawn(async move {
                        let seeds = if seeds.is_empty() {
                            discover_api_seeds(&discovery).await
                        } else {
                            seeds
                        };
                        let mut frontier = Frontier::seeded(&seeds, max_iterations, queue_cap.max(seeds.len()));
                        let report = coordinator.run(&mut frontier).await;
                        RunSummary::Api { seeds, report }
                    });
                }
            }
            CrawlMode::Html => {
                let mut settings = HtmlSettings::from_config(&self.config.html, &self.config.crawler);
                settings.max_iterations = effective.max_iterations;
                settings.delay = delay;

                let crawler = HtmlCrawler::new(client, self.store.clone(), self.graph.clone(), settings)
                    .with_search(fetcher)
                    .with_stop_handle(stop);
                let seeds = effective.seeds.clone();

                runs.spawn(async move {
                    let mut report = HtmlReport::default();
                    if seeds.is_empty() {
                        report.absorb(crawler.crawl_users(&[]).await);
                    } else {
                        report.absorb(crawler.crawl_orgs(&seeds).await);
                        let fallback = report.failed_orgs.clone();
                        if !fallback.is_empty() {
                            tracing::info!("Trying {} failed organizations as users", fallback.len());
                            report.absorb(crawler.crawl_users(&fallback).await);
                        }
                    }
                    RunSummary::Html { seeds, report }
                });
            }
        }

        Ok(effective)
    }

    /// Joins every run started so far
    pub async fn wait(&self) -> Vec<RunSummary> {
        let mut runs = std::mem::take(&mut *recover(&self.runs));
        let mut summaries = Vec::new();

        while let Some(joined) = runs.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::error!("Crawl task failed: {}", e),
            }
        }

        summaries
    }

    /// Asks every running crawl to stop at its next checkpoint
    pub fn stop(&self) {
        tracing::info!("Stopping running crawls");
        recover(&self.stop).stop();
    }

    /// The shared stop handle, replaced by a fresh one after a stop
    fn current_stop_handle(&self) -> StopHandle {
        let mut stop = recover(&self.stop);
        if stop.is_stopped() {
            *stop = StopHandle::new();
        }
        stop.clone()
    }

    pub fn get_stats(&self) -> StorageResult<StoreCounts> {
        self.store.counts()
    }

    pub fn get_repository(&self, owner: &str, name: &str) -> StorageResult<Repository> {
        self.store.get_repository(owner, name)
    }

    pub fn list_repositories(&self) -> StorageResult<Vec<Repository>> {
        self.store.list_repositories()
    }

    pub fn list_issues(&self, repo_id: &str) -> StorageResult<Vec<Issue>> {
        self.store.list_issues(repo_id)
    }

    pub fn list_pull_requests(&self, repo_id: &str) -> StorageResult<Vec<PullRequest>> {
        self.store.list_pull_requests(repo_id)
    }

    pub fn get_contact(&self, login: &str) -> StorageResult<Contact> {
        self.store.get_contact(login)
    }

    pub fn list_contacts(&self) -> StorageResult<Vec<Contact>> {
        self.store.list_contacts()
    }

    /// Deletes a repository with its issues and pull requests
    pub fn delete_repository(&self, owner: &str, name: &str) -> StorageResult<usize> {
        self.store.delete_repository(owner, name)
    }

    pub fn graph(&self) -> SharedGraph {
        self.graph.clone()
    }
}

/// Seeds for an API run that was started without any
async fn discover_api_seeds(fetcher: &GithubFetcher) -> Vec<String> {
    match fetcher.search_users(None).await {
        Ok(logins) if !logins.is_empty() => logins,
        Ok(_) => vec![DEFAULT_LOGIN.to_string()],
        Err(e) => {
            tracing::warn!("User search failed, starting from {}: {}", DEFAULT_LOGIN, e);
            vec![DEFAULT_LOGIN.to_string()]
        }
    }
}
