//! Crawler coordinator - API-mode traversal
//!
//! This module contains the breadth-first loop that walks identities through
//! the REST API, including:
//! - Dequeuing identities from the run's frontier
//! - Fetching profiles and repositories
//! - Expanding changed repositories into issues, pull requests and contributors
//! - Recording transition edges
//! - Enqueuing newly discovered contributors

use crate::crawler::fetchers::{GithubFetcher, Paged, CONTRIBUTOR_PAGE_CAP, STARRED_PAGE_CAP};
use crate::crawler::frontier::{Frontier, StopHandle};
use crate::graph::{record_edge, SharedGraph};
use crate::storage::{Collection, Repository, Store};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Knobs for one API-mode run
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    /// Sleep after each dequeued identity
    pub delay: Duration,
    /// Also walk the identity's starred repositories
    pub include_starred: bool,
    pub starred_page_cap: u32,
    pub contributor_page_cap: u32,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(1_000),
            include_starred: false,
            starred_page_cap: STARRED_PAGE_CAP,
            contributor_page_cap: CONTRIBUTOR_PAGE_CAP,
        }
    }
}

/// What one run did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub identities: u32,
    pub repositories_seen: u32,
    pub repositories_changed: u32,
    pub issues_written: u32,
    pub pull_requests_written: u32,
    pub contacts_written: u32,
    pub errors: u32,
}

impl CrawlReport {
    pub fn absorb(&mut self, other: &CrawlReport) {
        self.identities += other.identities;
        self.repositories_seen += other.repositories_seen;
        self.repositories_changed += other.repositories_changed;
        self.issues_written += other.issues_written;
        self.pull_requests_written += other.pull_requests_written;
        self.contacts_written += other.contacts_written;
        self.errors += other.errors;
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    fetcher: GithubFetcher,
    store: Arc<Store>,
    graph: SharedGraph,
    settings: CrawlSettings,
    stop: StopHandle,
}

impl Coordinator {
    pub fn new(fetcher: GithubFetcher, store: Arc<Store>, graph: SharedGraph, settings: CrawlSettings) -> Self {
        Self {
            fetcher,
            store,
            graph,
            settings,
            stop: StopHandle::new(),
        }
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Runs the breadth-first loop until the frontier is drained, its
    /// iteration budget is spent, or a stop is requested
    ///
    /// Failures never end the run. Each one is logged, counted in the
    /// report, and the loop moves on to the next unit of work.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use forge_ripple::config::ApiConfig;
    /// use forge_ripple::crawler::{Coordinator, CrawlSettings, FetchClient, Frontier, GithubFetcher};
    /// use forge_ripple::graph::TransitionGraph;
    /// use forge_ripple::storage::Store;
    /// use std::sync::Arc;
    /// use std::time::Duration;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = ApiConfig::default();
    /// let client = FetchClient::from_config(&config, None)?;
    /// let fetcher = GithubFetcher::new(client, &config.base_url, Duration::from_secs(1));
    /// let coordinator = Coordinator::new(
    ///     fetcher,
    ///     Arc::new(Store::in_memory()),
    ///     TransitionGraph::shared(0),
    ///     CrawlSettings::default(),
    /// );
    ///
    /// let mut frontier = Frontier::seeded(["octocat"], 50, 100);
    /// let report = coordinator.run(&mut frontier).await;
    /// println!("{} repositories changed", report.repositories_changed);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&self, frontier: &mut Frontier) -> CrawlReport {
        let mut report = CrawlReport::default();
        let start_time = Instant::now();

        loop {
            if self.stop.is_stopped() {
                tracing::info!("Stop requested, ending run with {} pending", frontier.pending());
                break;
            }

            let login = match frontier.dequeue() {
                Some(login) => login,
                None => break,
            };

            tracing::info!(
                "Crawling {} ({} done, {} pending)",
                login,
                frontier.iterations() - 1,
                frontier.pending()
            );
            self.process_identity(&login, frontier, &mut report).await;
            report.identities += 1;

            let more_work = !frontier.is_empty() && !frontier.budget_spent();
            if more_work && !self.settings.delay.is_zero() {
                tokio::time::sleep(self.settings.delay).await;
            }
        }

        tracing::info!(
            "Run finished: {} identities, {} repositories changed, {} errors in {:?}",
            report.identities,
            report.repositories_changed,
            report.errors,
            start_time.elapsed()
        );

        report
    }

    async fn process_identity(&self, login: &str, frontier: &mut Frontier, report: &mut CrawlReport) {
        match self.fetcher.fetch_profile(login).await {
            Ok(contact) => match self.store.upsert(contact) {
                Ok(true) => report.contacts_written += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to store profile {}: {}", login, e);
                    report.errors += 1;
                }
            },
            Err(e) => {
                tracing::warn!("Failed to fetch profile {}: {}", login, e);
                report.errors += 1;
            }
        }

        for repo in self.repositories_of(login, report).await {
            record_edge(&self.graph, login, &repo.id);
            report.repositories_seen += 1;

            match self.store.upsert(repo.clone()) {
                Ok(true) => {
                    report.repositories_changed += 1;
                    self.expand(&repo, frontier, report).await;
                }
                Ok(false) => tracing::debug!("{} unchanged, not expanding", repo.id),
                Err(e) => {
                    tracing::warn!("Failed to store repository {}: {}", repo.id, e);
                    report.errors += 1;
                }
            }
        }
    }

    /// Owned repositories, then starred ones not already listed
    async fn repositories_of(&self, login: &str, report: &mut CrawlReport) -> Vec<Repository> {
        let owned = self.fetcher.fetch_user_repos(login, None).await;
        let mut repos = take_items(owned, &format!("repositories of {}", login), report);

        if self.settings.include_starred {
            let starred = self
                .fetcher
                .fetch_starred_repos(login, Some(self.settings.starred_page_cap))
                .await;
            let mut seen: HashSet<String> = repos.iter().map(|r| r.id.clone()).collect();
            for repo in take_items(starred, &format!("starred of {}", login), report) {
                if seen.insert(repo.id.clone()) {
                    repos.push(repo);
                }
            }
        }

        repos
    }

    /// Fetches and stores everything hanging off a changed repository
    async fn expand(&self, repo: &Repository, frontier: &mut Frontier, report: &mut CrawlReport) {
        let (owner, name) = (repo.owner.as_str(), repo.name.as_str());

        let issues = self.fetcher.fetch_issues(owner, name, None).await;
        for issue in take_items(issues, &format!("issues of {}", repo.id), report) {
            match self.store.upsert(issue) {
                Ok(true) => report.issues_written += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to store issue of {}: {}", repo.id, e);
                    report.errors += 1;
                }
            }
        }

        let pulls = self.fetcher.fetch_pull_requests(owner, name, None).await;
        for pull in take_items(pulls, &format!("pull requests of {}", repo.id), report) {
            match self.store.upsert(pull) {
                Ok(true) => report.pull_requests_written += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!("Failed to store pull request of {}: {}", repo.id, e);
                    report.errors += 1;
                }
            }
        }

        let contributors = self
            .fetcher
            .fetch_contributors(owner, name, Some(self.settings.contributor_page_cap))
            .await;
        for contributor in take_items(contributors, &format!("contributors of {}", repo.id), report) {
            let login = contributor.login.clone();
            record_edge(&self.graph, &repo.id, &login);

            // A full profile stored earlier is not replaced by the partial one
            match self.store.exists(Collection::Contact, &login) {
                Ok(true) => {}
                Ok(false) => match self.store.upsert(contributor) {
                    Ok(_) => report.contacts_written += 1,
                    Err(e) => {
                        tracing::warn!("Failed to store contributor {}: {}", login, e);
                        report.errors += 1;
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to look up contributor {}: {}", login, e);
                    report.errors += 1;
                }
            }

            if frontier.offer(&login) {
                tracing::debug!("Queued contributor {} from {}", login, repo.id);
            }
        }
    }
}

/// Unwraps a paged result, counting and logging a cut-short walk
fn take_items<T>(paged: Paged<T>, what: &str, report: &mut CrawlReport) -> Vec<T> {
    if !paged.is_complete() {
        report.errors += 1;
    }
    paged.into_items_logged(what)
}
