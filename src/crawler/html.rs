//! HTML fallback traversal
//!
//! Used when no API token is available. Organization listings are fetched
//! concurrently by a bounded worker pool; user pages and the trending page
//! are walked sequentially.
//!
//! All workers of one crawler share a single [`Harvest`] behind one lock: the
//! dedup set, the global iteration counter and the store writes all happen
//! while holding it. Fetching and parsing happen outside it.

use crate::config::{CrawlerConfig, HtmlConfig};
use crate::crawler::fetcher::{FetchClient, FetchError};
use crate::crawler::fetchers::GithubFetcher;
use crate::crawler::frontier::{Frontier, StopHandle};
use crate::crawler::parser::{parse_org_repositories, parse_trending_developers, parse_user_repositories};
use crate::graph::{record_edge, SharedGraph};
use crate::storage::{Repository, Store};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Login used when no other starting point can be discovered
pub const DEFAULT_LOGIN: &str = "torvalds";

/// Knobs for one HTML-mode run
#[derive(Debug, Clone)]
pub struct HtmlSettings {
    pub base_url: String,
    pub max_pages: u32,
    pub max_concurrent_pages: usize,
    /// Repositories admitted per run, across organizations and users
    pub max_iterations: u32,
    pub delay: Duration,
    pub queue_cap: usize,
}

impl HtmlSettings {
    pub fn from_config(html: &HtmlConfig, crawler: &CrawlerConfig) -> Self {
        Self {
            base_url: html.base_url.trim_end_matches('/').to_string(),
            max_pages: html.max_pages,
            max_concurrent_pages: html.max_concurrent_pages as usize,
            max_iterations: crawler.max_iterations,
            delay: Duration::from_millis(crawler.delay_ms),
            queue_cap: crawler.queue_cap,
        }
    }
}

/// What an HTML run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HtmlReport {
    pub orgs_crawled: u32,
    /// Organizations whose every listing page failed
    pub failed_orgs: Vec<String>,
    pub users_crawled: u32,
    pub pages_fetched: u32,
    pub pages_failed: u32,
    pub repositories_found: u32,
    pub repositories_changed: u32,
    pub errors: u32,
}

impl HtmlReport {
    pub fn absorb(&mut self, other: HtmlReport) {
        self.orgs_crawled += other.orgs_crawled;
        self.failed_orgs.extend(other.failed_orgs);
        self.users_crawled += other.users_crawled;
        self.pages_fetched += other.pages_fetched;
        self.pages_failed += other.pages_failed;
        self.repositories_found += other.repositories_found;
        self.repositories_changed += other.repositories_changed;
        self.errors += other.errors;
    }
}

/// State shared by every worker of one crawler
#[derive(Debug, Default)]
struct Harvest {
    seen: HashSet<String>,
    admitted: u32,
    changed: u32,
    errors: u32,
}

/// Everything a listing-page worker needs, owned so it can be spawned
#[derive(Clone)]
struct PageContext {
    client: FetchClient,
    store: Arc<Store>,
    graph: SharedGraph,
    harvest: Arc<Mutex<Harvest>>,
    base_url: String,
    max_iterations: u32,
}

fn lock_harvest(harvest: &Mutex<Harvest>) -> MutexGuard<'_, Harvest> {
    harvest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl PageContext {
    /// Admits one repository under the harvest lock
    ///
    /// # Returns
    ///
    /// `false` once the iteration cap is reached
    fn admit(&self, harvest: &mut Harvest, source: &str, repo: Repository) -> bool {
        if harvest.admitted >= self.max_iterations {
            return false;
        }
        if !harvest.seen.insert(repo.id.clone()) {
            return true;
        }

        harvest.admitted += 1;
        record_edge(&self.graph, source, &repo.id);
        match self.store.upsert(repo) {
            Ok(true) => harvest.changed += 1,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!("Failed to store repository from {}: {}", source, e);
                harvest.errors += 1;
            }
        }
        true
    }

    fn cap_reached(&self) -> bool {
        lock_harvest(&self.harvest).admitted >= self.max_iterations
    }

    /// Fetches and harvests one listing page
    ///
    /// # Returns
    ///
    /// The number of repository links found on the page, or `None` when the
    /// iteration cap was reached before the page was requested
    async fn harvest_org_page(self, org: String, page: u32) -> Result<Option<usize>, FetchError> {
        if self.cap_reached() {
            return Ok(None);
        }

        let url = format!("{}/orgs/{}/repositories?page={}", self.base_url, org, page);
        let body = self.client.fetch_page(&url).await?;
        let links = parse_org_repositories(&body, &org, &self.base_url);

        let mut harvest = lock_harvest(&self.harvest);
        for link in &links {
            if !self.admit(&mut harvest, &org, link.to_repository(&self.base_url)) {
                break;
            }
        }
        tracing::debug!("Page {} for {}: found {} repos", page, org, links.len());
        Ok(Some(links.len()))
    }
}

/// HTML fallback traversal controller
pub struct HtmlCrawler {
    context: PageContext,
    fetcher: Option<GithubFetcher>,
    settings: HtmlSettings,
    stop: StopHandle,
}

impl HtmlCrawler {
    pub fn new(client: FetchClient, store: Arc<Store>, graph: SharedGraph, settings: HtmlSettings) -> Self {
        let context = PageContext {
            client,
            store,
            graph,
            harvest: Arc::new(Mutex::new(Harvest::default())),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_iterations: settings.max_iterations,
        };
        Self {
            context,
            fetcher: None,
            settings,
            stop: StopHandle::new(),
        }
    }

    /// Enables the API user search as a discovery fallback
    pub fn with_search(mut self, fetcher: GithubFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    fn cap_reached(&self) -> bool {
        self.context.cap_reached()
    }

    /// Crawls the repository listings of each organization in turn
    ///
    /// # Concurrency
    ///
    /// For one organization, pages `1..=max_pages` are fetched by a `JoinSet`
    /// whose size is bounded by a semaphore of `max_concurrent_pages`
    /// permits. Every worker is joined before the next organization starts.
    pub async fn crawl_orgs(&self, orgs: &[String]) -> HtmlReport {
        let mut report = HtmlReport::default();
        let before = self.snapshot();

        for (index, org) in orgs.iter().enumerate() {
            if self.stop.is_stopped() {
                tracing::info!("Stop requested, skipping remaining organizations");
                break;
            }
            if self.cap_reached() {
                tracing::info!("Reached max iterations ({})", self.settings.max_iterations);
                break;
            }

            tracing::info!("Crawling org: {}", org);
            let (fetched, failed) = self.crawl_org(org).await;
            report.pages_fetched += fetched;
            report.pages_failed += failed;

            if fetched == 0 {
                tracing::warn!("Every listing page failed for {}", org);
                report.failed_orgs.push(org.clone());
            } else {
                report.orgs_crawled += 1;
            }

            if index + 1 < orgs.len() && !self.settings.delay.is_zero() {
                tokio::time::sleep(self.settings.delay).await;
            }
        }

        self.fill_counts(&mut report, before);
        report
    }

    /// Fans one organization's listing pages out to the worker pool
    ///
    /// # Returns
    ///
    /// `(pages fetched, pages failed)`
    async fn crawl_org(&self, org: &str) -> (u32, u32) {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_pages.max(1)));
        let mut workers = JoinSet::new();

        for page in 1..=self.settings.max_pages {
            if self.cap_reached() {
                break;
            }
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            // Earlier pages may have filled the cap while this one waited
            if self.cap_reached() {
                break;
            }
            let context = self.context.clone();
            let org = org.to_string();
            workers.spawn(async move {
                let _permit = permit;
                context.harvest_org_page(org, page).await
            });
        }

        let (mut fetched, mut failed) = (0, 0);
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(Ok(Some(_))) => fetched += 1,
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    tracing::warn!("HTML fetch failed for {}: {}", org, e);
                    failed += 1;
                }
                Err(e) => {
                    tracing::error!("Page worker for {} panicked: {}", org, e);
                    failed += 1;
                }
            }
        }

        (fetched, failed)
    }

    /// Scrapes the repositories tab of each login
    ///
    /// Without seeds the starting logins come from [`Self::discover_trending`].
    /// The run sleeps once per admitted repository.
    pub async fn crawl_users(&self, seeds: &[String]) -> HtmlReport {
        let mut report = HtmlReport::default();
        let before = self.snapshot();

        let start = if seeds.is_empty() {
            self.discover_trending().await
        } else {
            seeds.to_vec()
        };
        let mut frontier = Frontier::seeded(&start, u32::MAX, self.settings.queue_cap.max(start.len()));

        'users: while let Some(login) = frontier.dequeue() {
            if self.stop.is_stopped() || self.cap_reached() {
                break;
            }

            let url = format!("{}/{}?tab=repositories", self.context.base_url, login);
            let body = match self.context.client.fetch_page(&url).await {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!("Failed to fetch repositories of {}: {}", login, e);
                    report.pages_failed += 1;
                    self.pause().await;
                    continue;
                }
            };
            report.pages_fetched += 1;
            report.users_crawled += 1;

            let repos = parse_user_repositories(&body, &self.context.base_url);
            tracing::info!("{}: {} repositories on page", login, repos.len());

            for scraped in repos {
                let admitted = {
                    let mut harvest = lock_harvest(&self.context.harvest);
                    self.context.admit(
                        &mut harvest,
                        &login,
                        scraped.to_repository(&self.context.base_url),
                    )
                };
                if !admitted {
                    tracing::info!("Reached max iterations ({})", self.settings.max_iterations);
                    break 'users;
                }
                self.pause().await;
            }
        }

        self.fill_counts(&mut report, before);
        report
    }

    /// Finds starting logins when a run has no seeds
    ///
    /// Tries the trending developers page, then the API user search, then
    /// falls back to [`DEFAULT_LOGIN`].
    pub async fn discover_trending(&self) -> Vec<String> {
        let url = format!("{}/trending/developers", self.context.base_url);
        match self.context.client.fetch_page(&url).await {
            Ok(body) => {
                let logins = parse_trending_developers(&body);
                if !logins.is_empty() {
                    tracing::info!("Discovered {} trending developers", logins.len());
                    return logins;
                }
                tracing::warn!("Trending page listed no developers");
            }
            Err(e) => tracing::warn!("Failed to fetch trending developers: {}", e),
        }

        if let Some(fetcher) = &self.fetcher {
            match fetcher.search_users(None).await {
                Ok(logins) if !logins.is_empty() => {
                    tracing::info!("Discovered {} developers via search", logins.len());
                    return logins;
                }
                Ok(_) => tracing::warn!("User search returned nothing"),
                Err(e) => tracing::warn!("User search failed: {}", e),
            }
        }

        vec![DEFAULT_LOGIN.to_string()]
    }

    async fn pause(&self) {
        if !self.settings.delay.is_zero() {
            tokio::time::sleep(self.settings.delay).await;
        }
    }

    fn snapshot(&self) -> (u32, u32, u32) {
        let harvest = lock_harvest(&self.context.harvest);
        (harvest.admitted, harvest.changed, harvest.errors)
    }

    /// Copies harvest deltas since `before` into the report
    fn fill_counts(&self, report: &mut HtmlReport, before: (u32, u32, u32)) {
        let (admitted, changed, errors) = self.snapshot();
        report.repositories_found = admitted - before.0;
        report.repositories_changed = changed - before.1;
        report.errors += errors - before.2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiConfig;
    use crate::crawler::fetcher::{build_http_client, RetryPolicy};
    use crate::graph::TransitionGraph;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> FetchClient {
        FetchClient::new(
            build_http_client(&ApiConfig::default()).unwrap(),
            None,
            RetryPolicy {
                max_retries: 1,
                initial_backoff: Duration::from_millis(1),
            },
        )
    }

    fn crawler(server: &MockServer, store: Arc<Store>, max_pages: u32, max_iterations: u32) -> HtmlCrawler {
        let settings = HtmlSettings {
            base_url: server.uri(),
            max_pages,
            max_concurrent_pages: 4,
            max_iterations,
            delay: Duration::ZERO,
            queue_cap: 100,
        };
        HtmlCrawler::new(client(), store, TransitionGraph::shared(9), settings)
    }

    fn listing(links: &[&str]) -> String {
        let items: String = links
            .iter()
            .map(|href| format!(r#"<a data-hovercard-type="repository" href="{}">r</a>"#, href))
            .collect();
        format!("<html><body>{}</body></html>", items)
    }

    async fn mount_listing(server: &MockServer, org: &str, page: u32, links: &[&str]) {
        Mock::given(method("GET"))
            .and(path(format!("/orgs/{}/repositories", org)))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(links)))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_crawl_orgs_deduplicates_across_pages() {
        let server = MockServer::start().await;
        mount_listing(&server, "acme", 1, &["/acme/a", "/acme/b"]).await;
        mount_listing(&server, "acme", 2, &["/acme/b", "/acme/c"]).await;
        mount_listing(&server, "acme", 3, &[]).await;

        let store = Arc::new(Store::in_memory());
        let report = crawler(&server, store.clone(), 3, 100)
            .crawl_orgs(&["acme".to_string()])
            .await;

        assert_eq!(report.orgs_crawled, 1);
        assert_eq!(report.pages_fetched, 3);
        assert_eq!(report.repositories_found, 3);
        assert_eq!(report.repositories_changed, 3);
        assert_eq!(store.counts().unwrap().repositories, 3);
    }

    #[tokio::test]
    async fn test_crawl_orgs_respects_iteration_cap() {
        let server = MockServer::start().await;
        mount_listing(&server, "acme", 1, &["/acme/a", "/acme/b", "/acme/c", "/acme/d"]).await;

        let store = Arc::new(Store::in_memory());
        let report = crawler(&server, store.clone(), 1, 2)
            .crawl_orgs(&["acme".to_string(), "other".to_string()])
            .await;

        assert_eq!(report.repositories_found, 2);
        assert_eq!(store.counts().unwrap().repositories, 2);
    }

    #[tokio::test]
    async fn test_crawl_orgs_stops_paging_at_iteration_cap() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orgs/acme/repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_string(listing(&["/acme/a", "/acme/b"])))
            .mount(&server)
            .await;

        let settings = HtmlSettings {
            base_url: server.uri(),
            max_pages: 20,
            max_concurrent_pages: 1,
            max_iterations: 1,
            delay: Duration::ZERO,
            queue_cap: 100,
        };
        let html = HtmlCrawler::new(client(), Arc::new(Store::in_memory()), TransitionGraph::shared(9), settings);
        let report = html.crawl_orgs(&["acme".to_string()]).await;

        assert_eq!(report.repositories_found, 1);
        assert_eq!(report.pages_fetched, 1);
        assert_eq!(report.orgs_crawled, 1);
        let requests = server.received_requests().await.unwrap_or_default();
        assert_eq!(requests.len(), 1);
    }

    #[tokio::test]
    async fn test_org_with_every_page_failing_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let report = crawler(&server, Arc::new(Store::in_memory()), 2, 100)
            .crawl_orgs(&["ghost".to_string()])
            .await;

        assert_eq!(report.failed_orgs, vec!["ghost".to_string()]);
        assert_eq!(report.pages_failed, 2);
        assert_eq!(report.orgs_crawled, 0);
    }

    #[tokio::test]
    async fn test_crawl_users_scrapes_repository_tab() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/octo"))
            .and(query_param("tab", "repositories"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<ul>
                    <li><a itemprop="name codeRepository" href="/octo/one">one</a>
                        <span itemprop="programmingLanguage">Go</span></li>
                    <li><a itemprop="name codeRepository" href="/octo/two">two</a></li>
                </ul>"#,
            ))
            .mount(&server)
            .await;

        let store = Arc::new(Store::in_memory());
        let html = crawler(&server, store.clone(), 1, 100);
        let report = html.crawl_users(&["octo".to_string()]).await;

        assert_eq!(report.users_crawled, 1);
        assert_eq!(report.repositories_found, 2);
        assert_eq!(store.get_repository("octo", "one").unwrap().language, "Go");

        let graph = html.context.graph.lock().unwrap();
        assert_eq!(graph.transitions("octo"), ["octo/one", "octo/two"]);
    }

    #[tokio::test]
    async fn test_discover_trending_from_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/trending/developers"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<article><h1 class="h3"><a href="/zed">Zed</a></h1></article>"#,
            ))
            .mount(&server)
            .await;

        let logins = crawler(&server, Arc::new(Store::in_memory()), 1, 10)
            .discover_trending()
            .await;
        assert_eq!(logins, vec!["zed"]);
    }

    #[tokio::test]
    async fn test_discover_trending_falls_back_to_default_login() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let logins = crawler(&server, Arc::new(Store::in_memory()), 1, 10)
            .discover_trending()
            .await;
        assert_eq!(logins, vec![DEFAULT_LOGIN]);
    }
}
