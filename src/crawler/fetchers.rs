//! Paginated REST API fetchers
//!
//! Each list endpoint is walked page by page until an empty page or the page
//! cap. A failing page ends that walk; whatever was gathered before it is
//! still returned alongside the error.

use crate::crawler::fetcher::{FetchClient, FetchError};
use crate::crawler::payloads::{
    ContributorPayload, IssuePayload, PullPayload, RepoPayload, SearchUsersPayload, UserPayload,
};
use crate::storage::{repository_id, Contact, Issue, PullRequest, Repository};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Items requested per page
pub const PER_PAGE: u32 = 100;

/// Default page cap for starred repositories
pub const STARRED_PAGE_CAP: u32 = 3;

/// Default page cap for contributors
pub const CONTRIBUTOR_PAGE_CAP: u32 = 2;

const SEARCH_PER_PAGE: u32 = 30;

/// Outcome of a paginated fetch
#[derive(Debug)]
pub struct Paged<T> {
    /// Items from every page that succeeded
    pub items: Vec<T>,
    /// Number of pages successfully fetched, empty final page included
    pub pages: u32,
    /// The failure that ended paging early, if any
    pub error: Option<FetchError>,
}

impl<T> Default for Paged<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            pages: 0,
            error: None,
        }
    }
}

impl<T> Paged<T> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// Appends another walk; its error wins only if this one had none
    fn merge(&mut self, other: Paged<T>) {
        self.items.extend(other.items);
        self.pages += other.pages;
        if self.error.is_none() {
            self.error = other.error;
        }
    }

    /// Returns the items, logging the error that cut paging short
    pub fn into_items_logged(self, what: &str) -> Vec<T> {
        if let Some(e) = &self.error {
            tracing::warn!(
                "{} incomplete after {} pages ({} items kept): {}",
                what,
                self.pages,
                self.items.len(),
                e
            );
        }
        self.items
    }
}

/// Typed fetchers over the REST API
#[derive(Debug, Clone)]
pub struct GithubFetcher {
    client: FetchClient,
    base_url: String,
    page_delay: Duration,
}

impl GithubFetcher {
    /// # Arguments
    ///
    /// * `client` - Rate-limit aware HTTP client
    /// * `base_url` - API root, e.g. `https://api.github.com`
    /// * `page_delay` - Sleep between consecutive pages of one walk
    pub fn new(client: FetchClient, base_url: &str, page_delay: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            page_delay,
        }
    }

    /// Fetches one user profile as a contact
    pub async fn fetch_profile(&self, login: &str) -> Result<Contact, FetchError> {
        let url = format!("{}/users/{}", self.base_url, login);
        let user: UserPayload = self.client.fetch_json(&url).await?;
        Ok(Contact::from(user))
    }

    /// Repositories owned by `login`
    pub async fn fetch_user_repos(&self, login: &str, page_cap: Option<u32>) -> Paged<Repository> {
        let url = format!("{}/users/{}/repos", self.base_url, login);
        self.paginate(&url, page_cap, |repo: RepoPayload| Some(Repository::from(repo)))
            .await
    }

    /// Repositories starred by `login`
    pub async fn fetch_starred_repos(&self, login: &str, page_cap: Option<u32>) -> Paged<Repository> {
        let url = format!("{}/users/{}/starred", self.base_url, login);
        self.paginate(&url, page_cap, |repo: RepoPayload| Some(Repository::from(repo)))
            .await
    }

    /// Open then closed issues of a repository, pull requests excluded
    pub async fn fetch_issues(&self, owner: &str, name: &str, page_cap: Option<u32>) -> Paged<Issue> {
        let repo_id = repository_id(owner, name);
        let mut paged = Paged::default();

        for state in ["open", "closed"] {
            let url = format!(
                "{}/repos/{}/{}/issues?state={}",
                self.base_url, owner, name, state
            );
            let walk = self
                .paginate(&url, page_cap, |issue: IssuePayload| {
                    (!issue.is_pull_request()).then(|| issue.into_issue(&repo_id))
                })
                .await;
            let failed = walk.error.is_some();
            paged.merge(walk);
            if failed {
                break;
            }
        }

        paged
    }

    /// Open then closed pull requests of a repository
    pub async fn fetch_pull_requests(
        &self,
        owner: &str,
        name: &str,
        page_cap: Option<u32>,
    ) -> Paged<PullRequest> {
        let repo_id = repository_id(owner, name);
        let mut paged = Paged::default();

        for state in ["open", "closed"] {
            let url = format!(
                "{}/repos/{}/{}/pulls?state={}",
                self.base_url, owner, name, state
            );
            let walk = self
                .paginate(&url, page_cap, |pull: PullPayload| {
                    Some(pull.into_pull_request(&repo_id))
                })
                .await;
            let failed = walk.error.is_some();
            paged.merge(walk);
            if failed {
                break;
            }
        }

        paged
    }

    /// Contributors of a repository as partial contacts
    pub async fn fetch_contributors(
        &self,
        owner: &str,
        name: &str,
        page_cap: Option<u32>,
    ) -> Paged<Contact> {
        let url = format!("{}/repos/{}/{}/contributors", self.base_url, owner, name);
        self.paginate(&url, page_cap, |c: ContributorPayload| Some(Contact::from(c)))
            .await
    }

    /// Logins of well-followed users, optionally restricted to a language
    pub async fn search_users(&self, language: Option<&str>) -> Result<Vec<String>, FetchError> {
        let qualifier = language
            .filter(|lang| !lang.trim().is_empty())
            .map(|lang| format!("language:{}+", lang.trim()))
            .unwrap_or_default();
        let url = format!(
            "{}/search/users?q={}followers:>10&sort=followers&per_page={}",
            self.base_url, qualifier, SEARCH_PER_PAGE
        );
        let result: SearchUsersPayload = self.client.fetch_json(&url).await?;
        Ok(result.items.into_iter().map(|user| user.login).collect())
    }

    /// Walks `url` page by page, converting each element with `convert`
    ///
    /// Elements for which `convert` returns `None` are dropped.
    async fn paginate<P, T, F>(&self, url: &str, page_cap: Option<u32>, mut convert: F) -> Paged<T>
    where
        P: DeserializeOwned,
        F: FnMut(P) -> Option<T>,
    {
        let separator = if url.contains('?') { '&' } else { '?' };
        let mut paged = Paged::default();
        let mut page: u32 = 1;

        while page_cap.map_or(true, |cap| page <= cap) {
            if page > 1 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let page_url = format!("{}{}per_page={}&page={}", url, separator, PER_PAGE, page);
            match self.client.fetch_json::<Vec<P>>(&page_url).await {
                Ok(items) if items.is_empty() => {
                    paged.pages += 1;
                    break;
                }
                Ok(items) => {
                    tracing::debug!("Fetched page {} of {} ({} items)", page, url, items.len());
                    paged.pages += 1;
                    paged.items.extend(items.into_iter().filter_map(&mut convert));
                }
                Err(e) => {
                    paged.error = Some(e);
                    break;
                }
            }

            page += 1;
        }

        paged
    }
}
