//! Typed REST API payloads
//!
//! Only the fields the crawler keeps are declared; serde ignores the rest.
//! A missing required field surfaces as a decode error for the whole page.

use crate::storage::{Contact, Issue, PullRequest, Repository};
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AccountRef {
    pub login: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LicenseRef {
    pub key: String,
}

/// `GET /users/{login}`
#[derive(Debug, Clone, Deserialize)]
pub struct UserPayload {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl From<UserPayload> for Contact {
    fn from(user: UserPayload) -> Self {
        Contact {
            id: user.id.to_string(),
            login: user.login,
            url: user.html_url,
            avatar: user.avatar_url.unwrap_or_default(),
            company: user.company.unwrap_or_default(),
            email: user.email.unwrap_or_default(),
            location: user.location.unwrap_or_default(),
            bio: user.bio.unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// One element of `/users/{login}/repos` or `/users/{login}/starred`
#[derive(Debug, Clone, Deserialize)]
pub struct RepoPayload {
    pub name: String,
    pub owner: AccountRef,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub license: Option<LicenseRef>,
}

impl From<RepoPayload> for Repository {
    fn from(repo: RepoPayload) -> Self {
        let license = repo.license.map(|l| l.key).unwrap_or_default();
        let mut repository = Repository::new(repo.owner.login, repo.name, repo.html_url)
            .with_license(license);
        repository.description = repo.description.unwrap_or_default();
        repository.stars = repo.stargazers_count;
        repository.language = repo.language.unwrap_or_default();
        repository
    }
}

/// One element of `/repos/{owner}/{name}/issues`
///
/// The issues endpoint also lists pull requests; those carry a
/// `pull_request` object.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuePayload {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<AccountRef>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pull_request: Option<serde_json::Value>,
}

impl IssuePayload {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn into_issue(self, repo_id: &str) -> Issue {
        Issue {
            id: self.number.to_string(),
            repo_id: repo_id.to_string(),
            title: self.title,
            url: self.html_url,
            state: self.state,
            body: self.body.unwrap_or_default(),
            author: self.user.map(|u| u.login).unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            hash: String::new(),
        }
    }
}

/// One element of `/repos/{owner}/{name}/pulls`
#[derive(Debug, Clone, Deserialize)]
pub struct PullPayload {
    pub number: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub user: Option<AccountRef>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PullPayload {
    pub fn into_pull_request(self, repo_id: &str) -> PullRequest {
        PullRequest {
            id: self.number.to_string(),
            repo_id: repo_id.to_string(),
            title: self.title,
            url: self.html_url,
            state: self.state,
            body: self.body.unwrap_or_default(),
            author: self.user.map(|u| u.login).unwrap_or_default(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            hash: String::new(),
        }
    }
}

/// One element of `/repos/{owner}/{name}/contributors`
#[derive(Debug, Clone, Deserialize)]
pub struct ContributorPayload {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

impl From<ContributorPayload> for Contact {
    fn from(contributor: ContributorPayload) -> Self {
        Contact {
            id: contributor.id.to_string(),
            login: contributor.login,
            url: contributor.html_url,
            avatar: contributor.avatar_url.unwrap_or_default(),
            ..Default::default()
        }
    }
}

/// `GET /search/users`
#[derive(Debug, Clone, Deserialize)]
pub struct SearchUsersPayload {
    #[serde(default)]
    pub items: Vec<AccountRef>,
}
