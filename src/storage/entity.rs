//! Entity models persisted by the content-addressed store
//!
//! Every entity carries a content hash computed over the fields that define
//! its identity and content. Volatile bookkeeping such as `last_seen`,
//! `updated_at` or star counts never enters the hash, so two fetches of an
//! unchanged entity always produce the same digest.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// License keys considered open (matched as case-insensitive substrings)
const OPEN_LICENSES: [&str; 6] = ["mit", "apache", "gpl", "bsd", "mpl", "epl"];

/// Key namespaces of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Repository,
    Contact,
    Issue,
    PullRequest,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repository => "repo",
            Self::Contact => "contact",
            Self::Issue => "issue",
            Self::PullRequest => "pr",
        }
    }

    /// Returns the key prefix of the whole collection, e.g. `"repo:"`
    pub fn prefix(&self) -> String {
        format!("{}:", self.as_str())
    }

    /// Builds the full key `"{collection}:{scoped_id}"`
    pub fn key(&self, scoped_id: &str) -> String {
        format!("{}:{}", self.as_str(), scoped_id)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Computes a SHA-256 digest over an ordered list of fields
///
/// Each field is length-prefixed before hashing, so `("ab", "c")` and
/// `("a", "bc")` produce different digests.
///
/// # Example
///
/// ```
/// use forge_ripple::storage::content_hash;
///
/// let a = content_hash(["octo", "cat"]);
/// let b = content_hash(["octo", "cat"]);
/// assert_eq!(a, b);
/// assert_ne!(a, content_hash(["octoc", "at"]));
/// ```
pub fn content_hash<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut hasher = Sha256::new();
    for field in fields {
        let bytes = field.as_ref().as_bytes();
        hasher.update((bytes.len() as u64).to_le_bytes());
        hasher.update(bytes);
    }
    hex::encode(hasher.finalize())
}

/// Returns true when the license key names a known open license
pub fn is_open_license(license_key: &str) -> bool {
    let lower = license_key.to_lowercase();
    OPEN_LICENSES.iter().any(|known| lower.contains(known))
}

/// A record that can be stored under a namespaced, content-hashed key
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Collection this entity lives in
    const COLLECTION: Collection;

    /// Identifier within the collection, derived from natural keys
    fn scoped_id(&self) -> String;

    /// Digest over the identity and content fields
    fn compute_hash(&self) -> String;

    fn set_hash(&mut self, hash: String);

    /// Refreshes bookkeeping timestamps before a write
    fn mark_seen(&mut self, _now: DateTime<Utc>) {}

    /// Full store key
    fn key(&self) -> String {
        Self::COLLECTION.key(&self.scoped_id())
    }
}

/// A developer profile or contributor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub login: String,
    pub url: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hash: String,
}

impl Entity for Contact {
    const COLLECTION: Collection = Collection::Contact;

    fn scoped_id(&self) -> String {
        self.login.clone()
    }

    fn compute_hash(&self) -> String {
        content_hash([
            &self.login,
            &self.url,
            &self.avatar,
            &self.company,
            &self.email,
            &self.location,
            &self.bio,
        ])
    }

    fn set_hash(&mut self, hash: String) {
        self.hash = hash;
    }

    fn mark_seen(&mut self, now: DateTime<Utc>) {
        self.last_seen = Some(now);
    }
}

/// A source repository, identified by `"{owner}/{name}"`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub stars: u64,
    #[serde(default)]
    pub language: String,
    /// License key as reported upstream (e.g. `"mit"`)
    #[serde(default)]
    pub license: String,
    /// Informational only; repositories are never filtered on it
    #[serde(default)]
    pub has_open_license: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hash: String,
}

impl Repository {
    /// Creates a repository with its composite identifier filled in
    pub fn new(owner: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        let owner = owner.into();
        let name = name.into();
        Self {
            id: repository_id(&owner, &name),
            owner,
            name,
            url: url.into(),
            ..Default::default()
        }
    }

    /// Sets the license key and derives the open-license flag from it
    pub fn with_license(mut self, license: impl Into<String>) -> Self {
        self.license = license.into();
        self.has_open_license = is_open_license(&self.license);
        self
    }
}

impl Entity for Repository {
    const COLLECTION: Collection = Collection::Repository;

    fn scoped_id(&self) -> String {
        repository_id(&self.owner, &self.name)
    }

    fn compute_hash(&self) -> String {
        content_hash([
            &self.owner,
            &self.name,
            &self.url,
            &self.description,
            &self.language,
            &self.license,
        ])
    }

    fn set_hash(&mut self, hash: String) {
        self.hash = hash;
    }

    fn mark_seen(&mut self, now: DateTime<Utc>) {
        self.last_seen = Some(now);
    }
}

/// An issue, scoped to its repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Repository-scoped issue number
    pub id: String,
    pub repo_id: String,
    pub title: String,
    pub url: String,
    pub state: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hash: String,
}

impl Entity for Issue {
    const COLLECTION: Collection = Collection::Issue;

    fn scoped_id(&self) -> String {
        format!("{}/{}", self.repo_id, self.id)
    }

    fn compute_hash(&self) -> String {
        content_hash([
            &self.repo_id,
            &self.id,
            &self.url,
            &self.title,
            &self.state,
            &self.body,
            &self.author,
        ])
    }

    fn set_hash(&mut self, hash: String) {
        self.hash = hash;
    }
}

/// A pull request, scoped to its repository
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    /// Repository-scoped pull request number
    pub id: String,
    pub repo_id: String,
    pub title: String,
    pub url: String,
    pub state: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hash: String,
}

impl Entity for PullRequest {
    const COLLECTION: Collection = Collection::PullRequest;

    fn scoped_id(&self) -> String {
        format!("{}/{}", self.repo_id, self.id)
    }

    fn compute_hash(&self) -> String {
        content_hash([
            &self.repo_id,
            &self.id,
            &self.url,
            &self.title,
            &self.state,
            &self.body,
            &self.author,
        ])
    }

    fn set_hash(&mut self, hash: String) {
        self.hash = hash;
    }
}

/// Builds the composite repository identifier `"{owner}/{name}"`
pub fn repository_id(owner: &str, name: &str) -> String {
    format!("{}/{}", owner, name)
}

/// Splits `"{owner}/{name}"` back into its parts
pub fn split_repository_id(id: &str) -> Option<(&str, &str)> {
    let (owner, name) = id.split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((owner, name))
}
