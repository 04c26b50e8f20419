//! Content-addressed store
//!
//! The store sits on top of a [`KvEngine`] and owns the storage discipline:
//! namespaced keys, hash-based idempotent upserts, cascade deletes and
//! aggregate counts.

use crate::storage::entity::{
    repository_id, Collection, Contact, Entity, Issue, PullRequest, Repository,
};
use crate::storage::memory::MemoryEngine;
use crate::storage::sqlite::SqliteEngine;
use crate::storage::traits::{KvEngine, StorageError, StorageResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Aggregate record counts per collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub repositories: u64,
    pub contacts: u64,
    pub issues: u64,
    pub pull_requests: u64,
}

/// Only the hash is needed to decide whether an upsert changes anything
#[derive(Deserialize)]
struct StoredHash {
    #[serde(default)]
    hash: String,
}

/// Content-addressed entity store
pub struct Store {
    engine: Box<dyn KvEngine>,
}

impl Store {
    pub fn new(engine: impl KvEngine + 'static) -> Self {
        Self {
            engine: Box::new(engine),
        }
    }

    /// Opens a store backed by a SQLite file
    pub fn open(path: &Path) -> StorageResult<Self> {
        Ok(Self::new(SqliteEngine::open(path)?))
    }

    /// Creates a store that lives only in memory
    pub fn in_memory() -> Self {
        Self::new(MemoryEngine::new())
    }

    /// Writes an entity unless an identical version is already stored
    ///
    /// The content hash is computed and compared with the hash of the record
    /// currently stored under the same key. When they match nothing is
    /// written and `Ok(false)` is returned. Otherwise the entity is written
    /// with its hash and a refreshed `last_seen`, and `Ok(true)` is returned.
    ///
    /// # Example
    ///
    /// ```
    /// use forge_ripple::storage::{Repository, Store};
    ///
    /// let store = Store::in_memory();
    /// let repo = Repository::new("a", "b", "u1");
    /// assert!(store.upsert(repo.clone()).unwrap());
    /// assert!(!store.upsert(repo).unwrap());
    /// ```
    pub fn upsert<E: Entity>(&self, mut entity: E) -> StorageResult<bool> {
        let key = entity.key();
        let hash = entity.compute_hash();

        if let Some(bytes) = self.engine.get(&key)? {
            match serde_json::from_slice::<StoredHash>(&bytes) {
                Ok(existing) if existing.hash == hash => return Ok(false),
                Ok(_) => {}
                Err(e) => tracing::warn!("Overwriting undecodable record {}: {}", key, e),
            }
        }

        entity.set_hash(hash);
        entity.mark_seen(Utc::now());
        let bytes = serde_json::to_vec(&entity)?;
        self.engine.set(&key, &bytes)?;
        Ok(true)
    }

    /// Reads one entity by its scoped identifier
    pub fn get<E: Entity>(&self, scoped_id: &str) -> StorageResult<E> {
        let key = E::COLLECTION.key(scoped_id);
        match self.engine.get(&key)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Err(StorageError::NotFound(key)),
        }
    }

    /// Lists entities of one collection whose scoped identifier starts with
    /// `scoped_prefix` (pass `""` for the whole collection)
    ///
    /// Records that no longer decode are skipped with a warning.
    pub fn list<E: Entity>(&self, scoped_prefix: &str) -> StorageResult<Vec<E>> {
        let prefix = E::COLLECTION.key(scoped_prefix);
        let mut items = Vec::new();
        for (key, bytes) in self.engine.scan_by_prefix(&prefix)? {
            match serde_json::from_slice(&bytes) {
                Ok(item) => items.push(item),
                Err(e) => tracing::warn!("Skipping undecodable record {}: {}", key, e),
            }
        }
        Ok(items)
    }

    /// Lists raw records under any key prefix, e.g. `"issue:a/b/"`
    pub fn list_by_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, serde_json::Value)>> {
        let mut records = Vec::new();
        for (key, bytes) in self.engine.scan_by_prefix(prefix)? {
            let value = serde_json::from_slice(&bytes)?;
            records.push((key, value));
        }
        Ok(records)
    }

    /// Counts keys under a prefix without decoding any value
    pub fn count_by_prefix(&self, prefix: &str) -> StorageResult<u64> {
        self.engine.count_by_prefix(prefix)
    }

    pub fn exists(&self, collection: Collection, scoped_id: &str) -> StorageResult<bool> {
        self.engine.exists_by_key(&collection.key(scoped_id))
    }

    pub fn delete(&self, collection: Collection, scoped_id: &str) -> StorageResult<()> {
        self.engine.delete(&collection.key(scoped_id))
    }

    /// Deletes a repository together with its issues and pull requests
    ///
    /// Dependent records are removed first, so an interrupted delete never
    /// leaves issues behind without a way to reach them by prefix.
    ///
    /// # Returns
    ///
    /// The number of dependent records removed
    pub fn delete_repository(&self, owner: &str, name: &str) -> StorageResult<usize> {
        let repo_id = repository_id(owner, name);
        let scoped_prefix = format!("{}/", repo_id);
        let mut removed = 0;

        for collection in [Collection::Issue, Collection::PullRequest] {
            for key in self.engine.keys_by_prefix(&collection.key(&scoped_prefix))? {
                self.engine.delete(&key)?;
                removed += 1;
            }
        }

        self.engine.delete(&Collection::Repository.key(&repo_id))?;
        tracing::debug!("Deleted {} with {} dependent records", repo_id, removed);
        Ok(removed)
    }

    /// Counts records in every collection
    pub fn counts(&self) -> StorageResult<StoreCounts> {
        Ok(StoreCounts {
            repositories: self.count_by_prefix(&Collection::Repository.prefix())?,
            contacts: self.count_by_prefix(&Collection::Contact.prefix())?,
            issues: self.count_by_prefix(&Collection::Issue.prefix())?,
            pull_requests: self.count_by_prefix(&Collection::PullRequest.prefix())?,
        })
    }

    // ===== Typed accessors =====

    pub fn get_repository(&self, owner: &str, name: &str) -> StorageResult<Repository> {
        self.get(&repository_id(owner, name))
    }

    pub fn list_repositories(&self) -> StorageResult<Vec<Repository>> {
        self.list("")
    }

    /// Lists the issues of one repository (`repo_id` is `"{owner}/{name}"`)
    pub fn list_issues(&self, repo_id: &str) -> StorageResult<Vec<Issue>> {
        self.list(&format!("{}/", repo_id))
    }

    pub fn list_pull_requests(&self, repo_id: &str) -> StorageResult<Vec<PullRequest>> {
        self.list(&format!("{}/", repo_id))
    }

    pub fn get_contact(&self, login: &str) -> StorageResult<Contact> {
        self.get(login)
    }

    pub fn list_contacts(&self) -> StorageResult<Vec<Contact>> {
        self.list("")
    }
}
