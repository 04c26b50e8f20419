//! Storage module for persisting the collaboration graph
//!
//! This module handles all persistence for the crawler, including:
//! - The ordered key-value engine interface and its SQLite / in-memory engines
//! - Entity models and their content hashes
//! - The content-addressed store (idempotent upsert, cascade delete, counts)

mod entity;
mod memory;
mod schema;
mod sqlite;
mod store;
mod traits;

pub use entity::{
    content_hash, is_open_license, repository_id, split_repository_id, Collection, Contact,
    Entity, Issue, PullRequest, Repository,
};
pub use memory::MemoryEngine;
pub use sqlite::SqliteEngine;
pub use store::{Store, StoreCounts};
pub use traits::{KvEngine, StorageError, StorageResult};

use std::path::Path;

/// Opens the persistent store at `path`
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Store)` - Successfully opened store
/// * `Err(StorageError)` - Failed to open the database
pub fn open_store(path: &Path) -> StorageResult<Store> {
    Store::open(path)
}
