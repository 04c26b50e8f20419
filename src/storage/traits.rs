//! Storage traits and error types
//!
//! This module defines the ordered key-value engine interface the store is
//! built on, and the associated error types.

use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for ordered key-value engines
///
/// Keys are UTF-8 strings and are iterated in byte order. Prefix scans are
/// the only query primitive the store needs. Implementations provide per-key
/// atomicity and must be safe to share between tasks.
pub trait KvEngine: Send + Sync {
    /// Reads the value stored under `key`
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any previous value
    fn set(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes `key`; removing a missing key is not an error
    fn delete(&self, key: &str) -> StorageResult<()>;

    fn exists_by_key(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Returns every entry whose key starts with `prefix`, in key order
    fn scan_by_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Returns every key starting with `prefix` without reading values
    fn keys_by_prefix(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Counts keys starting with `prefix` without reading values
    fn count_by_prefix(&self, prefix: &str) -> StorageResult<u64>;
}
