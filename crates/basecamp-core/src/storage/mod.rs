//! Durable key-value storage backends.
//!
//! The engine only needs per-key `get/set/delete` plus key listing, so any
//! platform store can sit behind [`KeyValueStore`]. Two backends ship here:
//! - `MemoryStore`: process-local, used by tests and ephemeral sessions
//! - `FileStore`: one JSON file per key inside a data directory

pub mod file;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error for key '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub(crate) fn io(key: &str, source: std::io::Error) -> Self {
        StorageError::Io {
            key: key.to_string(),
            source,
        }
    }
}

/// Minimal persistence contract.
///
/// Values are opaque strings; callers own their serialization. There is no
/// atomicity across keys.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn list_keys(&self) -> Result<Vec<String>, StorageError>;
}
