use thiserror::Error;

use crate::api::ApiError;
use crate::storage::StorageError;

/// Errors surfaced to callers of the engine.
///
/// Cache-layer failures never show up here; the cache store swallows them and
/// reports a miss instead.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Remote(#[from] ApiError),

    /// A caller-supplied fetcher failed for reasons of its own
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Unknown resource category: {0}")]
    UnknownCategory(String),

    #[error("Unknown write method: {0}")]
    UnknownMethod(String),
}

impl EngineError {
    pub fn fetch(reason: impl std::fmt::Display) -> Self {
        Self::Fetch(reason.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
