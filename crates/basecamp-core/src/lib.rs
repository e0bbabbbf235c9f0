//! Offline-first data-consistency engine.
//!
//! `basecamp-core` keeps a client usable while the remote service is out of
//! reach:
//! - Read responses are cached with a per-entry expiration
//! - Writes issued while offline are queued durably and acknowledged optimistically
//! - Queued writes are replayed in order once connectivity returns
//! - Successful writes purge the cache keys they make stale
//!
//! The [`Gateway`] is the single entry point callers use; everything else is
//! composed behind it and injected at construction time.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod gateway;
pub mod invalidation;
pub mod queue;
pub mod storage;
pub mod sync;

pub use api::{ApiClient, ApiError, FailureClass, Transport};
pub use auth::{AuthResolver, NoAuth, StaticBearer};
pub use cache::{CacheEntry, CacheStore};
pub use config::EngineConfig;
pub use connectivity::{Connectivity, ConnectivityMonitor, Signal, SubscriptionId};
pub use error::{EngineError, Result};
pub use gateway::{Gateway, ReadOptions, WriteOutcome};
pub use invalidation::{cache_key, InvalidationRule, KeyPattern, ResourceCategory};
pub use queue::{MutationQueue, QueueEntry, WriteRequest, WriteVerb};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use sync::{DiscardedMutation, DrainReport, SyncEngine};
