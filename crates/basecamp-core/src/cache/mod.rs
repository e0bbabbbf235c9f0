//! Local caching of read responses.
//!
//! This module provides the `CacheStore` for storing and retrieving remote
//! read results. Each entry carries its own expiry (5 minutes unless the
//! caller picks another TTL); a dead entry is never returned and is removed
//! the first time a read finds it.
//!
//! Cache failures are never fatal: unreadable or corrupt entries are reported
//! as misses so the caller simply refetches.

pub mod store;

pub use store::{CacheEntry, CacheStore};
