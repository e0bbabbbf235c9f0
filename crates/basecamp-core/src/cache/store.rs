use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::storage::KeyValueStore;

/// Storage key namespace for cache entries, so the cache can share a store
/// with the mutation queue.
const CACHE_NAMESPACE: &str = "cache:";

/// Default time-to-live for cached reads.
pub const DEFAULT_TTL_MINUTES: i64 = 5;

/// Upper bound on any entry's lifetime, 100 years.
const MAX_TTL_DAYS: i64 = 36_500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: Value,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, data: Value, ttl: Duration) -> Self {
        let stored_at = Utc::now();
        Self {
            key: key.into(),
            data,
            stored_at,
            expires_at: stored_at
                .checked_add_signed(ttl.clamp(-Self::max_ttl(), Self::max_ttl()))
                .unwrap_or(stored_at),
        }
    }

    /// Longer lifetimes are cut to this; the expiry must stay a four-digit year
    /// so it survives the JSON round trip.
    pub fn max_ttl() -> Duration {
        Duration::days(MAX_TTL_DAYS)
    }

    /// Dead once `now >= expires_at`.
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.stored_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    /// Remaining lifetime, zero once expired.
    pub fn time_to_live(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::zero())
    }
}

pub struct CacheStore {
    storage: Arc<dyn KeyValueStore>,
    default_ttl: Duration,
    // Keeps a lazy eviction from deleting an entry a concurrent set just wrote
    lock: Mutex<()>,
}

impl CacheStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            default_ttl: Duration::minutes(DEFAULT_TTL_MINUTES),
            lock: Mutex::new(()),
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn storage_key(key: &str) -> String {
        format!("{}{}", CACHE_NAMESPACE, key)
    }

    /// Read an entry without lifetime checks; every failure is a miss.
    async fn load(&self, key: &str) -> Option<CacheEntry> {
        let contents = match self.storage.get(&Self::storage_key(key)).await {
            Ok(Some(contents)) => contents,
            Ok(None) => return None,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<CacheEntry>(&contents) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key, error = %e, "Corrupt cache entry, discarding");
                self.remove_quietly(key).await;
                None
            }
        }
    }

    async fn remove_quietly(&self, key: &str) {
        if let Err(e) = self.storage.delete(&Self::storage_key(key)).await {
            warn!(key, error = %e, "Failed to delete cache entry");
        }
    }

    /// Cached data for `key`, or `None` if absent or expired.
    pub async fn get(&self, key: &str) -> Option<Value> {
        self.get_entry(key).await.map(|entry| entry.data)
    }

    /// Like [`get`](Self::get) but returns the whole live entry.
    pub async fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let _guard = self.lock.lock().await;
        let entry = self.load(key).await?;
        if entry.is_expired() {
            debug!(key, expired_at = %entry.expires_at, "Evicting expired cache entry");
            self.remove_quietly(key).await;
            return None;
        }
        Some(entry)
    }

    /// Store `data` under `key` with the default TTL, replacing any existing entry.
    pub async fn set(&self, key: &str, data: Value) {
        self.set_with_ttl(key, data, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: &str, data: Value, ttl: Duration) {
        let entry = CacheEntry::new(key, data, ttl);
        let contents = match serde_json::to_string(&entry) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        let _guard = self.lock.lock().await;
        if let Err(e) = self.storage.set(&Self::storage_key(key), contents).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    pub async fn delete(&self, key: &str) {
        let _guard = self.lock.lock().await;
        self.remove_quietly(key).await;
    }

    /// Cache keys currently stored, live or not.
    async fn keys(&self) -> Vec<String> {
        match self.storage.list_keys().await {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(CACHE_NAMESPACE).map(String::from))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list cache keys");
                Vec::new()
            }
        }
    }

    /// Delete every key that starts with `prefix`.
    ///
    /// Matching is a plain string prefix test: `v1/participants` also removes
    /// `v1/participants/42` and `v1/participants?page=2`. Returns the number of
    /// entries removed.
    pub async fn delete_by_prefix(&self, prefix: &str) -> usize {
        let _guard = self.lock.lock().await;
        let mut removed = 0;
        for key in self.keys().await {
            if key.starts_with(prefix) {
                self.remove_quietly(&key).await;
                removed += 1;
            }
        }
        debug!(prefix, removed, "Cache prefix purge");
        removed
    }

    /// Delete every cache entry.
    pub async fn clear(&self) -> usize {
        let _guard = self.lock.lock().await;
        let keys = self.keys().await;
        for key in &keys {
            self.remove_quietly(key).await;
        }
        info!(removed = keys.len(), "Cache cleared");
        keys.len()
    }

    /// All live entries, sorted by key. Expired entries found on the way are evicted.
    pub async fn entries(&self) -> Vec<CacheEntry> {
        let _guard = self.lock.lock().await;
        let mut live = Vec::new();
        for key in self.keys().await {
            match self.load(&key).await {
                Some(entry) if entry.is_expired() => self.remove_quietly(&key).await,
                Some(entry) => live.push(entry),
                None => {}
            }
        }
        live
    }

    /// Evict every expired entry now instead of waiting for a read.
    pub async fn purge_expired(&self) -> usize {
        let _guard = self.lock.lock().await;
        let mut removed = 0;
        for key in self.keys().await {
            if let Some(entry) = self.load(&key).await {
                if entry.is_expired() {
                    self.remove_quietly(&key).await;
                    removed += 1;
                }
            }
        }
        removed
    }
}

// ============================================================================
// Tests
// ============================================================================
