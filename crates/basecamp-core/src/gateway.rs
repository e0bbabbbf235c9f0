//! Caller-facing entry point for reads and writes.

use std::future::Future;
use std::sync::{Arc, Weak};

use futures::stream::{self, StreamExt};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{ApiError, Transport};
use crate::auth::{AuthResolver, NoAuth};
use crate::cache::CacheStore;
use crate::config::EngineConfig;
use crate::connectivity::{Connectivity, ConnectivityMonitor, SubscriptionId};
use crate::error::{EngineError, Result};
use crate::invalidation::{cache_key, invalidate};
use crate::queue::{MutationQueue, QueueEntry, WriteRequest};
use crate::storage::KeyValueStore;
use crate::sync::{DiscardedMutation, DrainReport, SyncEngine};

/// Maximum concurrent fetches while warming the cache.
/// Keeps a large prefetch from tripping the server's rate limiter.
const MAX_CONCURRENT_PREFETCH: usize = 8;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Overrides the configured default TTL
    pub ttl: Option<chrono::Duration>,
    /// Skip the cache lookup and fetch from the remote
    pub force_refresh: bool,
}

impl ReadOptions {
    pub fn refresh() -> Self {
        Self {
            force_refresh: true,
            ..Self::default()
        }
    }

    pub fn with_ttl(ttl: chrono::Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }
}

/// What happened to a write.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// The remote accepted it
    pub applied: bool,
    /// It is waiting in the mutation queue
    pub queued: bool,
    pub queue_id: Option<String>,
    /// Remote response body, when applied
    pub response: Option<Value>,
}

impl WriteOutcome {
    fn applied(response: Value) -> Self {
        Self {
            applied: true,
            queued: false,
            queue_id: None,
            response: Some(response),
        }
    }

    fn queued(id: String) -> Self {
        Self {
            applied: false,
            queued: true,
            queue_id: Some(id),
            response: None,
        }
    }
}

pub struct Gateway {
    cache: Arc<CacheStore>,
    queue: Arc<MutationQueue>,
    connectivity: Arc<ConnectivityMonitor>,
    sync: SyncEngine,
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthResolver>,
    config: EngineConfig,
}

impl Gateway {
    /// Build an engine over `storage`. Cache and queue share the store under
    /// separate namespaces.
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        transport: Arc<dyn Transport>,
        connectivity: Arc<ConnectivityMonitor>,
        config: EngineConfig,
    ) -> Self {
        let cache = Arc::new(CacheStore::new(storage.clone()).with_default_ttl(config.default_ttl()));
        let queue = Arc::new(MutationQueue::new(storage));
        let sync = SyncEngine::new(
            queue.clone(),
            cache.clone(),
            connectivity.clone(),
            config.request_timeout(),
        );
        Self {
            cache,
            queue,
            connectivity,
            sync,
            transport,
            auth: Arc::new(NoAuth),
            config,
        }
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthResolver>) -> Self {
        self.auth = auth;
        self
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Cached read. A live entry is returned without calling `fetcher`;
    /// otherwise the fetched value is cached and returned. Fetch failures
    /// propagate and leave the cache untouched.
    pub async fn read<F, Fut>(&self, key: &str, fetcher: F, options: ReadOptions) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if !options.force_refresh {
            if let Some(data) = self.cache.get(key).await {
                debug!(key, "Cache hit");
                return Ok(data);
            }
        }

        debug!(key, force_refresh = options.force_refresh, "Fetching");
        let timeout = self.config.request_timeout();
        let data = match tokio::time::timeout(timeout, fetcher()).await {
            Ok(result) => result?,
            Err(_) => return Err(ApiError::Timeout(timeout).into()),
        };

        let ttl = options.ttl.unwrap_or_else(|| self.cache.default_ttl());
        self.cache.set_with_ttl(key, data.clone(), ttl).await;
        Ok(data)
    }

    /// Read `endpoint` through the configured transport, cached under
    /// [`cache_key`]. Auth headers are resolved only when the cache misses.
    pub async fn read_endpoint(&self, endpoint: &str, options: ReadOptions) -> Result<Value> {
        let key = cache_key(endpoint);
        let transport = Arc::clone(&self.transport);
        let auth = Arc::clone(&self.auth);
        self.read(
            &key,
            || async move {
                let headers = auth.headers().await;
                transport
                    .fetch(endpoint, &headers)
                    .await
                    .map_err(EngineError::from)
            },
            options,
        )
        .await
    }

    /// Warm the cache for `endpoints` ahead of going offline.
    ///
    /// Fetches run concurrently (bounded). Results come back in completion
    /// order, one per endpoint; a failed fetch does not stop the others.
    pub async fn prefetch(
        &self,
        endpoints: &[String],
        options: ReadOptions,
    ) -> Vec<(String, Result<Value>)> {
        stream::iter(endpoints)
            .map(|endpoint| async move {
                let result = self.read_endpoint(endpoint, options).await;
                (endpoint.clone(), result)
            })
            .buffer_unordered(MAX_CONCURRENT_PREFETCH)
            .collect()
            .await
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Apply a write now, or queue it when offline.
    ///
    /// Online failures are returned to the caller and nothing is queued.
    pub async fn write(&self, request: WriteRequest) -> Result<WriteOutcome> {
        if !self.connectivity.is_online() {
            let summary = format!("{} {}", request.method, request.endpoint);
            let id = self.queue.enqueue(request).await?;
            info!(entry_id = %id, write = %summary, "Offline, write queued");
            return Ok(WriteOutcome::queued(id));
        }

        let mut request = request;
        request.merge_headers(&self.auth.headers().await);

        let timeout = self.config.request_timeout();
        let response = match tokio::time::timeout(timeout, self.transport.execute(&request)).await {
            Ok(result) => result?,
            Err(_) => return Err(ApiError::Timeout(timeout).into()),
        };

        let purged = invalidate(&self.cache, &request.category).await;
        debug!(endpoint = %request.endpoint, category = %request.category, purged, "Write applied");
        Ok(WriteOutcome::applied(response))
    }

    pub async fn pending_count(&self) -> usize {
        self.queue.len().await
    }

    pub async fn pending(&self) -> Vec<QueueEntry> {
        self.queue.list().await
    }

    pub async fn clear_cache(&self) -> usize {
        self.cache.clear().await
    }

    /// Drop every queued write without sending it.
    pub async fn clear_queue(&self) -> Result<usize> {
        self.queue.clear().await
    }

    // ========================================================================
    // Connectivity and sync
    // ========================================================================

    pub fn on_network_change<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(Connectivity) + Send + Sync + 'static,
    {
        self.connectivity.subscribe(listener)
    }

    /// Drain the mutation queue through the configured transport.
    pub async fn sync(&self) -> DrainReport {
        self.sync
            .sync(self.transport.as_ref(), self.auth.as_ref())
            .await
    }

    pub fn subscribe_discarded(&self) -> broadcast::Receiver<DiscardedMutation> {
        self.sync.subscribe_discarded()
    }

    /// Sync whenever connectivity comes back, and once at start if already
    /// online.
    ///
    /// The task ends once the gateway is dropped and the next transition
    /// arrives, or when the handle is aborted.
    pub fn spawn_reconnect_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let gateway: Weak<Self> = Arc::downgrade(self);
        let mut state = self.connectivity.watch();

        tokio::spawn(async move {
            let mut online = *state.borrow_and_update() == Connectivity::Online;
            loop {
                if online {
                    let Some(gateway) = gateway.upgrade() else {
                        break;
                    };
                    let report = gateway.sync().await;
                    if report.attempted() > 0 {
                        info!(
                            succeeded = report.succeeded,
                            failed = report.failed,
                            discarded = report.discarded,
                            "Reconnect sync complete"
                        );
                    }
                }

                // Intermediate flaps coalesce; only the latest state matters
                if state.changed().await.is_err() {
                    break;
                }
                online = *state.borrow_and_update() == Connectivity::Online;
                if gateway.strong_count() == 0 {
                    break;
                }
            }
            debug!("Reconnect sync task stopped");
        })
    }
}
