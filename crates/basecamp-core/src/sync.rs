//! Replays queued writes against the remote service.
//!
//! A drain walks a snapshot of the queue in insertion order, one entry at a
//! time, and classifies each outcome:
//! - success: entry removed, its category's cache keys purged
//! - permanent rejection: entry removed without invalidation, published as a
//!   [`DiscardedMutation`]
//! - transient failure or timeout: entry kept for the next pass
//!
//! Only one drain runs at a time; a request that arrives while a pass is in
//! flight returns immediately with a skipped report.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::api::{ApiError, FailureClass, Transport};
use crate::auth::AuthResolver;
use crate::cache::CacheStore;
use crate::connectivity::ConnectivityMonitor;
use crate::invalidation::invalidate;
use crate::queue::{MutationQueue, QueueEntry};

/// Buffered discard notifications per subscriber before the oldest are lost.
const DISCARD_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct DrainReport {
    pub succeeded: usize,
    /// Entries that did not apply, retained or discarded
    pub failed: usize,
    /// Part of `failed` that was permanently rejected and removed
    pub discarded: usize,
    /// Another pass was already running, nothing was attempted
    pub skipped: bool,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    /// Entries left in the queue for a later pass.
    pub fn retained(&self) -> usize {
        self.failed - self.discarded
    }

    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// A queued write the server refused for good.
///
/// The caller was told "queued" long ago; this is the only place the final
/// verdict shows up.
#[derive(Debug, Clone)]
pub struct DiscardedMutation {
    pub entry: QueueEntry,
    pub reason: String,
    pub discarded_at: DateTime<Utc>,
}

pub struct SyncEngine {
    queue: Arc<MutationQueue>,
    cache: Arc<CacheStore>,
    connectivity: Arc<ConnectivityMonitor>,
    request_timeout: Duration,
    in_flight: Mutex<()>,
    discarded: broadcast::Sender<DiscardedMutation>,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<MutationQueue>,
        cache: Arc<CacheStore>,
        connectivity: Arc<ConnectivityMonitor>,
        request_timeout: Duration,
    ) -> Self {
        let (discarded, _) = broadcast::channel(DISCARD_CHANNEL_CAPACITY);
        Self {
            queue,
            cache,
            connectivity,
            request_timeout,
            in_flight: Mutex::new(()),
            discarded,
        }
    }

    pub fn subscribe_discarded(&self) -> broadcast::Receiver<DiscardedMutation> {
        self.discarded.subscribe()
    }

    pub fn is_draining(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Drain the queue through `executor`.
    ///
    /// Offline or empty queue is a no-op. Errors never escape; they are
    /// counted in the report.
    pub async fn drain<F, Fut>(&self, mut executor: F) -> DrainReport
    where
        F: FnMut(QueueEntry) -> Fut,
        Fut: Future<Output = Result<Value, ApiError>>,
    {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("Drain already in progress, skipping");
            return DrainReport::skipped();
        };

        if !self.connectivity.is_online() {
            debug!("Offline, nothing to drain");
            return DrainReport::default();
        }

        let entries = self.queue.list().await;
        if entries.is_empty() {
            return DrainReport::default();
        }

        let total = entries.len();
        info!(pending = total, "Starting queue drain");
        let mut report = DrainReport::default();
        // Endpoints with a retained entry; later writes to them must wait behind it
        let mut held: Vec<String> = Vec::new();

        for (index, entry) in entries.into_iter().enumerate() {
            if !self.connectivity.is_online() {
                info!(remaining = total - index, "Connectivity lost, stopping drain");
                break;
            }

            if held.iter().any(|blocked| same_resource(blocked, &entry.request.endpoint)) {
                debug!(entry_id = %entry.id, summary = %entry.summary(), "Earlier write to this resource is pending, holding entry");
                report.failed += 1;
                continue;
            }

            let result = match tokio::time::timeout(self.request_timeout, executor(entry.clone()))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ApiError::Timeout(self.request_timeout)),
            };

            match result {
                Ok(_) => {
                    self.complete(&entry).await;
                    report.succeeded += 1;
                }
                Err(e) if e.failure_class() == FailureClass::Transient => {
                    warn!(entry_id = %entry.id, summary = %entry.summary(), error = %e, "Transient failure, keeping entry queued");
                    held.push(entry.request.endpoint.clone());
                    report.failed += 1;
                }
                Err(e) => {
                    self.discard(entry, e).await;
                    report.failed += 1;
                    report.discarded += 1;
                }
            }
        }

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            discarded = report.discarded,
            "Queue drain finished"
        );
        report
    }

    async fn complete(&self, entry: &QueueEntry) {
        if let Err(e) = self.queue.remove(&entry.id).await {
            // Stays queued and will be sent again; last write wins at the server
            warn!(entry_id = %entry.id, error = %e, "Applied write could not be dequeued");
        }
        let purged = invalidate(&self.cache, entry.category()).await;
        debug!(entry_id = %entry.id, purged, "Queued write applied");
    }

    async fn discard(&self, entry: QueueEntry, error: ApiError) {
        warn!(
            entry_id = %entry.id,
            summary = %entry.summary(),
            error = %error,
            "Server rejected queued write, discarding"
        );
        if let Err(e) = self.queue.remove(&entry.id).await {
            warn!(entry_id = %entry.id, error = %e, "Rejected write could not be dequeued");
        }
        // No subscribers is fine; the log line above is the fallback record
        let _ = self.discarded.send(DiscardedMutation {
            entry,
            reason: error.to_string(),
            discarded_at: Utc::now(),
        });
    }

    /// Drain through `transport`, with auth headers resolved now rather than
    /// the ones captured at enqueue time.
    pub async fn sync(&self, transport: &dyn Transport, auth: &dyn AuthResolver) -> DrainReport {
        if self.is_draining() {
            return DrainReport::skipped();
        }
        let fresh = auth.headers().await;
        let fresh = &fresh;
        self.drain(move |mut entry| async move {
            entry.request.merge_headers(fresh);
            transport.execute(&entry.request).await
        })
        .await
    }
}

/// True when `endpoint` addresses `held` or something nested under it.
fn same_resource(held: &str, endpoint: &str) -> bool {
    let held = held.trim_matches('/');
    let endpoint = endpoint.trim_matches('/');
    match endpoint.strip_prefix(held) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}
