use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::storage::KeyValueStore;

use super::{QueueEntry, WriteRequest};

/// Storage key holding the serialized queue
const QUEUE_KEY: &str = "mutation_queue";

pub struct MutationQueue {
    storage: Arc<dyn KeyValueStore>,
    // Serializes read-modify-write cycles on the stored list
    lock: Mutex<()>,
}

impl MutationQueue {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            storage,
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Vec<QueueEntry>> {
        match self.storage.get(QUEUE_KEY).await? {
            Some(contents) => Ok(serde_json::from_str(&contents)?),
            None => Ok(Vec::new()),
        }
    }

    async fn save(&self, entries: &[QueueEntry]) -> Result<()> {
        if entries.is_empty() {
            self.storage.delete(QUEUE_KEY).await?;
        } else {
            let contents = serde_json::to_string_pretty(entries)?;
            self.storage.set(QUEUE_KEY, contents).await?;
        }
        Ok(())
    }

    /// Append a write and persist the queue.
    ///
    /// Returns the new entry's id. A failure here means the write was NOT
    /// queued and must be reported to the caller.
    pub async fn enqueue(&self, request: WriteRequest) -> Result<String> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let entry = QueueEntry::new(request);
        let id = entry.id.clone();
        debug!(entry_id = %id, summary = %entry.summary(), "Enqueuing offline write");
        entries.push(entry);
        self.save(&entries).await?;
        info!(entry_id = %id, pending = entries.len(), "Write queued for sync");
        Ok(id)
    }

    /// All pending entries in insertion order.
    ///
    /// Read failures are logged and reported as an empty queue.
    pub async fn list(&self) -> Vec<QueueEntry> {
        let _guard = self.lock.lock().await;
        match self.load().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to read mutation queue");
                Vec::new()
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.list().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove one entry by id. Removing an unknown id is a no-op.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        let before = entries.len();
        entries.retain(|e| e.id != id);
        if entries.len() != before {
            self.save(&entries).await?;
            debug!(entry_id = id, pending = entries.len(), "Removed queue entry");
        }
        Ok(())
    }

    /// Discard every pending write. Destructive; callers confirm with the user first.
    pub async fn clear(&self) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let count = match self.load().await {
            Ok(entries) => entries.len(),
            Err(e) => {
                // Drop an unreadable queue anyway; that is what clearing is for
                warn!(error = %e, "Clearing unreadable mutation queue");
                0
            }
        };
        self.storage.delete(QUEUE_KEY).await?;
        info!(discarded = count, "Mutation queue cleared");
        Ok(count)
    }
}
