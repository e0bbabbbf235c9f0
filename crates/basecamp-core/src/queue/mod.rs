//! Durable queue of writes issued while offline.
//!
//! Entries keep insertion order and are replayed sequentially by the sync
//! engine, so dependent writes to the same resource land in the order the
//! user issued them.

pub mod entry;
pub mod manager;

pub use entry::{QueueEntry, WriteRequest, WriteVerb};
pub use manager::MutationQueue;
