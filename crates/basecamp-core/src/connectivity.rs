//! Network reachability state.
//!
//! The monitor does not probe anything itself. A platform adapter feeds it
//! [`Signal`]s and the rest of the engine reads the last known state, either
//! synchronously or through a `watch` receiver.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Connectivity {
    Online,
    Offline,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Connectivity::Online => write!(f, "online"),
            Connectivity::Offline => write!(f, "offline"),
        }
    }
}

/// Raw reachability reading from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Online,
    Offline,
    /// Reachability could not be determined
    Unknown,
}

impl From<Signal> for Connectivity {
    fn from(signal: Signal) -> Self {
        match signal {
            Signal::Online => Connectivity::Online,
            Signal::Offline | Signal::Unknown => Connectivity::Offline,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(Connectivity) + Send + Sync>;

pub struct ConnectivityMonitor {
    state: watch::Sender<Connectivity>,
    listeners: Mutex<Vec<(SubscriptionId, Listener)>>,
    next_id: AtomicU64,
}

impl ConnectivityMonitor {
    pub fn new(initial: Connectivity) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state,
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Last known state. Never blocks on the network.
    pub fn current_state(&self) -> Connectivity {
        *self.state.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.current_state() == Connectivity::Online
    }

    /// Feed a platform reading. Returns true if the state changed.
    ///
    /// Listeners run synchronously on the reporting thread, only on changes.
    pub fn report(&self, signal: Signal) -> bool {
        let next = Connectivity::from(signal);
        let previous = self.current_state();
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });

        if changed {
            info!(from = %previous, to = %next, "Connectivity changed");
            for listener in self.snapshot_listeners() {
                listener(next);
            }
        }
        changed
    }

    fn snapshot_listeners(&self) -> Vec<Listener> {
        match self.listeners.lock() {
            Ok(listeners) => listeners.iter().map(|(_, l)| Arc::clone(l)).collect(),
            Err(e) => {
                warn!(error = %e, "Connectivity listeners lock poisoned");
                Vec::new()
            }
        }
    }

    /// Register a callback for state transitions.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(Connectivity) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push((id, Arc::new(listener))),
            Err(e) => warn!(error = %e, "Connectivity listeners lock poisoned"),
        }
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.listeners.lock() {
            Ok(mut listeners) => {
                let before = listeners.len();
                listeners.retain(|(existing, _)| *existing != id);
                listeners.len() != before
            }
            Err(_) => false,
        }
    }

    /// Async view of the state for tasks that await transitions.
    pub fn watch(&self) -> watch::Receiver<Connectivity> {
        self.state.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        // Unknown until the platform says otherwise
        Self::new(Connectivity::Offline)
    }
}
