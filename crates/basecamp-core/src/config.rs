use serde::{Deserialize, Serialize};

use crate::api::client::REQUEST_TIMEOUT_SECS;
use crate::cache::store::DEFAULT_TTL_MINUTES;

/// Tunables for a [`Gateway`](crate::Gateway).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// TTL for cached reads when the caller does not pick one
    pub default_ttl_secs: u64,
    /// Upper bound on every remote call the engine makes
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: (DEFAULT_TTL_MINUTES * 60) as u64,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }
}

impl EngineConfig {
    pub fn default_ttl(&self) -> chrono::Duration {
        // chrono panics past i64::MAX milliseconds
        let secs = i64::try_from(self.default_ttl_secs)
            .unwrap_or(i64::MAX)
            .min(i64::MAX / 1000);
        chrono::Duration::seconds(secs)
    }

    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}
