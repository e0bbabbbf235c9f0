use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EngineError;
use crate::invalidation::ResourceCategory;

/// Length of the random suffix appended to queue entry ids
const ID_SUFFIX_LENGTH: usize = 8;

/// Transport-level write verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum WriteVerb {
    Create,
    Update,
    Delete,
}

impl WriteVerb {
    /// HTTP method this verb maps to.
    pub fn http_method(&self) -> reqwest::Method {
        match self {
            WriteVerb::Create => reqwest::Method::POST,
            WriteVerb::Update => reqwest::Method::PUT,
            WriteVerb::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for WriteVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteVerb::Create => write!(f, "CREATE"),
            WriteVerb::Update => write!(f, "UPDATE"),
            WriteVerb::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for WriteVerb {
    type Err = EngineError;

    /// Accepts verb names and their HTTP equivalents, case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" | "post" => Ok(WriteVerb::Create),
            "update" | "put" => Ok(WriteVerb::Update),
            "delete" => Ok(WriteVerb::Delete),
            _ => Err(EngineError::UnknownMethod(s.to_string())),
        }
    }
}

/// A write directed at the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRequest {
    pub category: ResourceCategory,
    pub method: WriteVerb,
    pub endpoint: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl WriteRequest {
    pub fn new(
        category: ResourceCategory,
        method: WriteVerb,
        endpoint: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            category,
            method,
            endpoint: endpoint.into(),
            payload,
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Overlay `fresh` onto the captured headers.
    ///
    /// Header names compare case-insensitively, so a freshly resolved
    /// `Authorization` replaces a captured `authorization`.
    pub fn merge_headers(&mut self, fresh: &HashMap<String, String>) {
        self.headers
            .retain(|name, _| !fresh.keys().any(|f| f.eq_ignore_ascii_case(name)));
        self.headers
            .extend(fresh.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
}

/// A write waiting in the mutation queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: String,
    /// Enqueue time; diagnostics only, never used for expiry
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub request: WriteRequest,
}

impl QueueEntry {
    pub fn new(request: WriteRequest) -> Self {
        let timestamp = Utc::now();
        Self {
            id: Self::generate_id(timestamp),
            timestamp,
            request,
        }
    }

    fn generate_id(timestamp: DateTime<Utc>) -> String {
        let suffix: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(ID_SUFFIX_LENGTH)
            .map(char::from)
            .collect();
        format!("{}-{}", timestamp.timestamp_millis(), suffix)
    }

    pub fn category(&self) -> &ResourceCategory {
        &self.request.category
    }

    /// One-line description for logs and the pending list.
    pub fn summary(&self) -> String {
        format!(
            "{} {} ({})",
            self.request.method, self.request.endpoint, self.request.category
        )
    }
}
