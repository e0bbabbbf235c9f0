//! HTTP client for the remote REST service.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use crate::queue::{WriteRequest, WriteVerb};

use super::{ApiError, Transport};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// API client for the remote service.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
///
/// Holds no credentials; callers pass resolved auth headers with every request.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn write_builder(&self, request: &WriteRequest) -> Result<RequestBuilder, ApiError> {
        let mut builder = self
            .client
            .request(request.method.http_method(), self.url(&request.endpoint))
            .headers(Self::header_map(&request.headers)?);
        if request.method != WriteVerb::Delete || !request.payload.is_null() {
            builder = builder.json(&request.payload);
        }
        Ok(builder)
    }

    fn read_builder(
        &self,
        endpoint: &str,
        headers: &HashMap<String, String>,
    ) -> Result<RequestBuilder, ApiError> {
        Ok(self
            .client
            .get(self.url(endpoint))
            .headers(Self::header_map(headers)?))
    }

    fn header_map(headers: &HashMap<String, String>) -> Result<header::HeaderMap, ApiError> {
        let mut map = header::HeaderMap::new();
        for (name, value) in headers {
            let name = header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::InvalidRequest(format!("header name {:?}: {}", name, e)))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| ApiError::InvalidRequest(format!("header {}: {}", name, e)))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    /// Send a request, backing off and retrying while the server answers 429.
    async fn send_with_retry<F>(&self, url: &str, build: F) -> Result<Value, ApiError>
    where
        F: Fn() -> Result<RequestBuilder, ApiError>,
    {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = build()?.send().await?;
            let status = response.status();

            if status.is_success() {
                return Self::read_body(response).await;
            }

            if status.as_u16() == 429 {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body));
        }
    }

    /// Decode a success body. Empty bodies (204, DELETE) become `null` and
    /// non-JSON bodies are kept as a string rather than failing a write the
    /// server already applied.
    async fn read_body(response: reqwest::Response) -> Result<Value, ApiError> {
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        match serde_json::from_str(&text) {
            Ok(value) => Ok(value),
            Err(e) => {
                debug!(error = %e, "Response body is not JSON");
                Ok(Value::String(text))
            }
        }
    }
}

#[async_trait]
impl Transport for ApiClient {
    async fn fetch(
        &self,
        endpoint: &str,
        headers: &HashMap<String, String>,
    ) -> Result<Value, ApiError> {
        let url = self.url(endpoint);
        debug!(url = %url, "GET");
        self.send_with_retry(&url, || self.read_builder(endpoint, headers))
            .await
    }

    async fn execute(&self, request: &WriteRequest) -> Result<Value, ApiError> {
        let url = self.url(&request.endpoint);
        debug!(method = %request.method, url = %url, "Sending write");
        self.send_with_retry(&url, || self.write_builder(request)).await
    }
}
