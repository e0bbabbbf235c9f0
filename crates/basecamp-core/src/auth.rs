//! Credentials resolved at send time.
//!
//! Queued writes can sit for hours; a token captured at enqueue time may be
//! long expired by the time the queue drains. The engine asks an
//! [`AuthResolver`] for fresh headers right before each sync pass and each
//! online write, and these override any same-named captured header.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;

#[async_trait]
pub trait AuthResolver: Send + Sync {
    /// Headers to apply to outgoing writes. Empty when no credential is available.
    async fn headers(&self) -> HashMap<String, String>;
}

/// Resolver for services without authentication.
pub struct NoAuth;

#[async_trait]
impl AuthResolver for NoAuth {
    async fn headers(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Fixed bearer token.
pub struct StaticBearer {
    token: String,
}

impl StaticBearer {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// Header map carrying `Authorization: Bearer <token>`.
pub fn bearer_headers(token: &str) -> HashMap<String, String> {
    HashMap::from([(AUTHORIZATION.to_string(), format!("Bearer {}", token))])
}

#[async_trait]
impl AuthResolver for StaticBearer {
    async fn headers(&self) -> HashMap<String, String> {
        bearer_headers(&self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_bearer_headers() {
        let headers = StaticBearer::new("abc").headers().await;
        assert_eq!(headers.get("authorization").map(String::as_str), Some("Bearer abc"));
        assert!(NoAuth.headers().await.is_empty());
    }
}
