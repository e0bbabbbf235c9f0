//! Remote service boundary.
//!
//! The engine talks to the backend only through [`Transport`]. `ApiClient`
//! is the HTTP implementation; tests plug in their own.
//!
//! Every failure maps to an [`ApiError`], which classifies itself as
//! transient (retry on a later drain) or permanent (discard).

pub mod client;
pub mod error;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::queue::WriteRequest;

pub use client::ApiClient;
pub use error::{ApiError, FailureClass};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Read a resource, sending `headers` (auth resolved by the caller).
    async fn fetch(&self, endpoint: &str, headers: &HashMap<String, String>)
        -> Result<Value, ApiError>;

    /// Send a write with its own method, payload and headers.
    async fn execute(&self, request: &WriteRequest) -> Result<Value, ApiError>;
}
