use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Neither success nor a 4xx/5xx answer, e.g. a redirect from a proxy
    #[error("Unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },
}

/// Whether resubmitting the same request later can succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network fault, timeout, or retryable server condition
    Transient,
    /// The request itself was refused; replaying it cannot succeed
    Permanent,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            code @ 400..=499 => ApiError::Rejected {
                status: code,
                body: truncated,
            },
            code => ApiError::UnexpectedStatus {
                status: code,
                body: truncated,
            },
        }
    }

    /// Classify this failure for the sync engine.
    ///
    /// 4xx responses are permanent except 401 (credentials are re-resolved on
    /// every drain, so a later attempt can succeed), 408 and 429. Statuses
    /// outside 4xx/5xx point at something between us and the service, not at
    /// the request, so they are retried.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            ApiError::Unauthorized
            | ApiError::RateLimited
            | ApiError::ServerError(_)
            | ApiError::NetworkError(_)
            | ApiError::Timeout(_)
            | ApiError::UnexpectedStatus { .. } => FailureClass::Transient,
            ApiError::Rejected { status: 408, .. } => FailureClass::Transient,
            ApiError::AccessDenied(_)
            | ApiError::NotFound(_)
            | ApiError::Rejected { .. }
            | ApiError::InvalidRequest(_) => FailureClass::Permanent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Unauthorized
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::NOT_FOUND, "gone"),
            ApiError::NotFound(body) if body == "gone"
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::UNPROCESSABLE_ENTITY, "bad"),
            ApiError::Rejected { status: 422, .. }
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, ""),
            ApiError::ServerError(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::TEMPORARY_REDIRECT, ""),
            ApiError::UnexpectedStatus { status: 307, .. }
        ));
    }

    #[test]
    fn test_failure_class_follows_http_families() {
        let transient = [
            ApiError::from_status(StatusCode::INTERNAL_SERVER_ERROR, ""),
            ApiError::from_status(StatusCode::SERVICE_UNAVAILABLE, ""),
            ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            ApiError::from_status(StatusCode::REQUEST_TIMEOUT, ""),
            ApiError::from_status(StatusCode::UNAUTHORIZED, ""),
            ApiError::Timeout(Duration::from_secs(30)),
            ApiError::from_status(StatusCode::FOUND, "<html>moved</html>"),
            ApiError::from_status(StatusCode::NOT_MODIFIED, ""),
        ];
        for err in &transient {
            assert_eq!(err.failure_class(), FailureClass::Transient, "{}", err);
        }

        let permanent = [
            ApiError::from_status(StatusCode::BAD_REQUEST, ""),
            ApiError::from_status(StatusCode::FORBIDDEN, ""),
            ApiError::from_status(StatusCode::NOT_FOUND, ""),
            ApiError::from_status(StatusCode::CONFLICT, ""),
            ApiError::InvalidRequest("bad header".to_string()),
        ];
        for err in &permanent {
            assert_eq!(err.failure_class(), FailureClass::Permanent, "{}", err);
        }
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.contains("truncated, 510 total bytes"));

        assert_eq!(ApiError::truncate_body("short"), "short");
    }
}
