//! Transport-level error types for the datasource client.

use thiserror::Error;

/// Errors that can occur while fetching or subscribing to chain data.
#[derive(Debug, Error)]
pub enum DatasourceError {
    /// HTTP request failed (connection refused, timeout, non-2xx, etc.).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connection/send/receive error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Rate limit exceeded — caller should back off.
    #[error("rate limit exceeded for datasource '{name}'")]
    RateLimited { name: String },

    /// Circuit breaker is open — datasource is unhealthy.
    #[error("circuit breaker open for datasource '{name}'")]
    CircuitOpen { name: String },

    /// Request timed out after the configured duration.
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response could not be deserialized, or had an unexpected shape.
    #[error("malformed response from datasource: {0}")]
    Malformed(String),

    /// The datasource reported a schema/response shape the client cannot
    /// reconcile with what it expects — not retryable.
    #[error("structural error from datasource '{name}': {reason}")]
    Structural { name: String, reason: String },

    #[error("{0}")]
    Other(String),
}

impl DatasourceError {
    /// Returns `true` if this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    /// Returns `true` if this error can never succeed on retry — the caller
    /// should treat the index as broken rather than keep reconnecting.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Structural { .. })
    }
}

impl From<serde_json::Error> for DatasourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_and_timeout_are_retryable() {
        assert!(DatasourceError::Http("x".into()).is_retryable());
        assert!(DatasourceError::Timeout { ms: 100 }.is_retryable());
    }

    #[test]
    fn structural_is_fatal_not_retryable() {
        let err = DatasourceError::Structural { name: "tzkt".into(), reason: "shape changed".into() };
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }
}
