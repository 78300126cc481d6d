//! Client-level error types.

use thiserror::Error;

use richscan_core::ScanError;

/// Errors that can occur while talking to the indexer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request failed before a response arrived (connection refused, reset…).
    #[error("HTTP error: {0}")]
    Http(String),

    /// The indexer answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Response body was not the JSON we expected.
    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Response parsed but carries values we cannot use.
    #[error("Invalid payload: {0}")]
    Payload(String),

    #[error("Invalid indexer URL: {0}")]
    Url(String),
}

impl ClientError {
    /// Returns `true` if this error is transient and the same request may
    /// succeed when retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => matches!(status, 408 | 413 | 429 | 500..=599),
            _ => false,
        }
    }
}

impl From<ClientError> for ScanError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Http(_) | ClientError::Status { .. } | ClientError::Timeout { .. } => {
                ScanError::Indexer(e.to_string())
            }
            ClientError::Deserialization(_) | ClientError::Payload(_) => ScanError::Malformed(e.to_string()),
            ClientError::Url(_) => ScanError::Other(e.to_string()),
        }
    }
}
