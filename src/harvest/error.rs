//! Transport error type for the harvest loop. The harvester decides whether a
//! failure is fatal (first page) or a skip (any later page); nothing here is.

use thiserror::Error;

/// Failure of a single page request: network, HTTP status, or body decode.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching page {page}: {url}")]
    HttpStatus { status: u16, url: String, page: u32 },

    #[error("Failed to decode response body for page {page}: {source}")]
    BodyDecode { page: u32, source: reqwest::Error },
}

impl TransportError {
    /// Whether a retry could plausibly succeed: timeouts, connection errors,
    /// HTTP 5xx, and HTTP 429. Client errors and malformed bodies are not
    /// retried.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network { source, .. } => source.is_timeout() || source.is_connect(),
            TransportError::HttpStatus { status, .. } => *status >= 500 || *status == 429,
            TransportError::BodyDecode { .. } => false,
        }
    }
}
