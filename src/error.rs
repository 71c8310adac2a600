//! Error types for the indexer core
//!
//! A single taxonomy is shared by the executor, the auth controller, parsers
//! and the pipeline. Variants carry owned strings so errors can be cloned into
//! per-indexer search results and cached alongside them.

use serde::Serialize;
use thiserror::Error;

use crate::indexer::types::SearchKind;

/// Convenience alias used throughout the pipeline
pub type Result<T, E = IndexerError> = std::result::Result<T, E>;

/// Kind of connectivity failure behind a [`IndexerError::Network`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkErrorKind {
    Timeout,
    Connect,
    Tls,
    Other,
}

impl std::fmt::Display for NetworkErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkErrorKind::Timeout => write!(f, "timeout"),
            NetworkErrorKind::Connect => write!(f, "connect"),
            NetworkErrorKind::Tls => write!(f, "tls"),
            NetworkErrorKind::Other => write!(f, "other"),
        }
    }
}

/// Errors produced while executing a search against an indexer
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum IndexerError {
    /// Connectivity failure (timeout, refused connection, TLS). Retried by the executor.
    #[error("Network error ({kind}): {message}")]
    Network {
        kind: NetworkErrorKind,
        message: String,
    },

    /// Non-2xx response. Only 5xx is retried.
    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    /// Login rejected or unparseable login page
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A data response indicated the session is no longer valid
    #[error("Session expired, login required")]
    SessionExpired,

    /// Malformed or unexpected response body
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// A request was dispatched before the indexer's minimum interval elapsed
    #[error(
        "Rate limit violated for {indexer}: dispatched after {elapsed_ms}ms, interval is {interval_ms}ms"
    )]
    RateLimitViolation {
        indexer: String,
        elapsed_ms: u64,
        interval_ms: u64,
    },

    /// The search was cancelled by the caller
    #[error("Search cancelled")]
    Cancelled,

    /// The adapter does not implement this kind of search
    #[error("{0} search is not supported by this indexer")]
    UnsupportedSearch(SearchKind),

    /// The adapter could not build a valid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Indexer settings are missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),
}

impl IndexerError {
    pub fn network(kind: NetworkErrorKind, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Network failures are the only errors retried with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, IndexerError::Network { .. })
    }

    /// Server-side HTTP failures get a single retry
    pub fn is_retryable_status(&self) -> bool {
        matches!(self, IndexerError::HttpStatus { status, .. } if (500..600).contains(status))
    }

    /// Errors that should be handled by the auth controller rather than reported as-is
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            IndexerError::Authentication(_) | IndexerError::SessionExpired
        )
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            NetworkErrorKind::Timeout
        } else if err.is_connect() {
            // reqwest reports TLS handshake failures as connect errors
            let text = format!("{:?}", err).to_lowercase();
            if text.contains("tls") || text.contains("certificate") {
                NetworkErrorKind::Tls
            } else {
                NetworkErrorKind::Connect
            }
        } else {
            NetworkErrorKind::Other
        };

        IndexerError::network(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(IndexerError::network(NetworkErrorKind::Timeout, "slow").is_transient());
        assert!(!IndexerError::parse("bad").is_transient());

        let server = IndexerError::HttpStatus {
            status: 503,
            url: "https://example.org".to_string(),
        };
        let client = IndexerError::HttpStatus {
            status: 404,
            url: "https://example.org".to_string(),
        };
        assert!(server.is_retryable_status());
        assert!(!client.is_retryable_status());

        assert!(IndexerError::SessionExpired.is_auth());
        assert!(IndexerError::auth("nope").is_auth());
        assert!(!server.is_auth());
    }

    #[test]
    fn test_display() {
        let err = IndexerError::HttpStatus {
            status: 500,
            url: "https://example.org/t".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 500 from https://example.org/t");
        assert_eq!(
            IndexerError::UnsupportedSearch(SearchKind::Music).to_string(),
            "music search is not supported by this indexer"
        );
    }

    #[test]
    fn test_json_shape() {
        use serde_json::json;

        assert_eq!(
            serde_json::to_value(IndexerError::auth("bad")).unwrap(),
            json!({"type": "authentication", "detail": "bad"})
        );
        assert_eq!(
            serde_json::to_value(IndexerError::network(NetworkErrorKind::Timeout, "slow")).unwrap(),
            json!({"type": "network", "detail": {"kind": "timeout", "message": "slow"}})
        );
        assert_eq!(
            serde_json::to_value(IndexerError::UnsupportedSearch(SearchKind::Book)).unwrap(),
            json!({"type": "unsupported_search", "detail": "book"})
        );
        assert_eq!(
            serde_json::to_value(IndexerError::Cancelled).unwrap(),
            json!({"type": "cancelled"})
        );
    }
}
