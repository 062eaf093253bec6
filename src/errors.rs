use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised while retrieving a page
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("fetching {url} timed out after {}s", after.as_secs_f64())]
    Timeout { url: String, after: Duration },

    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("{url} answered with HTTP {status}")]
    NonSuccessStatus { url: String, status: u16 },
}

impl FetchError {
    /// Classification of this error for the per-page report
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::InvalidUrl { .. } => FailureKind::InvalidUrl,
            FetchError::Timeout { .. } => FailureKind::FetchTimeout,
            FetchError::Network { .. } => FailureKind::NetworkError,
            FetchError::NonSuccessStatus { .. } => FailureKind::NonSuccessStatus,
        }
    }
}

/// Why a page's check did not produce a fresh observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidUrl,
    FetchTimeout,
    NetworkError,
    NonSuccessStatus,
    /// The document could not be turned into a tree at all
    ParseFailure,
    /// The check ran but its result could not be recorded
    StorageError,
    /// The check itself crashed
    Internal,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::InvalidUrl => "invalid url",
            FailureKind::FetchTimeout => "fetch timeout",
            FailureKind::NetworkError => "network error",
            FailureKind::NonSuccessStatus => "non-success status",
            FailureKind::ParseFailure => "parse failure",
            FailureKind::StorageError => "storage error",
            FailureKind::Internal => "internal error",
        };
        f.write_str(label)
    }
}

/// Page-local failure classification handed back to callers of a check cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl CheckFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl From<&FetchError> for CheckFailure {
    fn from(error: &FetchError) -> Self {
        Self::new(error.kind(), error.to_string())
    }
}

impl From<FetchError> for CheckFailure {
    fn from(error: FetchError) -> Self {
        Self::from(&error)
    }
}

/// Errors from the storage collaborator
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("page store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("page store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("no tracked page with id {0}")]
    NotFound(Uuid),
}

/// Errors raised while loading or compiling configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("filter {filter:?} has an invalid pattern: {source}")]
    Regex {
        filter: String,
        #[source]
        source: regex::Error,
    },

    #[error("filter {filter:?} has an invalid selector {selector:?}: {message}")]
    Selector {
        filter: String,
        selector: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_kinds() {
        let invalid = FetchError::InvalidUrl {
            url: "not a url".to_string(),
            reason: "relative URL without a base".to_string(),
        };
        assert_eq!(invalid.kind(), FailureKind::InvalidUrl);

        let timeout = FetchError::Timeout {
            url: "https://example.com/".to_string(),
            after: Duration::from_secs(5),
        };
        assert_eq!(timeout.kind(), FailureKind::FetchTimeout);

        let status = FetchError::NonSuccessStatus {
            url: "https://example.com/".to_string(),
            status: 503,
        };
        assert_eq!(status.kind(), FailureKind::NonSuccessStatus);
        assert_eq!(status.to_string(), "https://example.com/ answered with HTTP 503");
    }

    #[test]
    fn test_check_failure_from_fetch_error() {
        let error = FetchError::Network {
            url: "https://example.com/".to_string(),
            message: "connection refused".to_string(),
        };
        let failure = CheckFailure::from(&error);
        assert_eq!(failure.kind, FailureKind::NetworkError);
        assert!(failure.message.contains("connection refused"));
        assert!(failure.to_string().starts_with("network error: "));
    }

    #[test]
    fn test_failure_kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::NonSuccessStatus).unwrap();
        assert_eq!(json, "\"non_success_status\"");
    }
}
