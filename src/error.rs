//! Error types for the search pipeline.
//!
//! Only [`BackendError`] ever fails a whole request. Extraction and cache
//! errors are absorbed where they happen, and validation errors are raised
//! at the tool boundary before a request reaches the pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::types::{MAX_CRAWL_DEPTH, MAX_RESULTS_LIMIT};

/// Rejection of a malformed tool call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("search query cannot be empty or whitespace only")]
    EmptyQuery,

    #[error("search query is {0} characters long (max {max})", max = crate::types::MAX_QUERY_CHARS)]
    QueryTooLong(usize),

    #[error("max_results must be between 1 and {max}, got {0}", max = MAX_RESULTS_LIMIT)]
    MaxResultsOutOfRange(u32),

    #[error("crawl_depth must be between 1 and {max}, got {0}", max = MAX_CRAWL_DEPTH)]
    CrawlDepthOutOfRange(u32),

    #[error("invalid domain filter entry: '{0}'")]
    InvalidDomain(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Failure of the single outbound query to a search provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("search backend timed out: {0}")]
    Timeout(String),

    #[error("search backend rate limited the request: {0}")]
    RateLimited(String),

    #[error("search backend unreachable: {0}")]
    Unreachable(String),

    #[error("search backend returned a malformed response: {0}")]
    MalformedResponse(String),
}

impl BackendError {
    /// Whether another attempt has a reasonable chance of succeeding
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Timeout(_) | BackendError::Unreachable(_))
    }

    /// Map a transport-level reqwest failure onto the backend taxonomy
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(err.to_string())
        } else if err.is_decode() {
            BackendError::MalformedResponse(err.to_string())
        } else {
            BackendError::Unreachable(err.to_string())
        }
    }

    /// Map a non-success HTTP status onto the backend taxonomy
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let message = format!("HTTP {}: {}", status, snippet.trim());
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            BackendError::RateLimited(message)
        } else {
            BackendError::Unreachable(message)
        }
    }
}

/// Failure to enrich one result with page content
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("failed to fetch page: {0}")]
    FetchFailed(String),

    #[error("page fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),

    #[error("failed to extract readable content: {0}")]
    ParseFailed(String),
}

/// Cache failures never reach the caller; they degrade to a miss
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to serialize response for caching: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("cached entry is corrupted: {0}")]
    Corrupted(#[source] serde_json::Error),
}

/// Machine-readable kind of a top-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    BackendTimeout,
    BackendRateLimited,
    BackendUnreachable,
    BackendMalformedResponse,
}

impl From<&BackendError> for ErrorKind {
    fn from(err: &BackendError) -> Self {
        match err {
            BackendError::Timeout(_) => ErrorKind::BackendTimeout,
            BackendError::RateLimited(_) => ErrorKind::BackendRateLimited,
            BackendError::Unreachable(_) => ErrorKind::BackendUnreachable,
            BackendError::MalformedResponse(_) => ErrorKind::BackendMalformedResponse,
        }
    }
}

/// Machine-readable kind of a per-result extraction failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionErrorKind {
    FetchFailed,
    Timeout,
    UnsupportedContentType,
    ParseFailed,
    /// The request deadline passed before this result was enriched
    DeadlineExceeded,
}

impl From<&ExtractionError> for ExtractionErrorKind {
    fn from(err: &ExtractionError) -> Self {
        match err {
            ExtractionError::FetchFailed(_) => ExtractionErrorKind::FetchFailed,
            ExtractionError::Timeout(_) => ExtractionErrorKind::Timeout,
            ExtractionError::UnsupportedContentType(_) => {
                ExtractionErrorKind::UnsupportedContentType
            }
            ExtractionError::ParseFailed(_) => ExtractionErrorKind::ParseFailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_backend_errors() {
        assert!(BackendError::Timeout("t".into()).is_transient());
        assert!(BackendError::Unreachable("u".into()).is_transient());
        assert!(!BackendError::RateLimited("r".into()).is_transient());
        assert!(!BackendError::MalformedResponse("m".into()).is_transient());
    }

    #[test]
    fn test_status_mapping() {
        let err = BackendError::from_status(reqwest::StatusCode::TOO_MANY_REQUESTS, "slow down");
        assert!(matches!(err, BackendError::RateLimited(_)));
        assert_eq!(ErrorKind::from(&err), ErrorKind::BackendRateLimited);

        let err = BackendError::from_status(reqwest::StatusCode::BAD_GATEWAY, "");
        assert!(matches!(err, BackendError::Unreachable(ref m) if m.contains("502")));
    }

    #[test]
    fn test_error_kinds_serialize_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BackendMalformedResponse).unwrap();
        assert_eq!(json, "\"backend_malformed_response\"");
        let json = serde_json::to_string(&ExtractionErrorKind::UnsupportedContentType).unwrap();
        assert_eq!(json, "\"unsupported_content_type\"");
    }
}
