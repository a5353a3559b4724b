//! Error types for cvmatch
//!
//! One enum per pipeline concern. Per-item failures are wrapped in
//! [`ItemError`] so the batch coordinator can record which stage failed
//! without aborting the rest of the batch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Filename could not be turned into a candidate
#[derive(Debug, Error)]
pub enum ParseError {
    /// Cleaned basename is empty
    #[error("filename is empty after cleaning")]
    EmptyFilename,

    /// Remote completion call failed
    #[error("remote parse failed: {0}")]
    Remote(#[from] CompletionError),

    /// Remote answer did not contain a usable candidate
    #[error("invalid remote response: {0}")]
    InvalidResponse(String),
}

/// Catalog search failure after partial failures were absorbed
#[derive(Debug, Error)]
pub enum SearchError {
    /// Transport failure (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Catalog envelope reported `status_code != 1`
    #[error("catalog error {code}: {message}")]
    Api { code: i64, message: String },

    /// Response body did not decode
    #[error("failed to decode catalog response: {0}")]
    Decode(String),

    /// Every search strategy failed
    #[error("all search strategies failed: {0}")]
    Exhausted(String),
}

impl SearchError {
    /// Transport errors, 5xx and 429 are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            SearchError::Network(_) => true,
            SearchError::Status { status, .. } => *status == 429 || *status >= 500,
            SearchError::Api { .. } | SearchError::Decode(_) | SearchError::Exhausted(_) => false,
        }
    }
}

/// Selection could not be completed
#[derive(Debug, Error)]
pub enum MatchError {
    /// Interactive input reached end of stream
    #[error("input closed before a selection was made")]
    InputClosed,

    #[error("prompt I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("remote selection failed: {0}")]
    Remote(#[from] CompletionError),

    #[error("invalid remote response: {0}")]
    InvalidResponse(String),

    #[error("selector failure: {0}")]
    Internal(String),
}

/// Result store failure; surfaced to the result consumer, never retried by the pipeline
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database still locked after {attempts} attempts ({elapsed_ms} ms)")]
    Locked { attempts: u32, elapsed_ms: u128 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PersistError {
    pub fn is_lock_error(&self) -> bool {
        match self {
            PersistError::Database(db_err) => db_err.to_string().contains("database is locked"),
            _ => false,
        }
    }
}

/// Completion (LLM) service failure
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Rejected credentials; never retried
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("API error (status {status}): {kind} - {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },

    #[error("no text content in response")]
    EmptyResponse,

    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl CompletionError {
    /// Transport errors, empty answers, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Network(_) | CompletionError::EmptyResponse => true,
            CompletionError::Api { status, .. } => *status == 429 || *status >= 500,
            CompletionError::Authentication(_) | CompletionError::Decode(_) => false,
        }
    }
}

/// Pipeline stage an item failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Parse,
    Search,
    Match,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::Parse => "parse",
            Stage::Search => "search",
            Stage::Match => "match",
        })
    }
}

/// Failure of one filename, tagged with its stage
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("parsing filename: {0}")]
    Parse(#[from] ParseError),

    #[error("searching catalog: {0}")]
    Search(#[from] SearchError),

    #[error("matching results: {0}")]
    Match(#[from] MatchError),
}

impl ItemError {
    pub fn stage(&self) -> Stage {
        match self {
            ItemError::Parse(_) => Stage::Parse,
            ItemError::Search(_) => Stage::Search,
            ItemError::Match(_) => Stage::Match,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_error_reports_stage_and_prefix() {
        let err = ItemError::from(ParseError::EmptyFilename);
        assert_eq!(err.stage(), Stage::Parse);
        assert_eq!(err.to_string(), "parsing filename: filename is empty after cleaning");

        let err = ItemError::from(MatchError::InputClosed);
        assert_eq!(err.stage(), Stage::Match);
        assert!(err.to_string().starts_with("matching results:"));
    }

    #[test]
    fn test_search_error_retry_classification() {
        assert!(SearchError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(SearchError::Status { status: 429, body: String::new() }.is_retryable());
        assert!(!SearchError::Status { status: 404, body: String::new() }.is_retryable());
        assert!(!SearchError::Api { code: 100, message: "Invalid API Key".into() }.is_retryable());
    }

    #[test]
    fn test_completion_auth_errors_are_final() {
        assert!(!CompletionError::Authentication("invalid x-api-key".into()).is_retryable());
        assert!(CompletionError::Api {
            status: 529,
            kind: "overloaded_error".into(),
            message: "Overloaded".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_completion_client_errors_are_final() {
        let api = |status: u16, kind: &str| CompletionError::Api {
            status,
            kind: kind.into(),
            message: String::new(),
        };
        assert!(!api(400, "invalid_request_error").is_retryable());
        assert!(!api(404, "not_found_error").is_retryable());
        assert!(api(429, "rate_limit_error").is_retryable());
        assert!(api(500, "api_error").is_retryable());
        assert!(CompletionError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_completion_api_error_format() {
        let err = CompletionError::Api {
            status: 400,
            kind: "invalid_request_error".into(),
            message: "max_tokens too large".into(),
        };
        assert_eq!(
            err.to_string(),
            "API error (status 400): invalid_request_error - max_tokens too large"
        );
    }
}
