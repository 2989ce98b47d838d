// src/error.rs

//! Unified error handling for the batch pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for batch operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed before a response was classified
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// SQLite operation failed
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A spawned task panicked or was aborted
    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// CSS selector failed to parse
    #[error("Invalid CSS selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Remote failure worth retrying (network, 5xx, 429)
    #[error("Transient fetch error for {context}: {message}")]
    TransientFetch { context: String, message: String },

    /// Remote failure that will not go away on retry (4xx, malformed page)
    #[error("Fetch error for {context}: {message}")]
    Fetch { context: String, message: String },

    /// Local storage invariant broken
    #[error("Storage error: {0}")]
    Storage(String),

    /// Row to document conversion failed
    #[error("Build error for {context}: {message}")]
    Build { context: String, message: String },

    /// Search index rejected a request
    #[error("Index error during {action}: {message}")]
    Index { action: String, message: String },

    /// Run history already left the working state
    #[error("Run history {id} is already confirmed as {status}")]
    AlreadyConfirmed { id: i64, status: String },

    /// The run was cancelled
    #[error("interrupted")]
    Interrupted,
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a selector parse error.
    pub fn selector(selector: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.into(),
        }
    }

    /// Create a retryable fetch error with context.
    pub fn transient(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::TransientFetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a non-retryable fetch error with context.
    pub fn fetch(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a document build error with context.
    pub fn build(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Build {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a search index error.
    pub fn index(action: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Index {
            action: action.into(),
            message: message.to_string(),
        }
    }

    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientFetch { .. } => true,
            Self::Http(e) => is_transient_http(e),
            _ => false,
        }
    }

    /// Whether this is the cancellation outcome rather than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }
}

/// Timeouts, connection failures, 5xx and 429 are worth another attempt.
pub fn is_transient_http(error: &reqwest::Error) -> bool {
    if error.is_timeout() || error.is_connect() {
        return true;
    }
    error.status().is_some_and(is_transient_status)
}

/// Status codes that signal a temporary remote condition.
pub fn is_transient_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AppError::transient("abc001", "503").is_transient());
        assert!(!AppError::fetch("abc001", "404").is_transient());
        assert!(!AppError::storage("disk full").is_transient());
        assert!(!AppError::Interrupted.is_transient());
    }

    #[test]
    fn test_transient_status() {
        assert!(is_transient_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(reqwest::StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_interrupted_is_distinct() {
        assert!(AppError::Interrupted.is_interrupted());
        assert!(!AppError::build("p1", "bad html").is_interrupted());
    }

    #[test]
    fn test_already_confirmed_message() {
        let err = AppError::AlreadyConfirmed {
            id: 7,
            status: "finished".into(),
        };
        assert_eq!(
            err.to_string(),
            "Run history 7 is already confirmed as finished"
        );
    }
}
