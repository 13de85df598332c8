//! Error types for rackscan.
//!
//! Library crates use [`RackscanError`] via `thiserror`.
//! The `rackscan` binary wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all rackscan operations.
#[derive(Debug, thiserror::Error)]
pub enum RackscanError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Browser session or WebDriver protocol error.
    #[error("browser error: {0}")]
    Browser(String),

    /// A page could not be loaded.
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// A bounded wait expired.
    #[error("timed out after {after_ms} ms waiting for {what}")]
    Timeout { what: String, after_ms: u64 },

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// CSV read/write error.
    #[error("table error: {0}")]
    Table(String),

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (schema mismatch, invalid format, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RackscanError>;

impl RackscanError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a timeout error for a wait on `what` bounded by `after_ms`.
    pub fn timeout(what: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            after_ms,
        }
    }

    /// Create a navigation error for `url`.
    pub fn navigation(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Whether this error is a bounded wait expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = RackscanError::config("missing webdriver url");
        assert_eq!(err.to_string(), "config error: missing webdriver url");

        let err = RackscanError::timeout("#product-size-picker input", 10_000);
        assert_eq!(
            err.to_string(),
            "timed out after 10000 ms waiting for #product-size-picker input"
        );

        let err = RackscanError::navigation("https://example.com/p", "net::ERR_ABORTED");
        assert!(err.to_string().contains("https://example.com/p"));
    }

    #[test]
    fn timeout_classification() {
        assert!(RackscanError::timeout("selector", 5).is_timeout());
        assert!(!RackscanError::Browser("session gone".into()).is_timeout());
    }
}
