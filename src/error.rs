//! Custom error types for blogseo

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error classification exposed on failed jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// robots.txt disallows the target path
    PolicyBlocked,
    /// Retries exhausted or a terminal non-2xx status
    FetchFailed,
    /// Mandatory fields (title or body) could not be located
    ExtractionFailed,
    /// A non-mandatory resource is missing (never fails a job)
    Unavailable,
    /// Job was cancelled before reaching a terminal stage
    Cancelled,
    /// Unexpected fault
    InternalError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::PolicyBlocked => "policy_blocked",
            ErrorKind::FetchFailed => "fetch_failed",
            ErrorKind::ExtractionFailed => "extraction_failed",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "policy_blocked" => Ok(ErrorKind::PolicyBlocked),
            "fetch_failed" => Ok(ErrorKind::FetchFailed),
            "extraction_failed" => Ok(ErrorKind::ExtractionFailed),
            "unavailable" => Ok(ErrorKind::Unavailable),
            "cancelled" => Ok(ErrorKind::Cancelled),
            "internal_error" => Ok(ErrorKind::InternalError),
            _ => Err(Error::Internal(format!("Unknown error kind: {}", s))),
        }
    }
}

/// Main error type for blogseo operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Robots.txt disallowed: {0}")]
    PolicyBlocked(String),

    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// Network-level fault worth retrying (timeout, reset, connect failure)
    #[error("Transient network error: {0}")]
    Transient(String),

    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Resource unavailable: {0}")]
    Unavailable(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job cancelled: {0}")]
    Cancelled(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'blogseo init' first")]
    NotInitialized,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Map this error onto the stable job error taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PolicyBlocked(_) => ErrorKind::PolicyBlocked,
            Error::FetchFailed(_) | Error::Transient(_) | Error::Http(_) | Error::Render(_) => {
                ErrorKind::FetchFailed
            }
            Error::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
            Error::Unavailable(_) => ErrorKind::Unavailable,
            Error::Cancelled(_) => ErrorKind::Cancelled,
            _ => ErrorKind::InternalError,
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Transient(_) => true,
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Internal(format!("Task join error: {}", err))
    }
}

/// Result type alias for blogseo
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(
            Error::PolicyBlocked("x".into()).kind(),
            ErrorKind::PolicyBlocked
        );
        assert_eq!(Error::Transient("x".into()).kind(), ErrorKind::FetchFailed);
        assert_eq!(
            Error::ExtractionFailed("x".into()).kind(),
            ErrorKind::ExtractionFailed
        );
        assert_eq!(Error::Config("x".into()).kind(), ErrorKind::InternalError);
    }

    #[test]
    fn test_transient_classification() {
        assert!(Error::Transient("reset".into()).is_transient());
        assert!(!Error::FetchFailed("404".into()).is_transient());
        assert!(!Error::PolicyBlocked("/admin".into()).is_transient());
    }

    #[test]
    fn test_error_kind_string_roundtrip() {
        for kind in [
            ErrorKind::PolicyBlocked,
            ErrorKind::FetchFailed,
            ErrorKind::ExtractionFailed,
            ErrorKind::Unavailable,
            ErrorKind::Cancelled,
            ErrorKind::InternalError,
        ] {
            assert_eq!(kind.as_str().parse::<ErrorKind>().unwrap(), kind);
        }
    }
}
