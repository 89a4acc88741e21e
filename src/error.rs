//! Error types for content fetching and shaping.
//!
//! Every network-dependent operation returns one of these variants so that
//! callers can turn them into distinct page states (loading, not found,
//! error with retry) instead of letting failures escape.

use thiserror::Error;

/// Result alias used by the content layer.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for content operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The content API could not be reached or answered with something unusable.
    #[error("content source unavailable: {message}")]
    ContentSourceUnavailable { message: String },

    /// No document exists for the requested uid.
    #[error("post not found: {uid}")]
    NotFound { uid: String },

    /// A document does not have the shape a post needs.
    #[error("schema mismatch{}: {reason}", uid.as_deref().map(|u| format!(" in '{}'", u)).unwrap_or_default())]
    SchemaMismatch { uid: Option<String>, reason: String },

    /// A pagination cursor that cannot be followed.
    #[error("invalid cursor '{cursor}': {reason}")]
    InvalidCursor { cursor: String, reason: String },

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build a `ContentSourceUnavailable` from any displayable cause.
    pub fn unavailable(cause: impl std::fmt::Display) -> Self {
        Error::ContentSourceUnavailable {
            message: cause.to_string(),
        }
    }

    /// Whether the failure is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ContentSourceUnavailable { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Error::ContentSourceUnavailable {
                message: format!("malformed response: {}", err),
            }
        } else {
            Error::unavailable(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_mismatch_message() {
        let err = Error::SchemaMismatch {
            uid: Some("hello".to_string()),
            reason: "missing data".to_string(),
        };
        assert_eq!(err.to_string(), "schema mismatch in 'hello': missing data");

        let err = Error::SchemaMismatch {
            uid: None,
            reason: "missing uid".to_string(),
        };
        assert_eq!(err.to_string(), "schema mismatch: missing uid");
    }

    #[test]
    fn test_retryable() {
        assert!(Error::unavailable("timeout").is_retryable());
        assert!(!Error::NotFound {
            uid: "x".to_string()
        }
        .is_retryable());
    }
}
