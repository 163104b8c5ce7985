//! Error types for Shardio
//!
//! This module defines the common error types used throughout the system.

use thiserror::Error;

/// Common result type for Shardio operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for Shardio
#[derive(Debug, Error)]
pub enum Error {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Integrity errors
    #[error("content hash mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    // Permission errors
    #[error("permission denied: a processing principal is required")]
    PermissionDenied,

    // Transient guard contention: the resource was destroyed between
    // reference and acquire. Callers retry up to a bounded attempt count.
    #[error("resource concurrently destroyed, try again")]
    TryAgain,

    #[error("retry limit exhausted after {attempts} attempts")]
    RetryExhausted { attempts: usize },

    // Snapshot fetch errors
    #[error("snapshot fetch failed: {0}")]
    FetchFailed(String),

    // Fatal id-allocation tree inconsistency. Silently returning a lower
    // id would risk id reuse, so this must surface as a hard failure.
    #[error("directory inconsistency: {0}")]
    DirectoryInconsistency(String),

    #[error("file store is closed")]
    StoreClosed,

    #[error("operation not supported: {0}")]
    Unsupported(String),

    // Database / storage errors
    #[error("storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a not supported error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a snapshot fetch error
    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::FetchFailed(msg.into())
    }

    /// Check if this error is transient and worth retrying locally
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TryAgain)
    }

    /// Check if this error is unrecoverable
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DirectoryInconsistency(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_transient() {
        assert!(Error::TryAgain.is_transient());
        assert!(!Error::PermissionDenied.is_transient());
        assert!(!Error::RetryExhausted { attempts: 100 }.is_transient());
    }

    #[test]
    fn test_error_fatal() {
        assert!(Error::DirectoryInconsistency("missing leaf".into()).is_fatal());
        assert!(!Error::StoreClosed.is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = Error::ChecksumMismatch {
            expected: "ab".into(),
            actual: "cd".into(),
        };
        assert_eq!(
            err.to_string(),
            "content hash mismatch: expected ab, got cd"
        );
    }
}
