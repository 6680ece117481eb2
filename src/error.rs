//! Error types for frequency-cap operations.
//!
//! A missing record is not an error: storage lookups return `Option` and the
//! aggregator counts `None` as zero activity.

use std::time::Duration;
use thiserror::Error;

/// Main error type for freqcap operations.
#[derive(Error, Debug)]
pub enum FreqCapError {
    /// Invalid configuration or command-line values
    #[error("Configuration error: {0}")]
    Config(String),

    /// The key-value store could not be reached
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A single storage call exceeded its deadline
    #[error("Storage operation `{operation}` timed out after {timeout:?}")]
    StorageTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Any other error reported by the store
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FreqCapError {
    /// Whether this error should abort the whole run.
    ///
    /// Bad configuration and an unreachable store are fatal, whether the
    /// connection is refused at startup or dropped mid-run. Timeouts and other
    /// per-operation failures are isolated by the loader and the benchmark
    /// harness.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FreqCapError::Config(_) | FreqCapError::StorageUnavailable(_))
    }
}

impl From<redis::RedisError> for FreqCapError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
            FreqCapError::StorageUnavailable(err.to_string())
        } else {
            FreqCapError::Storage(err.to_string())
        }
    }
}

/// Result type alias for freqcap operations.
pub type Result<T> = std::result::Result<T, FreqCapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(FreqCapError::Config("bad".into()).is_fatal());
        assert!(FreqCapError::StorageUnavailable("down".into()).is_fatal());
        assert!(!FreqCapError::Storage("wrongtype".into()).is_fatal());
        assert!(!FreqCapError::StorageTimeout {
            operation: "get_records",
            timeout: Duration::from_millis(5),
        }
        .is_fatal());
    }

    #[test]
    fn test_timeout_message() {
        let err = FreqCapError::StorageTimeout {
            operation: "put_record",
            timeout: Duration::from_millis(250),
        };
        assert_eq!(
            err.to_string(),
            "Storage operation `put_record` timed out after 250ms"
        );
    }
}
