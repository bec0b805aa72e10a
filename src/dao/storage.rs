use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not serve the request.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Human readable context.
        message: String,
        /// Backend failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A compare-and-swap write lost against a concurrent writer.
    #[error("stale write on {record}: expected revision {expected}")]
    Conflict {
        /// Record that was written.
        record: String,
        /// Revision the writer based its update on.
        expected: u64,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a conflict error for `record`.
    pub fn conflict(record: impl Into<String>, expected: u64) -> Self {
        StorageError::Conflict {
            record: record.into(),
            expected,
        }
    }

    /// Whether the error reports a lost compare-and-swap.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}
