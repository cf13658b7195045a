//! Error types for metadata store operations.

use thiserror::Error;

/// Errors that can occur while loading or persisting channel records.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored record could not be decoded.
    #[error("corrupt record for channel '{channel}': {reason}")]
    CorruptRecord {
        /// Channel whose record is unreadable.
        channel: String,
        /// What could not be decoded.
        reason: String,
    },
}

impl StoreError {
    /// Creates a `CorruptRecord` error.
    #[must_use]
    pub fn corrupt(channel: &str, reason: impl Into<String>) -> Self {
        Self::CorruptRecord {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }
}
