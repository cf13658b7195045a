//! Error types for fetch adapters.

use std::path::PathBuf;

use thiserror::Error;

/// Why a single item could not be fetched.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure or unexpected remote response.
    #[error("network error fetching {item_id}: {message}")]
    Network {
        /// Item being fetched.
        item_id: String,
        /// Error description.
        message: String,
    },

    /// Local filesystem failure while writing the media file.
    #[error("disk error writing {path}: {source}")]
    Disk {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The requested resolution is not offered for this item.
    #[error("resolution {} unavailable for {item_id}", .resolution.as_deref().unwrap_or("(any)"))]
    UnavailableResolution {
        item_id: String,
        resolution: Option<String>,
    },

    /// The item was deleted or made private remotely.
    #[error("{item_id} was removed or is not accessible")]
    Removed { item_id: String },

    /// The run was stopped while this fetch was in flight.
    #[error("fetch cancelled")]
    Cancelled,

    /// Anything else (adapter misconfiguration, missing tool).
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Creates a `Network` error from any displayable cause.
    pub fn network(item_id: &str, cause: impl std::fmt::Display) -> Self {
        Self::Network {
            item_id: item_id.to_string(),
            message: cause.to_string(),
        }
    }

    /// Creates a `Disk` error.
    pub fn disk(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Disk {
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
