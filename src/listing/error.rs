//! Error types for channel listing.

use thiserror::Error;

/// Why a channel's item list could not be retrieved.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ListingError {
    /// The API key's daily quota is used up.
    #[error("listing quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// The API rejected the key or the request.
    #[error("listing request rejected (HTTP {status}): {message}")]
    Unauthorized { status: u16, message: String },

    /// No API key was configured for the lister.
    #[error("no listing API key configured")]
    MissingApiKey,

    /// No channel matches the handle.
    #[error("channel not found: {handle}")]
    ChannelNotFound { handle: String },

    /// Transport failure or server error.
    #[error("network error while listing: {message}")]
    Network { message: String },

    /// The API answered with something that could not be decoded.
    #[error("invalid listing response: {message}")]
    InvalidResponse { message: String },
}

impl ListingError {
    pub fn network(cause: impl std::fmt::Display) -> Self {
        Self::Network {
            message: cause.to_string(),
        }
    }

    pub fn invalid(cause: impl std::fmt::Display) -> Self {
        Self::InvalidResponse {
            message: cause.to_string(),
        }
    }
}
