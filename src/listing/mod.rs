//! Channel listing: turns a channel handle into its ordered item list.

mod error;
mod youtube;

pub use error::ListingError;
pub use youtube::{ChannelRef, YouTubeLister};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::store::ItemId;

/// One entry of a remote channel listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListedItem {
    pub id: ItemId,
    pub title: String,
    pub published_at: Option<DateTime<Utc>>,
}

impl ListedItem {
    #[must_use]
    pub fn new(id: impl Into<ItemId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            published_at: None,
        }
    }
}

/// Source of a channel's item list.
#[async_trait]
pub trait ChannelLister: Send + Sync {
    /// Returns every item of `channel_handle` in listing order.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError`]; callers surface it without retrying.
    async fn list_items(&self, channel_handle: &str) -> Result<Vec<ListedItem>, ListingError>;
}
