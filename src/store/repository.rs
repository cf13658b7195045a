//! Repository seam for per-item persistence.
//!
//! The scheduler only needs to write single items back. Depending on this
//! trait instead of [`Store`] lets the session layer observe every write and
//! lets tests inject failing stores.

use async_trait::async_trait;

use super::{Item, Result, Store};

/// Write contract used by the worker pool.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Merges one item's new state into the durable record of `channel`.
    async fn upsert_item(&self, channel: &str, item: &Item) -> Result<()>;
}

#[async_trait]
impl ItemRepository for Store {
    async fn upsert_item(&self, channel: &str, item: &Item) -> Result<()> {
        Store::upsert_item(self, channel, item).await
    }
}
