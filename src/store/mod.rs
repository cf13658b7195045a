//! Metadata store: the durable per-channel record of items and their state.
//!
//! The store is the single source of truth for whether an item is done. It is
//! backed by `SQLite` (WAL mode) with two tables: `channels` holds the source
//! list and refresh time, `items` holds one row per known item.
//!
//! # Overview
//!
//! - [`Store`] - load / save / upsert operations
//! - [`Channel`] and [`Item`] - the in-memory record
//! - [`ItemState`] - item lifecycle states
//! - [`ItemRepository`] - per-item write seam used by the scheduler
//!
//! # Example
//!
//! ```ignore
//! use channel_downloader_core::{Database, Store};
//!
//! let store = Store::new(Database::new_in_memory().await?);
//! let mut channel = store.load("veritasium").await?;
//! // ... mutate ...
//! store.save(&channel).await?;
//! ```

mod error;
mod item;
mod repository;

pub use error::StoreError;
pub use item::{
    Channel, Item, ItemId, ItemState, StatusCounts, Tone, channel_dir_name, output_path_for,
};
pub use repository::ItemRepository;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;
use sqlx::{FromRow, Row};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::db::Database;

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

const UPSERT_ITEM_SQL: &str = r"INSERT INTO items (
        channel,
        id,
        title,
        published_at,
        preferred_resolution,
        state,
        size_bytes,
        output_path,
        last_error,
        attempts,
        updated_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
    ON CONFLICT (channel, id) DO UPDATE SET
        title = excluded.title,
        published_at = excluded.published_at,
        preferred_resolution = excluded.preferred_resolution,
        state = excluded.state,
        size_bytes = excluded.size_bytes,
        output_path = excluded.output_path,
        last_error = excluded.last_error,
        attempts = excluded.attempts,
        updated_at = excluded.updated_at";

/// Row shape of the `items` table.
#[derive(Debug, FromRow)]
struct ItemRow {
    id: String,
    title: String,
    published_at: Option<String>,
    preferred_resolution: Option<String>,
    #[sqlx(rename = "state")]
    state_str: String,
    size_bytes: Option<i64>,
    output_path: String,
    last_error: Option<String>,
    attempts: i64,
}

impl ItemRow {
    fn into_item(self, channel: &str) -> Result<Item> {
        let state = self
            .state_str
            .parse::<ItemState>()
            .map_err(|reason| StoreError::corrupt(channel, reason))?;
        let published_at = self
            .published_at
            .as_deref()
            .map(|raw| parse_timestamp(channel, raw))
            .transpose()?;
        Ok(Item {
            id: self.id,
            title: self.title,
            published_at,
            preferred_resolution: self.preferred_resolution,
            state,
            size_bytes: self.size_bytes.and_then(|v| u64::try_from(v).ok()),
            output_path: PathBuf::from(self.output_path),
            last_error: self.last_error,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
        })
    }
}

/// Summary of one stored channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    /// Channel name.
    pub name: String,
    /// When the source list was last refreshed.
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Number of known items.
    pub total: u64,
    /// Number of completed items.
    pub completed: u64,
    /// Number of failed items.
    pub failed: u64,
}

/// Durable channel store.
///
/// Cloning is cheap; clones share the pool and the writer lock.
#[derive(Debug, Clone)]
pub struct Store {
    db: Database,
    write_lock: Arc<Mutex<()>>,
}

impl Store {
    /// Creates a store over the given database connection.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self {
            db,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Loads the record of `channel_name`, or an empty shell when absent.
    ///
    /// Items left `in_progress` by a previous process are demoted to
    /// `pending` in the same transaction that reads the record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a query fails, or
    /// [`StoreError::CorruptRecord`] if a stored value cannot be decoded.
    #[instrument(skip(self), fields(channel = %channel_name))]
    pub async fn load(&self, channel_name: &str) -> Result<Channel> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.db.pool().begin().await?;

        let recovered = sqlx::query(
            r"UPDATE items
              SET state = ?, updated_at = datetime('now')
              WHERE channel = ? AND state = ?",
        )
        .bind(ItemState::Pending.as_str())
        .bind(channel_name)
        .bind(ItemState::InProgress.as_str())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let channel_row =
            sqlx::query(r"SELECT source_list, last_refreshed_at FROM channels WHERE name = ?")
                .bind(channel_name)
                .fetch_optional(&mut *tx)
                .await?;

        let rows = sqlx::query_as::<_, ItemRow>(
            r"SELECT id, title, published_at, preferred_resolution, state,
                     size_bytes, output_path, last_error, attempts
              FROM items
              WHERE channel = ?
              ORDER BY id ASC",
        )
        .bind(channel_name)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        if recovered > 0 {
            info!(recovered, "demoted interrupted items to pending");
        }

        let mut channel = Channel::empty(channel_name);
        if let Some(row) = channel_row {
            let source_list: String = row.get("source_list");
            channel.source_list = serde_json::from_str(&source_list).map_err(|e| {
                StoreError::corrupt(channel_name, format!("invalid source list: {e}"))
            })?;
            channel.last_refreshed_at = row
                .get::<Option<String>, _>("last_refreshed_at")
                .as_deref()
                .map(|raw| parse_timestamp(channel_name, raw))
                .transpose()?;
        }
        for row in rows {
            channel.apply(row.into_item(channel_name)?);
        }

        debug!(
            items = channel.items.len(),
            listed = channel.source_list.len(),
            "loaded channel record"
        );
        Ok(channel)
    }

    /// Atomically replaces the whole record of `channel`.
    ///
    /// The channel row and every item row are rewritten in one transaction, so
    /// a concurrent [`Store::load`] sees either the previous or the new record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the transaction fails; nothing is
    /// persisted in that case.
    #[instrument(skip(self, channel), fields(channel = %channel.name, items = channel.items.len()))]
    pub async fn save(&self, channel: &Channel) -> Result<()> {
        let source_list = serde_json::to_string(&channel.source_list)
            .map_err(|e| StoreError::corrupt(&channel.name, e.to_string()))?;
        let last_refreshed_at = channel.last_refreshed_at.map(|ts| ts.to_rfc3339());

        let _guard = self.write_lock.lock().await;
        let mut tx = self.db.pool().begin().await?;

        sqlx::query(
            r"INSERT INTO channels (name, source_list, last_refreshed_at, updated_at)
              VALUES (?, ?, ?, datetime('now'))
              ON CONFLICT (name) DO UPDATE SET
                  source_list = excluded.source_list,
                  last_refreshed_at = excluded.last_refreshed_at,
                  updated_at = excluded.updated_at",
        )
        .bind(&channel.name)
        .bind(&source_list)
        .bind(last_refreshed_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(r"DELETE FROM items WHERE channel = ?")
            .bind(&channel.name)
            .execute(&mut *tx)
            .await?;

        for item in channel.items.values() {
            write_item(&mut tx, &channel.name, item).await?;
        }

        tx.commit().await?;
        debug!("saved channel record");
        Ok(())
    }

    /// Merges one item into the record of `channel_name`.
    ///
    /// Creates the channel row if this is the first write for the channel.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the write fails.
    #[instrument(skip(self, item), fields(channel = %channel_name, item_id = %item.id, state = %item.state))]
    pub async fn upsert_item(&self, channel_name: &str, item: &Item) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.db.pool().begin().await?;

        sqlx::query(r"INSERT OR IGNORE INTO channels (name) VALUES (?)")
            .bind(channel_name)
            .execute(&mut *tx)
            .await?;
        write_item(&mut tx, channel_name, item).await?;

        tx.commit().await?;
        Ok(())
    }

    /// Counts items of `channel_name` in `state`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self), fields(channel = %channel_name))]
    pub async fn count_by_state(&self, channel_name: &str, state: ItemState) -> Result<i64> {
        let row =
            sqlx::query(r"SELECT COUNT(*) AS count FROM items WHERE channel = ? AND state = ?")
                .bind(channel_name)
                .bind(state.as_str())
                .fetch_one(self.db.pool())
                .await?;

        Ok(row.get("count"))
    }

    /// Lists every stored channel with item counts, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_channels(&self) -> Result<Vec<ChannelSummary>> {
        let rows = sqlx::query(
            r"SELECT c.name AS name,
                     c.last_refreshed_at AS last_refreshed_at,
                     COUNT(i.id) AS total,
                     COALESCE(SUM(CASE WHEN i.state = 'completed' THEN 1 ELSE 0 END), 0) AS completed,
                     COALESCE(SUM(CASE WHEN i.state = 'failed' THEN 1 ELSE 0 END), 0) AS failed
              FROM channels c
              LEFT JOIN items i ON i.channel = c.name
              GROUP BY c.name
              ORDER BY c.name ASC",
        )
        .fetch_all(self.db.pool())
        .await?;

        rows.into_iter()
            .map(|row| -> Result<ChannelSummary> {
                let name: String = row.get("name");
                let last_refreshed_at = row
                    .get::<Option<String>, _>("last_refreshed_at")
                    .as_deref()
                    .map(|raw| parse_timestamp(&name, raw))
                    .transpose()?;
                Ok(ChannelSummary {
                    last_refreshed_at,
                    total: u64::try_from(row.get::<i64, _>("total")).unwrap_or(0),
                    completed: u64::try_from(row.get::<i64, _>("completed")).unwrap_or(0),
                    failed: u64::try_from(row.get::<i64, _>("failed")).unwrap_or(0),
                    name,
                })
            })
            .collect()
    }
}

async fn write_item(conn: &mut SqliteConnection, channel_name: &str, item: &Item) -> Result<()> {
    sqlx::query(UPSERT_ITEM_SQL)
        .bind(channel_name)
        .bind(&item.id)
        .bind(&item.title)
        .bind(item.published_at.map(|ts| ts.to_rfc3339()))
        .bind(item.preferred_resolution.as_deref())
        .bind(item.state.as_str())
        .bind(
            item.size_bytes
                .map(|v| i64::try_from(v).unwrap_or(i64::MAX)),
        )
        .bind(item.output_path.to_string_lossy().into_owned())
        .bind(item.last_error.as_deref())
        .bind(i64::from(item.attempts))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

fn parse_timestamp(channel: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::corrupt(channel, format!("invalid timestamp '{raw}': {e}")))
}
