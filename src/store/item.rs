//! Channel and item types plus the item lifecycle states.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stable external identifier of an item, unique within a channel.
pub type ItemId = String;

/// File extension used for fetched media files.
const MEDIA_EXTENSION: &str = "mp4";

/// Lifecycle state of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    /// Waiting to be claimed by a worker.
    Pending,
    /// Claimed by exactly one worker and being fetched.
    InProgress,
    /// Fetched, flushed, and recorded with its size.
    Completed,
    /// Last fetch attempt failed; re-queued by the next run.
    Failed,
}

impl ItemState {
    /// Returns the database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns true for states a run can end an item in.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Presentation tone for this state (row colouring in a UI).
    #[must_use]
    pub fn tone(self) -> Tone {
        match self {
            Self::Completed => Tone::Success,
            Self::Failed => Tone::Error,
            Self::Pending | Self::InProgress => Tone::Neutral,
        }
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid item state: {s}")),
        }
    }
}

/// How a presentation layer should highlight an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Success,
    Error,
    Neutral,
}

/// One downloadable video of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// Stable external identifier.
    pub id: ItemId,
    /// Title as last seen in the listing.
    pub title: String,
    /// Publish timestamp, when the listing provided one.
    pub published_at: Option<DateTime<Utc>>,
    /// Resolution hint handed to the fetch adapter (e.g. `1080p`).
    pub preferred_resolution: Option<String>,
    /// Current lifecycle state.
    pub state: ItemState,
    /// Size of the fetched file; only known after a successful fetch.
    pub size_bytes: Option<u64>,
    /// Final location of the media file.
    pub output_path: PathBuf,
    /// Description of the most recent failure.
    pub last_error: Option<String>,
    /// Number of times a worker claimed this item.
    pub attempts: u32,
}

impl Item {
    /// Creates a new pending item with the given output path.
    #[must_use]
    pub fn new(id: impl Into<ItemId>, output_path: PathBuf) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            published_at: None,
            preferred_resolution: None,
            state: ItemState::Pending,
            size_bytes: None,
            output_path,
            last_error: None,
            attempts: 0,
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item {{ id: {}, state: {} }}", self.id, self.state)
    }
}

/// Returns the directory name used for a channel below the output root.
///
/// A leading `@` of a handle is dropped so `@name` and `name` share one tree.
#[must_use]
pub fn channel_dir_name(channel: &str) -> String {
    let trimmed = channel.trim().trim_start_matches('@');
    urlencoding::encode(trimmed).into_owned()
}

/// Derives the deterministic output path of an item.
///
/// Ids are percent-encoded, so two distinct ids never map to the same file.
#[must_use]
pub fn output_path_for(output_root: &Path, channel: &str, id: &str) -> PathBuf {
    output_root
        .join(channel_dir_name(channel))
        .join(format!("{}.{MEDIA_EXTENSION}", urlencoding::encode(id)))
}

/// Per-state item counts for a channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    /// Total number of items counted.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed
    }

    fn record(&mut self, state: ItemState) {
        match state {
            ItemState::Pending => self.pending += 1,
            ItemState::InProgress => self.in_progress += 1,
            ItemState::Completed => self.completed += 1,
            ItemState::Failed => self.failed += 1,
        }
    }
}

/// A named collection of items plus the last observed listing order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Channel {
    /// Channel name; the store key.
    pub name: String,
    /// Item ids in the order last observed from the remote listing.
    pub source_list: Vec<ItemId>,
    /// When the source list was last refreshed.
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Every known item keyed by id.
    pub items: BTreeMap<ItemId, Item>,
}

impl Channel {
    /// Creates an empty channel shell.
    #[must_use]
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Returns true when nothing is known about this channel yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.source_list.is_empty()
    }

    /// Looks up an item by id.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    /// Inserts or replaces an item.
    pub fn apply(&mut self, item: Item) {
        self.items.insert(item.id.clone(), item);
    }

    /// Returns known items in source-list order, then unlisted items by id.
    #[must_use]
    pub fn ordered_items(&self) -> Vec<&Item> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::with_capacity(self.items.len());
        for id in &self.source_list {
            if let Some(item) = self.items.get(id)
                && seen.insert(id.as_str())
            {
                ordered.push(item);
            }
        }
        ordered.extend(
            self.items
                .values()
                .filter(|item| !seen.contains(item.id.as_str())),
        );
        ordered
    }

    /// Counts items by state.
    #[must_use]
    pub fn status(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for item in self.items.values() {
            counts.record(item.state);
        }
        counts
    }
}
