//! Completion filter: splits a channel into done and pending items.
//!
//! An item is done only when the store says `completed` *and* the file on disk
//! still has the recorded size. A file without a completed record, or a
//! completed record without a matching file, is pending.

use std::collections::HashSet;
use std::fs;

use tracing::{debug, instrument};

use crate::store::{Channel, Item, ItemId, ItemState};

/// Result of [`partition`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    /// Items verified complete.
    pub done: HashSet<ItemId>,
    /// Items needing work, in download order.
    pub pending: Vec<ItemId>,
}

/// Partitions `channel` into done and pending item ids.
///
/// Pending order is the source list order (ids missing from the store
/// included), followed by known items absent from the source list in id order.
#[must_use]
#[instrument(skip(channel), fields(channel = %channel.name))]
pub fn partition(channel: &Channel) -> Partition {
    let mut result = Partition::default();
    let mut seen: HashSet<&str> = HashSet::new();

    let listed = channel.source_list.iter().map(String::as_str);
    let unlisted = channel.items.keys().map(String::as_str);

    for id in listed.chain(unlisted) {
        if !seen.insert(id) {
            continue;
        }
        match channel.item(id) {
            Some(item) if is_verified_complete(item) => {
                result.done.insert(id.to_string());
            }
            _ => result.pending.push(id.to_string()),
        }
    }

    debug!(
        done = result.done.len(),
        pending = result.pending.len(),
        "partitioned channel"
    );
    result
}

/// Returns true when `item` is recorded complete and its file still matches.
#[must_use]
pub fn is_verified_complete(item: &Item) -> bool {
    if item.state != ItemState::Completed {
        return false;
    }
    let Some(expected) = item.size_bytes else {
        return false;
    };
    match fs::metadata(&item.output_path) {
        Ok(meta) if meta.is_file() => {
            let matches = meta.len() == expected;
            if !matches {
                debug!(
                    item_id = %item.id,
                    expected,
                    actual = meta.len(),
                    "completed item has wrong size on disk"
                );
            }
            matches
        }
        _ => {
            debug!(item_id = %item.id, path = %item.output_path.display(), "completed item missing on disk");
            false
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;

    fn completed_on_disk(dir: &Path, id: &str, body: &[u8]) -> Item {
        let path = dir.join(format!("{id}.mp4"));
        fs::write(&path, body).unwrap();
        let mut item = Item::new(id, path);
        item.state = ItemState::Completed;
        item.size_bytes = Some(body.len() as u64);
        item
    }

    #[test]
    fn test_completed_item_with_matching_file_is_done() {
        let dir = TempDir::new().unwrap();
        let mut channel = Channel::empty("c");
        channel.apply(completed_on_disk(dir.path(), "a", b"video"));
        channel.source_list = vec!["a".into()];

        let result = partition(&channel);
        assert!(result.done.contains("a"));
        assert!(result.pending.is_empty());
    }

    #[test]
    fn test_deleted_file_makes_completed_item_pending() {
        let dir = TempDir::new().unwrap();
        let mut channel = Channel::empty("c");
        let item = completed_on_disk(dir.path(), "a", b"video");
        fs::remove_file(&item.output_path).unwrap();
        channel.apply(item);
        channel.source_list = vec!["a".into()];

        let result = partition(&channel);
        assert!(result.done.is_empty());
        assert_eq!(result.pending, vec!["a".to_string()]);
    }

    #[test]
    fn test_truncated_file_makes_completed_item_pending() {
        let dir = TempDir::new().unwrap();
        let mut channel = Channel::empty("c");
        let item = completed_on_disk(dir.path(), "a", b"video");
        fs::write(&item.output_path, b"vid").unwrap();
        channel.apply(item);

        let result = partition(&channel);
        assert_eq!(result.pending, vec!["a".to_string()]);
    }

    #[test]
    fn test_file_without_completed_record_is_pending() {
        let dir = TempDir::new().unwrap();
        let mut channel = Channel::empty("c");
        let mut item = completed_on_disk(dir.path(), "a", b"partial");
        item.state = ItemState::InProgress;
        channel.apply(item);

        let result = partition(&channel);
        assert_eq!(result.pending, vec!["a".to_string()]);
    }

    #[test]
    fn test_pending_preserves_source_order_and_includes_unknown_ids() {
        let dir = TempDir::new().unwrap();
        let mut channel = Channel::empty("c");
        channel.apply(Item::new("b", dir.path().join("b.mp4")));
        channel.apply(Item::new("orphan", dir.path().join("orphan.mp4")));
        channel.apply(completed_on_disk(dir.path(), "d", b"x"));
        channel.source_list = vec!["c".into(), "b".into(), "d".into(), "a".into(), "b".into()];

        let result = partition(&channel);
        assert_eq!(result.pending, vec!["c", "b", "a", "orphan"]);
        assert_eq!(result.done.len(), 1);
    }

    #[test]
    fn test_failed_items_are_pending() {
        let mut channel = Channel::empty("c");
        let mut item = Item::new("a", "/nonexistent/a.mp4".into());
        item.state = ItemState::Failed;
        channel.apply(item);

        assert_eq!(partition(&channel).pending, vec!["a".to_string()]);
    }
}
