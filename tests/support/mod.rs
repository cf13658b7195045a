//! Shared helpers for integration tests.

#![allow(dead_code)]

pub mod fakes;

use std::path::{Path, PathBuf};

use channel_downloader_core::store::output_path_for;
use channel_downloader_core::{Database, Item, Store};
use tempfile::TempDir;

/// File-backed store in a fresh temp dir; keep the `TempDir` alive.
pub async fn file_store() -> (Store, TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("channels.db");
    let db = Database::new(&db_path).await.expect("Failed to open database");
    (Store::new(db), temp_dir, db_path)
}

pub async fn memory_store() -> Store {
    Store::new(
        Database::new_in_memory()
            .await
            .expect("Failed to open in-memory database"),
    )
}

/// Pending items for `ids` with output paths under `root`.
pub fn pending_items(root: &Path, channel: &str, ids: &[&str]) -> Vec<Item> {
    ids.iter()
        .map(|id| Item::new(*id, output_path_for(root, channel, id)))
        .collect()
}
