//! JSON metadata sidecars written next to fetched media files.
//!
//! `abc.mp4` gets an `abc.mp4.json` holding the item's id, title, publish date,
//! channel, resolution hint, and size. Writing is best effort: callers log a
//! [`SidecarError`] and move on.

use std::fs;
use std::io::{BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::store::Item;

/// Errors produced by sidecar generation.
#[derive(Debug, Error)]
pub enum SidecarError {
    /// I/O error writing the sidecar file to disk.
    #[error("I/O error writing sidecar: {0}")]
    Io(#[from] std::io::Error),
    /// JSON serialization error.
    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
struct VideoSidecar<'a> {
    id: &'a str,
    title: &'a str,
    channel: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resolution: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size_bytes: Option<u64>,
    file_name: String,
}

/// Writes the sidecar for a fetched `item` of `channel`.
///
/// Returns `Ok(None)` when the media file is missing or a sidecar already
/// exists (an existing sidecar is never overwritten), `Ok(Some(path))` when a
/// new sidecar was written.
///
/// # Errors
///
/// Returns [`SidecarError`] on I/O or serialization failure.
#[instrument(skip(item), fields(item_id = %item.id))]
pub fn write_sidecar(channel: &str, item: &Item) -> Result<Option<PathBuf>, SidecarError> {
    if !item.output_path.is_file() {
        debug!(
            path = %item.output_path.display(),
            "media file missing, skipping sidecar"
        );
        return Ok(None);
    }
    let sidecar_path = sidecar_path_for(&item.output_path);

    let document = VideoSidecar {
        id: &item.id,
        title: &item.title,
        channel,
        published_at: item.published_at,
        resolution: item.preferred_resolution.as_deref(),
        size_bytes: item.size_bytes,
        file_name: item
            .output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    let file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&sidecar_path)
    {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            debug!(path = %sidecar_path.display(), "sidecar already exists, skipping");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    let write_result = {
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &document)
    };
    if let Err(err) = write_result {
        let _ = fs::remove_file(&sidecar_path);
        return Err(err.into());
    }

    debug!(path = %sidecar_path.display(), "sidecar created");
    Ok(Some(sidecar_path))
}

/// `abc.mp4` → `abc.mp4.json`.
#[must_use]
pub fn sidecar_path_for(media_path: &Path) -> PathBuf {
    let mut path = media_path.as_os_str().to_owned();
    path.push(".json");
    PathBuf::from(path)
}
