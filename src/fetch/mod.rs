//! Fetch adapters: retrieve the bytes of one item into its output path.
//!
//! The scheduler only knows the [`Fetcher`] trait. Two implementations ship
//! with the crate:
//!
//! - [`HttpFetcher`] streams a URL built from a template
//! - [`YtDlpFetcher`] drives the `yt-dlp` executable
//!
//! Every adapter writes to [`temp_path_for`] first and renames into place
//! only after the bytes are flushed, so a half-written file never sits at the
//! final output path.

mod error;
mod http;
mod ytdlp;

pub use error::FetchError;
pub use http::{DEFAULT_PROGRESS_INTERVAL, HttpFetcher};
pub use ytdlp::{YtDlpFetcher, format_selector};

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::progress::ProgressReporter;
use crate::stop::StopSignal;

/// Suffix inserted before the extension of in-flight downloads.
const TEMP_MARKER: &str = "downloading";

/// Everything an adapter needs to fetch one item.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    /// Item to fetch.
    pub item_id: &'a str,
    /// Final location of the media file.
    pub output_path: &'a Path,
    /// Resolution hint such as `1080p`, passed through untouched.
    pub resolution: Option<&'a str>,
    /// Set when the run is being stopped.
    pub stop: &'a StopSignal,
    /// Sink for `ItemProgress` ticks.
    pub progress: &'a ProgressReporter,
}

/// Retrieves one item's bytes.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `request.item_id` into `request.output_path` and returns the
    /// number of bytes written.
    ///
    /// Implementations must return [`FetchError::Cancelled`] when they observe
    /// the stop signal, and must not leave a file at the output path on error.
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<u64, FetchError>;
}

/// Temporary path used while an item is being written.
///
/// `/out/c/abc.mp4` becomes `/out/c/abc.downloading.mp4`.
#[must_use]
pub fn temp_path_for(output_path: &Path) -> PathBuf {
    let stem = output_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output_path.extension() {
        Some(ext) => format!("{stem}.{TEMP_MARKER}.{}", ext.to_string_lossy()),
        None => format!("{stem}.{TEMP_MARKER}"),
    };
    output_path.with_file_name(name)
}

/// Creates the parent directory of `output_path`.
pub(crate) async fn prepare_parent(output_path: &Path) -> Result<(), FetchError> {
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| FetchError::disk(parent, e))?;
    }
    Ok(())
}

/// Renames a finished temp file over the output path and returns its size.
pub(crate) async fn promote(temp_path: &Path, output_path: &Path) -> Result<u64, FetchError> {
    tokio::fs::rename(temp_path, output_path)
        .await
        .map_err(|e| FetchError::disk(output_path, e))?;
    let size = tokio::fs::metadata(output_path)
        .await
        .map_err(|e| FetchError::disk(output_path, e))?
        .len();
    debug!(path = %output_path.display(), size, "promoted finished download");
    Ok(size)
}

/// Removes a leftover temp file, ignoring a file that is already gone.
pub(crate) async fn discard(temp_path: &Path) {
    if let Err(error) = tokio::fs::remove_file(temp_path).await
        && error.kind() != std::io::ErrorKind::NotFound
    {
        debug!(path = %temp_path.display(), %error, "failed to remove partial download");
    }
}
