//! Plain HTTP fetch adapter.

use std::path::Path;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};
use url::Url;

use super::{FetchError, FetchRequest, Fetcher, discard, prepare_parent, promote, temp_path_for};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Minimum delay between two `ItemProgress` ticks for one item.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Streams media from a URL template.
///
/// The template may contain `{id}` (percent-encoded item id) and
/// `{resolution}` (the hint, or empty) placeholders, for example
/// `https://media.example.com/v/{id}?res={resolution}`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    url_template: String,
    progress_interval: Duration,
}

impl HttpFetcher {
    /// Creates a fetcher with a default client.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Other`] if the HTTP client cannot be built.
    pub fn new(url_template: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("channel-downloader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_client(client, url_template))
    }

    /// Creates a fetcher around an existing client.
    #[must_use]
    pub fn with_client(client: Client, url_template: impl Into<String>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Overrides the progress tick interval.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    fn url_for(&self, item_id: &str, resolution: Option<&str>) -> Result<Url, FetchError> {
        let raw = self
            .url_template
            .replace("{id}", &urlencoding::encode(item_id))
            .replace("{resolution}", &urlencoding::encode(resolution.unwrap_or("")));
        Url::parse(&raw).map_err(|e| FetchError::Other(format!("invalid fetch URL '{raw}': {e}")))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[instrument(skip(self, request), fields(item_id = %request.item_id))]
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<u64, FetchError> {
        if request.stop.is_stopped() {
            return Err(FetchError::Cancelled);
        }
        let url = self.url_for(request.item_id, request.resolution)?;
        debug!(%url, "requesting media");

        let response = tokio::select! {
            biased;
            () = request.stop.cancelled() => return Err(FetchError::Cancelled),
            response = self.client.get(url).send() => {
                response.map_err(|e| FetchError::network(request.item_id, e))?
            }
        };

        check_status(response.status(), &request)?;

        prepare_parent(request.output_path).await?;
        let temp_path = temp_path_for(request.output_path);
        let file = File::create(&temp_path)
            .await
            .map_err(|e| FetchError::disk(&temp_path, e))?;

        let streamed =
            stream_to_file(file, response, &request, &temp_path, self.progress_interval).await;
        if let Err(error) = streamed {
            debug!(path = %temp_path.display(), "cleaning up partial file after error");
            discard(&temp_path).await;
            return Err(error);
        }

        let size = promote(&temp_path, request.output_path).await?;
        info!(path = %request.output_path.display(), bytes = size, "fetch complete");
        Ok(size)
    }
}

fn check_status(status: StatusCode, request: &FetchRequest<'_>) -> Result<(), FetchError> {
    if status.is_success() {
        return Ok(());
    }
    let item_id = request.item_id.to_string();
    Err(match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => FetchError::Removed { item_id },
        StatusCode::UNSUPPORTED_MEDIA_TYPE | StatusCode::RANGE_NOT_SATISFIABLE => {
            FetchError::UnavailableResolution {
                item_id,
                resolution: request.resolution.map(str::to_string),
            }
        }
        other => FetchError::Network {
            item_id,
            message: format!("HTTP {}", other.as_u16()),
        },
    })
}

/// Streams the response body into `file`, returning the bytes written.
async fn stream_to_file(
    file: File,
    response: reqwest::Response,
    request: &FetchRequest<'_>,
    temp_path: &Path,
    interval: Duration,
) -> Result<u64, FetchError> {
    let total = response.content_length();
    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    let mut ticker = ProgressTicker::new(request.item_id, total, request.progress, interval);

    loop {
        let chunk = tokio::select! {
            biased;
            () = request.stop.cancelled() => return Err(FetchError::Cancelled),
            chunk = stream.next() => chunk,
        };
        let Some(chunk) = chunk else {
            break;
        };
        let chunk = chunk.map_err(|e| FetchError::network(request.item_id, e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| FetchError::disk(temp_path, e))?;
        written += chunk.len() as u64;
        ticker.tick(written);
    }

    writer
        .flush()
        .await
        .map_err(|e| FetchError::disk(temp_path, e))?;
    writer
        .get_ref()
        .sync_all()
        .await
        .map_err(|e| FetchError::disk(temp_path, e))?;

    if let Some(expected) = total
        && expected != written
    {
        return Err(FetchError::network(
            request.item_id,
            format!("body truncated: expected {expected} bytes, got {written}"),
        ));
    }
    if written == 0 {
        return Err(FetchError::network(request.item_id, "empty response body"));
    }
    ticker.finish(written);
    Ok(written)
}

/// Throttles `ItemProgress` emission for one item.
struct ProgressTicker<'a> {
    item_id: &'a str,
    total: Option<u64>,
    reporter: &'a ProgressReporter,
    interval: Duration,
    last: Option<Instant>,
}

impl<'a> ProgressTicker<'a> {
    fn new(
        item_id: &'a str,
        total: Option<u64>,
        reporter: &'a ProgressReporter,
        interval: Duration,
    ) -> Self {
        Self {
            item_id,
            total,
            reporter,
            interval,
            last: None,
        }
    }

    fn tick(&mut self, bytes: u64) {
        if self.last.is_some_and(|last| last.elapsed() < self.interval) {
            return;
        }
        self.last = Some(Instant::now());
        self.emit(bytes);
    }

    fn finish(&self, bytes: u64) {
        self.emit(bytes);
    }

    fn emit(&self, bytes: u64) {
        self.reporter.emit(ProgressEvent::ItemProgress {
            id: self.item_id.to_string(),
            bytes_downloaded: bytes,
            total_bytes: self.total,
        });
    }
}
