//! Fetch adapter that shells out to `yt-dlp`.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::{FetchError, FetchRequest, Fetcher, discard, prepare_parent, promote, temp_path_for};

const DEFAULT_PROGRAM: &str = "yt-dlp";
const DEFAULT_URL_TEMPLATE: &str = "https://www.youtube.com/watch?v={id}";

/// Runs `yt-dlp` once per item.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    program: PathBuf,
    program_args: Vec<String>,
    url_template: String,
    extra_args: Vec<String>,
}

impl Default for YtDlpFetcher {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            program_args: Vec::new(),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            extra_args: Vec::new(),
        }
    }
}

impl YtDlpFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses a different executable (absolute path or name on `PATH`).
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Runs yt-dlp through a launcher, e.g. `python3 -m yt_dlp`.
    #[must_use]
    pub fn with_launcher<I, S>(mut self, program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.program = program.into();
        self.program_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Overrides the watch URL template; `{id}` is replaced by the item id.
    #[must_use]
    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    /// Appends arguments passed before the URL (cookies, rate limits).
    #[must_use]
    pub fn with_extra_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_args.extend(args.into_iter().map(Into::into));
        self
    }
}

/// Builds a `yt-dlp` format selector capped at the hinted height.
///
/// `1080p` becomes `best[height<=1080]/best`; no or unparsable hint means `best`.
#[must_use]
pub fn format_selector(resolution: Option<&str>) -> String {
    let height = resolution
        .map(|r| r.trim().trim_end_matches(['p', 'P']))
        .and_then(|digits| digits.parse::<u32>().ok());
    match height {
        Some(height) => format!("best[height<={height}]/best"),
        None => "best".to_string(),
    }
}

fn classify_failure(request: &FetchRequest<'_>, stderr: &str) -> FetchError {
    let lowered = stderr.to_ascii_lowercase();
    let item_id = request.item_id.to_string();
    if lowered.contains("video unavailable")
        || lowered.contains("private video")
        || lowered.contains("has been removed")
    {
        return FetchError::Removed { item_id };
    }
    if lowered.contains("requested format is not available") {
        return FetchError::UnavailableResolution {
            item_id,
            resolution: request.resolution.map(str::to_string),
        };
    }
    let last_line = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("yt-dlp exited with an error");
    FetchError::Network {
        item_id,
        message: last_line.trim().to_string(),
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    #[instrument(skip(self, request), fields(item_id = %request.item_id))]
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<u64, FetchError> {
        if request.stop.is_stopped() {
            return Err(FetchError::Cancelled);
        }
        prepare_parent(request.output_path).await?;
        let temp_path = temp_path_for(request.output_path);
        let url = self.url_template.replace("{id}", request.item_id);

        let mut command = Command::new(&self.program);
        command
            .args(&self.program_args)
            .arg("--no-playlist")
            .arg("--no-part")
            .arg("--quiet")
            .arg("--format")
            .arg(format_selector(request.resolution))
            .arg("--output")
            .arg(&temp_path)
            .args(&self.extra_args)
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program.display(), %url, "spawning yt-dlp");
        let mut child = command.spawn().map_err(|e| {
            FetchError::Other(format!("failed to run {}: {e}", self.program.display()))
        })?;

        let stderr = child.stderr.take();
        let stderr_reader = tokio::spawn(async move {
            let mut text = String::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_string(&mut text).await;
            }
            text
        });

        let status = tokio::select! {
            biased;
            () = request.stop.cancelled() => {
                if let Err(error) = child.kill().await {
                    warn!(%error, "failed to kill yt-dlp");
                }
                discard(&temp_path).await;
                return Err(FetchError::Cancelled);
            }
            status = child.wait() => {
                status.map_err(|e| FetchError::Other(format!("yt-dlp wait failed: {e}")))?
            }
        };
        let stderr_text = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            discard(&temp_path).await;
            let error = classify_failure(&request, &stderr_text);
            debug!(code = ?status.code(), %error, "yt-dlp failed");
            return Err(error);
        }

        let produced = tokio::fs::metadata(&temp_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if produced == 0 {
            discard(&temp_path).await;
            return Err(FetchError::network(request.item_id, "yt-dlp produced no data"));
        }

        let size = promote(&temp_path, request.output_path).await?;
        info!(path = %request.output_path.display(), bytes = size, "yt-dlp fetch complete");
        Ok(size)
    }
}
