//! YouTube Data API v3 lister.
//!
//! Resolves a channel reference to its uploads playlist with
//! `channels?part=contentDetails`, then pages through
//! `playlistItems` 50 entries at a time following `nextPageToken`.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{ChannelLister, ListedItem, ListingError};

/// Default API base URL.
const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/youtube/v3";

/// Maximum page size accepted by `playlistItems`.
const PAGE_SIZE: &str = "50";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ==================== API Response Types ====================

#[derive(Debug, Deserialize)]
struct ChannelsResponse {
    #[serde(default)]
    items: Vec<ChannelResource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResource {
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemsResponse {
    next_page_token: Option<String>,
    #[serde(default)]
    items: Vec<PlaylistItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    snippet: Option<Snippet>,
    content_details: Option<PlaylistItemDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    published_at: Option<String>,
    resource_id: Option<ResourceId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemDetails {
    video_id: Option<String>,
    video_published_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    reason: String,
}

impl PlaylistItem {
    fn into_listed(self) -> Option<ListedItem> {
        let (snippet_id, title, snippet_published) = match self.snippet {
            Some(s) => (
                s.resource_id.and_then(|r| r.video_id),
                s.title,
                s.published_at,
            ),
            None => (None, String::new(), None),
        };
        let (details_id, video_published) = match self.content_details {
            Some(d) => (d.video_id, d.video_published_at),
            None => (None, None),
        };
        let id = details_id.or(snippet_id)?;
        let published_at = video_published
            .or(snippet_published)
            .as_deref()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc));
        Some(ListedItem {
            id,
            title,
            published_at,
        })
    }
}

// ==================== Channel references ====================

/// How a user-supplied channel string addresses a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    /// `@handle` (stored with the leading `@`).
    Handle(String),
    /// `UC...` channel id.
    Id(String),
}

impl ChannelRef {
    /// Parses `@name`, `name`, `UC…` ids, and `youtube.com/@name` or
    /// `youtube.com/channel/UC…` URLs.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim().trim_end_matches('/');
        let tail = trimmed
            .split_once("youtube.com/")
            .map_or(trimmed, |(_, rest)| rest);
        let tail = tail.strip_prefix("channel/").unwrap_or(tail);
        let tail = tail.split(['/', '?']).next().unwrap_or(tail);

        if is_channel_id(tail) {
            return Self::Id(tail.to_string());
        }
        Self::Handle(format!("@{}", tail.trim_start_matches('@')))
    }

    fn query_pair(&self) -> (&'static str, &str) {
        match self {
            Self::Handle(handle) => ("forHandle", handle.as_str()),
            Self::Id(id) => ("id", id.as_str()),
        }
    }
}

fn is_channel_id(value: &str) -> bool {
    value.len() == 24
        && value.starts_with("UC")
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

// ==================== Lister ====================

/// Lists a channel's uploads through the YouTube Data API.
pub struct YouTubeLister {
    client: Client,
    base_url: String,
    api_key: String,
}

impl YouTubeLister {
    /// Creates a lister against the public API.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::Network`] if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ListingError> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Creates a lister with a custom base URL (for testing with wiremock).
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::Network`] if the HTTP client cannot be built.
    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self, ListingError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("channel-downloader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(ListingError::network)?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn endpoint(&self, resource: &str, params: &[(&str, &str)]) -> Result<Url, ListingError> {
        let mut url = Url::parse(&format!("{}/{resource}", self.base_url))
            .map_err(|e| ListingError::invalid(format!("bad API base URL: {e}")))?;
        url.query_pairs_mut()
            .extend_pairs(params)
            .append_pair("key", &self.api_key);
        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: Url) -> Result<T, ListingError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ListingError::network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }
        response.json::<T>().await.map_err(ListingError::invalid)
    }

    async fn uploads_playlist(
        &self,
        channel: &ChannelRef,
        raw: &str,
    ) -> Result<String, ListingError> {
        let (key, value) = channel.query_pair();
        let url = self.endpoint("channels", &[("part", "contentDetails"), (key, value)])?;
        let response: ChannelsResponse = self.get_json(url).await?;
        response
            .items
            .into_iter()
            .next()
            .map(|c| c.content_details.related_playlists.uploads)
            .ok_or_else(|| ListingError::ChannelNotFound {
                handle: raw.to_string(),
            })
    }
}

impl std::fmt::Debug for YouTubeLister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YouTubeLister")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChannelLister for YouTubeLister {
    #[instrument(skip(self), fields(channel = %channel_handle))]
    async fn list_items(&self, channel_handle: &str) -> Result<Vec<ListedItem>, ListingError> {
        if self.api_key.is_empty() {
            return Err(ListingError::MissingApiKey);
        }
        let channel = ChannelRef::parse(channel_handle);
        let playlist = self.uploads_playlist(&channel, channel_handle).await?;
        debug!(%playlist, "resolved uploads playlist");

        let mut items = Vec::new();
        let mut seen_tokens = HashSet::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut params = vec![
                ("part", "snippet,contentDetails"),
                ("playlistId", playlist.as_str()),
                ("maxResults", PAGE_SIZE),
            ];
            if let Some(token) = page_token.as_deref() {
                params.push(("pageToken", token));
            }
            let url = self.endpoint("playlistItems", &params)?;
            let page: PlaylistItemsResponse = self.get_json(url).await?;
            let page_len = page.items.len();
            items.extend(page.items.into_iter().filter_map(PlaylistItem::into_listed));
            debug!(page_len, total = items.len(), "fetched listing page");

            match page.next_page_token {
                Some(token) if seen_tokens.insert(token.clone()) => page_token = Some(token),
                Some(token) => {
                    warn!(%token, "listing returned a repeated page token, stopping");
                    break;
                }
                None => break,
            }
        }

        info!(items = items.len(), "listed channel");
        Ok(items)
    }
}

fn classify_status(status: StatusCode, body: &str) -> ListingError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();
    let message = parsed
        .as_ref()
        .map(|b| b.error.message.clone())
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let quota = parsed.as_ref().is_some_and(|b| {
        b.error.errors.iter().any(|e| {
            e.reason.eq_ignore_ascii_case("quotaExceeded")
                || e.reason.eq_ignore_ascii_case("dailyLimitExceeded")
        })
    });

    match status {
        StatusCode::FORBIDDEN if quota => ListingError::QuotaExceeded { message },
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ListingError::Unauthorized {
                status: status.as_u16(),
                message,
            }
        }
        StatusCode::NOT_FOUND => ListingError::invalid(message),
        _ => ListingError::network(message),
    }
}
