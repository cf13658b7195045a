//! Channel session: one channel's item list, store, and scheduler as a
//! resumable unit.
//!
//! A session owns the in-memory [`Channel`]. Every write the scheduler makes
//! goes through the store and is mirrored into that channel, so
//! [`ChannelSession::status`] and [`ChannelSession::items`] reflect a running
//! batch without reloading.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::fetch::Fetcher;
use crate::filter::partition;
use crate::listing::{ChannelLister, ListedItem, ListingError};
use crate::progress::ProgressReporter;
use crate::scheduler::{
    BatchReport, DEFAULT_GRACE_PERIOD, RunMonitor, Scheduler, SchedulerError, SchedulerHandle,
    SchedulerOptions,
};
use crate::store::{
    self, Channel, Item, ItemRepository, ItemState, StatusCounts, Store, StoreError,
    output_path_for,
};

/// Default worker count.
pub const DEFAULT_MAX_THREADS: usize = 4;

/// Default resolution hint.
pub const DEFAULT_RESOLUTION: &str = "1080p";

/// Settings a session is constructed with.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Root of the output tree; each channel gets a directory below it.
    pub output_root: PathBuf,
    /// Resolution hint stamped on new items.
    pub preferred_resolution: Option<String>,
    /// Worker count used by [`ChannelSession::download`].
    pub max_threads: usize,
    /// Write JSON sidecars next to fetched files.
    pub write_sidecars: bool,
    /// Drain window after a stop request.
    pub grace_period: Duration,
}

impl SessionConfig {
    #[must_use]
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            preferred_resolution: Some(DEFAULT_RESOLUTION.to_string()),
            max_threads: DEFAULT_MAX_THREADS,
            write_sidecars: false,
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Listing(#[from] ListingError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    /// A previous run of this session has not finished yet.
    #[error("a download run is already active for channel '{channel}'")]
    RunInProgress { channel: String },

    /// A single-item download was asked for without an id.
    #[error("item id must not be empty")]
    EmptyItemId,
}

/// Outcome of [`ChannelSession::refresh`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Distinct items in the new listing.
    pub listed: usize,
    /// Items seen for the first time.
    pub added: usize,
}

/// Store key for a user-supplied channel handle: trimmed, leading `@` removed.
#[must_use]
pub fn channel_key(handle: &str) -> String {
    handle.trim().trim_start_matches('@').to_string()
}

fn lock(channel: &Mutex<Channel>) -> MutexGuard<'_, Channel> {
    channel.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Store wrapper that mirrors every write into the session's channel.
///
/// A `completed` write that the store rejected is not mirrored, so memory
/// never claims completion the store does not have.
struct TrackedStore {
    store: Store,
    channel: Arc<Mutex<Channel>>,
}

#[async_trait]
impl ItemRepository for TrackedStore {
    async fn upsert_item(&self, channel: &str, item: &Item) -> store::Result<()> {
        let result = self.store.upsert_item(channel, item).await;
        if result.is_ok() || item.state != ItemState::Completed {
            lock(&self.channel).apply(item.clone());
        }
        result
    }
}

/// Resumable download session for one channel.
pub struct ChannelSession {
    handle: String,
    name: String,
    config: SessionConfig,
    store: Store,
    lister: Arc<dyn ChannelLister>,
    fetcher: Arc<dyn Fetcher>,
    channel: Arc<Mutex<Channel>>,
    active: Option<RunMonitor>,
}

impl std::fmt::Debug for ChannelSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSession")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("config", &self.config)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl ChannelSession {
    /// Opens the session for `handle`, loading its record from `store`.
    ///
    /// Items a crashed run left `in_progress` come back as `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Store`] if the record cannot be loaded.
    #[instrument(skip(config, store, lister, fetcher))]
    pub async fn open(
        handle: &str,
        config: SessionConfig,
        store: Store,
        lister: Arc<dyn ChannelLister>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Result<Self, SessionError> {
        let name = channel_key(handle);
        let channel = store.load(&name).await?;
        debug!(items = channel.items.len(), "opened session");
        Ok(Self {
            handle: handle.trim().to_string(),
            name,
            config,
            store,
            lister,
            fetcher,
            channel: Arc::new(Mutex::new(channel)),
            active: None,
        })
    }

    /// Handle passed to the lister.
    #[must_use]
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Store key of this channel.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns true while a run started by this session is still going.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|run| !run.is_finished())
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.is_running() {
            return Err(SessionError::RunInProgress {
                channel: self.name.clone(),
            });
        }
        Ok(())
    }

    /// Re-lists the channel and merges the result into the record.
    ///
    /// New ids become `pending` items, known ids get their title and publish
    /// date updated, the source list is replaced, and the record is saved.
    /// Items that disappeared from the listing are kept.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Listing`] leaves the channel untouched
    /// - [`SessionError::Store`] keeps the merged state in memory only
    /// - [`SessionError::RunInProgress`] while a run is active
    #[instrument(skip(self), fields(channel = %self.name))]
    pub async fn refresh(&mut self) -> Result<RefreshSummary, SessionError> {
        self.ensure_idle()?;
        let listed = self.lister.list_items(&self.handle).await?;

        let (summary, snapshot) = {
            let mut channel = lock(&self.channel);
            let summary = merge_listing(&mut channel, listed, &self.config);
            (summary, channel.clone())
        };
        self.store.save(&snapshot).await?;

        info!(listed = summary.listed, added = summary.added, "refreshed channel");
        Ok(summary)
    }

    /// Starts fetching every item that is not verified complete.
    ///
    /// Uses [`SessionConfig::max_threads`] workers.
    ///
    /// # Errors
    ///
    /// See [`Self::download_pending`].
    pub async fn download(
        &mut self,
        reporter: ProgressReporter,
    ) -> Result<SchedulerHandle, SessionError> {
        self.download_pending(self.config.max_threads, reporter).await
    }

    /// Starts fetching every item that is not verified complete, with at most
    /// `max_threads` concurrent workers.
    ///
    /// Pending items (including failed ones and completed ones whose file is
    /// gone or truncated) are reset to `pending` and saved before the run
    /// starts. Returns immediately with the run's handle.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Scheduler`] for an invalid `max_threads`
    /// - [`SessionError::RunInProgress`] while a previous run is active
    /// - [`SessionError::Store`] if the reset cannot be saved
    #[instrument(skip(self, reporter), fields(channel = %self.name))]
    pub async fn download_pending(
        &mut self,
        max_threads: usize,
        reporter: ProgressReporter,
    ) -> Result<SchedulerHandle, SessionError> {
        self.ensure_idle()?;
        let scheduler = self.scheduler(max_threads)?;

        let (pending, snapshot) = {
            let mut channel = lock(&self.channel);
            let pending = self.queue_pending(&mut channel);
            (pending, channel.clone())
        };
        self.store.save(&snapshot).await?;

        info!(pending = pending.len(), max_threads, "downloading pending items");
        Ok(self.start_run(&scheduler, pending, reporter))
    }

    /// Starts fetching the single item `id`, whatever its current state.
    ///
    /// The id does not have to be listed yet. With `target` set the file is
    /// written there and the item's output path follows it, so later
    /// completion checks look at that file. The run goes through the same
    /// claim and record steps as a batch; read the outcome with
    /// [`Self::item`] once the returned handle has been joined.
    ///
    /// # Errors
    ///
    /// - [`SessionError::EmptyItemId`] for a blank `id`
    /// - [`SessionError::RunInProgress`] while a previous run is active
    /// - [`SessionError::Store`] if the item cannot be recorded
    #[instrument(skip(self, target, reporter), fields(channel = %self.name))]
    pub async fn download_item(
        &mut self,
        id: &str,
        target: Option<PathBuf>,
        reporter: ProgressReporter,
    ) -> Result<SchedulerHandle, SessionError> {
        self.ensure_idle()?;
        let id = id.trim();
        if id.is_empty() {
            return Err(SessionError::EmptyItemId);
        }
        let scheduler = self.scheduler(1)?;

        let item = {
            let mut channel = lock(&self.channel);
            let mut item = channel.item(id).cloned().unwrap_or_else(|| {
                Item::new(id, output_path_for(&self.config.output_root, &self.name, id))
            });
            if let Some(target) = target {
                item.output_path = target;
            }
            item.state = ItemState::Pending;
            item.size_bytes = None;
            if item.preferred_resolution.is_none() {
                item.preferred_resolution = self.config.preferred_resolution.clone();
            }
            channel.apply(item.clone());
            item
        };
        self.store.upsert_item(&self.name, &item).await?;

        info!(item_id = %item.id, path = %item.output_path.display(), "downloading single item");
        Ok(self.start_run(&scheduler, vec![item], reporter))
    }

    fn scheduler(&self, max_threads: usize) -> Result<Scheduler, SchedulerError> {
        Ok(Scheduler::new(max_threads)?.with_options(SchedulerOptions {
            write_sidecars: self.config.write_sidecars,
            grace_period: self.config.grace_period,
        }))
    }

    fn start_run(
        &mut self,
        scheduler: &Scheduler,
        items: Vec<Item>,
        reporter: ProgressReporter,
    ) -> SchedulerHandle {
        let repository = Arc::new(TrackedStore {
            store: self.store.clone(),
            channel: Arc::clone(&self.channel),
        });
        let handle = scheduler.start(
            &self.name,
            items,
            Arc::clone(&self.fetcher),
            repository,
            reporter,
        );
        self.active = Some(handle.monitor());
        handle
    }

    fn queue_pending(&self, channel: &mut Channel) -> Vec<Item> {
        let split = partition(channel);
        let mut queued = Vec::with_capacity(split.pending.len());
        for id in split.pending {
            let mut item = channel.item(&id).cloned().unwrap_or_else(|| {
                Item::new(
                    id.clone(),
                    output_path_for(&self.config.output_root, &self.name, &id),
                )
            });
            item.state = ItemState::Pending;
            item.size_bytes = None;
            if item.preferred_resolution.is_none() {
                item.preferred_resolution = self.config.preferred_resolution.clone();
            }
            channel.apply(item.clone());
            queued.push(item);
        }
        queued
    }

    /// Requests the active run, if any, to stop.
    ///
    /// No new item starts afterwards, but this does not wait: until the
    /// owner of the run's [`SchedulerHandle`] awaits `join` or `stop` (or
    /// hands it to [`Self::stop_and_drain`]), [`Self::status`] may still
    /// count items as `in_progress`.
    pub fn stop(&self) {
        if let Some(run) = &self.active {
            info!(channel = %self.name, "stop requested");
            run.stop();
        }
    }

    /// Stops the run behind `handle` and waits for it to drain.
    ///
    /// On return no item of this channel is `in_progress`, in the store or in
    /// [`Self::status`].
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Scheduler`] if the run's supervisor panicked.
    #[instrument(skip(self, handle), fields(channel = %self.name))]
    pub async fn stop_and_drain(
        &mut self,
        handle: SchedulerHandle,
    ) -> Result<BatchReport, SessionError> {
        info!("stopping and draining run");
        let report = handle.stop().await?;
        self.active = None;
        Ok(report)
    }

    /// Snapshot of one item.
    #[must_use]
    pub fn item(&self, id: &str) -> Option<Item> {
        lock(&self.channel).item(id).cloned()
    }

    /// Counts items by state.
    #[must_use]
    pub fn status(&self) -> StatusCounts {
        lock(&self.channel).status()
    }

    /// Snapshot of every item in source order, then unlisted items by id.
    #[must_use]
    pub fn items(&self) -> Vec<Item> {
        lock(&self.channel)
            .ordered_items()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Snapshot of the whole channel record.
    #[must_use]
    pub fn channel(&self) -> Channel {
        lock(&self.channel).clone()
    }
}

fn merge_listing(
    channel: &mut Channel,
    listed: Vec<ListedItem>,
    config: &SessionConfig,
) -> RefreshSummary {
    let mut seen = HashSet::new();
    let mut source_list = Vec::with_capacity(listed.len());
    let mut added = 0;

    for entry in listed {
        if !seen.insert(entry.id.clone()) {
            continue;
        }
        source_list.push(entry.id.clone());
        match channel.items.get_mut(&entry.id) {
            Some(item) => {
                item.title = entry.title;
                if entry.published_at.is_some() {
                    item.published_at = entry.published_at;
                }
            }
            None => {
                let output_path = output_path_for(&config.output_root, &channel.name, &entry.id);
                let mut item = Item::new(entry.id, output_path);
                item.title = entry.title;
                item.published_at = entry.published_at;
                item.preferred_resolution = config.preferred_resolution.clone();
                channel.apply(item);
                added += 1;
            }
        }
    }

    let summary = RefreshSummary {
        listed: source_list.len(),
        added,
    };
    channel.source_list = source_list;
    channel.last_refreshed_at = Some(Utc::now());
    summary
}
