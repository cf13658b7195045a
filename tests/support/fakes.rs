//! Scripted fetcher, lister, and repository doubles for integration tests.

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use channel_downloader_core::store;
use channel_downloader_core::{
    ChannelLister, FetchError, FetchRequest, Fetcher, Item, ItemRepository, ItemState,
    ListedItem, ListingError, Store, StoreError,
};

/// What the fake fetcher does for one call.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Behavior {
    /// Writes this many bytes to the output path and succeeds.
    Succeed(usize),
    /// Fails with a network error carrying this message.
    Fail(String),
    /// Fails because the item was removed upstream.
    Removed,
    /// Waits for the stop signal, then reports cancellation.
    HangUntilStop,
    /// Never returns, ignoring the stop signal.
    HangForever,
}

/// Fetcher that follows a per-item script and records every call.
#[derive(Debug)]
pub struct FakeFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Behavior>>>,
    default: Behavior,
    delay: Duration,
    calls: Mutex<Vec<String>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[allow(dead_code)]
impl FakeFetcher {
    /// Every item succeeds with `size` bytes unless scripted otherwise.
    pub fn succeeding(size: usize) -> Self {
        Self::with_default(Behavior::Succeed(size))
    }

    pub fn with_default(default: Behavior) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Sleeps this long inside every call before acting.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queues `behaviors` for successive calls on `id`; later calls use the default.
    pub fn script(self, id: &str, behaviors: impl IntoIterator<Item = Behavior>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .extend(behaviors);
        self
    }

    /// Ids in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls made for `id`.
    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == id).count()
    }

    /// Highest number of calls observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_behavior(&self, id: &str) -> Behavior {
        self.scripts
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default.clone())
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<u64, FetchError> {
        self.calls.lock().unwrap().push(request.item_id.to_string());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let behavior = self.next_behavior(request.item_id);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match behavior {
            Behavior::Succeed(size) => {
                let path: PathBuf = request.output_path.to_path_buf();
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| FetchError::disk(parent, e))?;
                }
                tokio::fs::write(&path, vec![b'x'; size])
                    .await
                    .map_err(|e| FetchError::disk(&path, e))?;
                Ok(size as u64)
            }
            Behavior::Fail(message) => Err(FetchError::Network {
                item_id: request.item_id.to_string(),
                message,
            }),
            Behavior::Removed => Err(FetchError::Removed {
                item_id: request.item_id.to_string(),
            }),
            Behavior::HangUntilStop => {
                request.stop.cancelled().await;
                Err(FetchError::Cancelled)
            }
            Behavior::HangForever => {
                std::future::pending::<()>().await;
                Err(FetchError::Cancelled)
            }
        }
    }
}

/// Lister returning queued responses, then repeating the last one.
#[derive(Debug)]
pub struct FakeLister {
    responses: Mutex<VecDeque<Result<Vec<ListedItem>, ListingError>>>,
    last: Mutex<Result<Vec<ListedItem>, ListingError>>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl FakeLister {
    pub fn listing(ids: &[&str]) -> Self {
        Self::new(Ok(listed(ids)))
    }

    pub fn failing(error: ListingError) -> Self {
        Self::new(Err(error))
    }

    fn new(response: Result<Vec<ListedItem>, ListingError>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            last: Mutex::new(response),
            calls: AtomicUsize::new(0),
        }
    }

    /// Queues a response served before the default one.
    pub fn then(self, response: Result<Vec<ListedItem>, ListingError>) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelLister for FakeLister {
    async fn list_items(&self, _channel_handle: &str) -> Result<Vec<ListedItem>, ListingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }
        self.last.lock().unwrap().clone()
    }
}

/// Builds listed items titled after their ids.
pub fn listed(ids: &[&str]) -> Vec<ListedItem> {
    ids.iter()
        .map(|id| ListedItem::new(*id, format!("Video {id}")))
        .collect()
}

/// Repository that rejects `completed` writes for chosen items.
#[derive(Debug)]
pub struct RejectCompletion {
    inner: Store,
    reject: Vec<String>,
}

#[allow(dead_code)]
impl RejectCompletion {
    pub fn new(inner: Store, reject: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            inner,
            reject: reject.iter().map(ToString::to_string).collect(),
        })
    }
}

#[async_trait]
impl ItemRepository for RejectCompletion {
    async fn upsert_item(&self, channel: &str, item: &Item) -> store::Result<()> {
        if item.state == ItemState::Completed && self.reject.contains(&item.id) {
            return Err(StoreError::corrupt(channel, "disk full"));
        }
        self.inner.upsert_item(channel, item).await
    }
}
