//! Channel Downloader Core Library
//!
//! Resumable bulk download of every video of a channel. The library keeps a
//! durable per-channel record of items, works out which ones still need
//! fetching, and fetches them across a bounded pool of workers while pushing
//! progress events to whoever is watching.
//!
//! # Architecture
//!
//! - [`db`] - Database connection and schema management
//! - [`store`] - Durable channel and item records
//! - [`filter`] - Done / pending partition of a channel
//! - [`fetch`] - Single-item fetch adapters (HTTP, yt-dlp)
//! - [`listing`] - Remote channel listing (`YouTube` Data API)
//! - [`scheduler`] - Bounded worker pool over pending items
//! - [`progress`] - Non-blocking progress event stream
//! - [`session`] - One channel as a resumable unit
//! - [`sidecar`] - JSON metadata files next to fetched media

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod db;
pub mod fetch;
pub mod filter;
pub mod listing;
pub mod progress;
pub mod scheduler;
pub mod session;
pub mod sidecar;
pub mod stop;
pub mod store;

// Re-export commonly used types
pub use db::{Database, DbError};
pub use fetch::{FetchError, FetchRequest, Fetcher, HttpFetcher, YtDlpFetcher};
pub use filter::{Partition, partition};
pub use listing::{ChannelLister, ListedItem, ListingError, YouTubeLister};
pub use progress::{ProgressEvent, ProgressEvents, ProgressReporter};
pub use scheduler::{
    BatchReport, MIN_THREADS, RunMonitor, Scheduler, SchedulerError, SchedulerHandle,
    SchedulerOptions,
};
pub use session::{ChannelSession, RefreshSummary, SessionConfig, SessionError, channel_key};
pub use stop::StopSignal;
pub use store::{
    Channel, ChannelSummary, Item, ItemRepository, ItemState, StatusCounts, Store, StoreError, Tone,
};
