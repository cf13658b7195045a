//! Progress reporting decoupled from the worker pool.
//!
//! Workers push [`ProgressEvent`]s into a [`ProgressReporter`]; a caller
//! (progress bar, GUI, test) drains them from [`ProgressEvents`] on its own
//! schedule. `emit` never blocks:
//!
//! - low-priority ticks ([`ProgressEvent::ItemStarted`],
//!   [`ProgressEvent::ItemProgress`]) go through a bounded buffer and are
//!   dropped when the consumer falls behind
//! - terminal events (completed, failed, batch finished) go through an
//!   unbounded channel and are never dropped while a consumer exists

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::trace;

use crate::store::ItemId;

/// Default number of buffered low-priority events.
pub const DEFAULT_TICK_CAPACITY: usize = 256;

/// Event pushed by the scheduler and fetch adapters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// A worker claimed the item and is about to fetch it.
    ItemStarted { id: ItemId },
    /// Bytes written so far for an item being fetched.
    ItemProgress {
        id: ItemId,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },
    /// The item was fetched and recorded complete.
    ItemCompleted { id: ItemId, size_bytes: u64 },
    /// The item could not be fetched or recorded.
    ItemFailed { id: ItemId, error: String },
    /// Every worker of the run has finished.
    BatchFinished { completed: usize, failed: usize },
}

impl ProgressEvent {
    /// Returns true for events that must always be delivered.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ItemCompleted { .. } | Self::ItemFailed { .. } | Self::BatchFinished { .. }
        )
    }
}

#[derive(Debug)]
struct Senders {
    ticks: mpsc::Sender<ProgressEvent>,
    terminal: mpsc::UnboundedSender<ProgressEvent>,
    dropped_ticks: AtomicU64,
}

/// Sending side of the progress channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    senders: Option<Arc<Senders>>,
}

/// Creates a connected reporter / event stream pair.
///
/// `tick_capacity` bounds the low-priority buffer (minimum 1).
#[must_use]
pub fn channel(tick_capacity: usize) -> (ProgressReporter, ProgressEvents) {
    let (tick_tx, tick_rx) = mpsc::channel(tick_capacity.max(1));
    let (terminal_tx, terminal_rx) = mpsc::unbounded_channel();
    let reporter = ProgressReporter {
        senders: Some(Arc::new(Senders {
            ticks: tick_tx,
            terminal: terminal_tx,
            dropped_ticks: AtomicU64::new(0),
        })),
    };
    let events = ProgressEvents {
        ticks: tick_rx,
        terminal: terminal_rx,
        ticks_open: true,
        terminal_open: true,
    };
    (reporter, events)
}

impl ProgressReporter {
    /// Returns a reporter that discards every event.
    #[must_use]
    pub fn disabled() -> Self {
        Self { senders: None }
    }

    /// Pushes an event without blocking.
    pub fn emit(&self, event: ProgressEvent) {
        let Some(senders) = &self.senders else {
            return;
        };
        if event.is_terminal() {
            // Err only when the consumer is gone; nobody is left to deliver to.
            let _ = senders.terminal.send(event);
            return;
        }
        match senders.ticks.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                senders.dropped_ticks.fetch_add(1, Ordering::Relaxed);
                trace!(?event, "progress buffer full, dropping tick");
            }
        }
    }

    /// Number of low-priority events dropped because the buffer was full.
    #[must_use]
    pub fn dropped_ticks(&self) -> u64 {
        self.senders
            .as_ref()
            .map_or(0, |s| s.dropped_ticks.load(Ordering::Relaxed))
    }
}

/// Receiving side of the progress channel.
///
/// Ends (returns `None`) once every [`ProgressReporter`] clone is dropped and
/// all buffered events are drained.
#[derive(Debug)]
pub struct ProgressEvents {
    ticks: mpsc::Receiver<ProgressEvent>,
    terminal: mpsc::UnboundedReceiver<ProgressEvent>,
    ticks_open: bool,
    terminal_open: bool,
}

impl ProgressEvents {
    /// Waits for the next event.
    ///
    /// Buffered ticks are returned before buffered terminal events, so an
    /// item's `ItemStarted` is observed before its terminal event.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        loop {
            if !self.ticks_open && !self.terminal_open {
                return None;
            }
            tokio::select! {
                biased;
                event = self.ticks.recv(), if self.ticks_open => match event {
                    Some(event) => return Some(event),
                    None => self.ticks_open = false,
                },
                event = self.terminal.recv(), if self.terminal_open => match event {
                    Some(event) => return Some(event),
                    None => self.terminal_open = false,
                },
            }
        }
    }

    /// Returns an already-buffered event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<ProgressEvent> {
        self.ticks
            .try_recv()
            .ok()
            .or_else(|| self.terminal.try_recv().ok())
    }

    /// Drains the stream until it ends and returns every event.
    pub async fn collect(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.recv().await {
            events.push(event);
        }
        events
    }
}
