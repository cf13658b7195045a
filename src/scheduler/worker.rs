use std::sync::Arc;

use tracing::{debug, instrument, warn};

use super::RunContext;
use super::persistence::{persist_failure, persist_requeue, persist_success};
use crate::fetch::{FetchError, FetchRequest};
use crate::progress::ProgressEvent;
use crate::store::{Item, ItemState, StoreError};

/// Claims items from the shared queue until it is empty or the run stops.
#[instrument(skip(ctx), fields(channel = %ctx.channel))]
pub(super) async fn run_worker(ctx: Arc<RunContext>, worker_id: usize) {
    let mut processed = 0usize;
    while let Some(item) = claim_next(&ctx).await {
        fetch_item(&ctx, item).await;
        processed += 1;
    }
    debug!(processed, "worker finished");
}

/// Pops the next item and records it `in_progress`.
///
/// Claims are taken one worker at a time, so `ItemStarted` events and fetch
/// calls follow queue order even though fetches overlap.
async fn claim_next(ctx: &RunContext) -> Option<Item> {
    let _turn = ctx.claim_turn.lock().await;
    loop {
        if ctx.stop.is_stopped() {
            debug!("stop requested, worker exiting");
            return None;
        }
        let mut item = ctx.next_item()?;
        item.state = ItemState::InProgress;
        item.attempts = item.attempts.saturating_add(1);
        ctx.track(&item);

        match ctx.store.upsert_item(&ctx.channel, &item).await {
            Ok(()) => {
                ctx.reporter.emit(ProgressEvent::ItemStarted {
                    id: item.id.clone(),
                });
                return Some(item);
            }
            Err(error) => release_unclaimed(ctx, item, &error).await,
        }
    }
}

#[instrument(skip(ctx, item, error), fields(item_id = %item.id))]
async fn release_unclaimed(ctx: &RunContext, mut item: Item, error: &StoreError) {
    warn!(%error, "failed to record claim, skipping item");
    item.state = ItemState::Pending;
    item.last_error = Some(error.to_string());
    if let Err(error) = ctx.store.upsert_item(&ctx.channel, &item).await {
        warn!(%error, "failed to release unclaimed item");
    }
    ctx.untrack(&item.id);
    ctx.stats.increment_failed();
    ctx.reporter.emit(ProgressEvent::ItemFailed {
        id: item.id,
        error: format!("failed to record claim: {error}"),
    });
}

#[instrument(skip(ctx, item), fields(item_id = %item.id))]
async fn fetch_item(ctx: &RunContext, item: Item) {
    debug!(attempt = item.attempts, "fetching");

    let result = ctx
        .fetcher
        .fetch(FetchRequest {
            item_id: &item.id,
            output_path: &item.output_path,
            resolution: item.preferred_resolution.as_deref(),
            stop: &ctx.stop,
            progress: &ctx.reporter,
        })
        .await;

    let id = item.id.clone();
    match result {
        Ok(size) => persist_success(ctx, item, size).await,
        Err(FetchError::Cancelled) => persist_requeue(ctx, item).await,
        Err(error) => persist_failure(ctx, item, &error).await,
    }
    ctx.untrack(&id);
}
