use tracing::{debug, info, warn};

use super::RunContext;
use crate::fetch::FetchError;
use crate::progress::ProgressEvent;
use crate::sidecar::write_sidecar;
use crate::store::{Item, ItemState};

/// Records a successful fetch.
///
/// The item only counts as completed once the store accepted the write. If
/// the write fails the item goes back to `pending` and is reported failed,
/// so the next run fetches it again.
pub(super) async fn persist_success(ctx: &RunContext, mut item: Item, size: u64) {
    item.state = ItemState::Completed;
    item.size_bytes = Some(size);
    item.last_error = None;

    if let Err(error) = ctx.store.upsert_item(&ctx.channel, &item).await {
        warn!(item_id = %item.id, %error, "failed to record completion");
        item.state = ItemState::Pending;
        item.size_bytes = None;
        item.last_error = Some(error.to_string());
        if let Err(error) = ctx.store.upsert_item(&ctx.channel, &item).await {
            warn!(item_id = %item.id, %error, "failed to release item after completion error");
        }
        ctx.stats.increment_failed();
        ctx.reporter.emit(ProgressEvent::ItemFailed {
            id: item.id,
            error: format!("failed to record completion: {error}"),
        });
        return;
    }

    info!(item_id = %item.id, bytes = size, "item completed");
    if ctx.write_sidecars
        && let Err(error) = write_sidecar(&ctx.channel, &item)
    {
        warn!(item_id = %item.id, ?error, "sidecar generation failed, continuing");
    }
    ctx.stats.increment_completed();
    ctx.reporter.emit(ProgressEvent::ItemCompleted {
        id: item.id,
        size_bytes: size,
    });
}

/// Records a failed fetch; the item keeps its error for the next run.
pub(super) async fn persist_failure(ctx: &RunContext, mut item: Item, error: &FetchError) {
    warn!(item_id = %item.id, %error, attempts = item.attempts, "fetch failed");
    item.state = ItemState::Failed;
    item.last_error = Some(error.to_string());

    if let Err(store_error) = ctx.store.upsert_item(&ctx.channel, &item).await {
        warn!(item_id = %item.id, error = %store_error, "failed to mark item failed");
    }
    ctx.stats.increment_failed();
    ctx.reporter.emit(ProgressEvent::ItemFailed {
        id: item.id,
        error: error.to_string(),
    });
}

/// Puts an item whose fetch was cancelled back to `pending`.
pub(super) async fn persist_requeue(ctx: &RunContext, mut item: Item) {
    debug!(item_id = %item.id, "fetch cancelled, requeueing");
    item.state = ItemState::Pending;
    if let Err(error) = ctx.store.upsert_item(&ctx.channel, &item).await {
        warn!(item_id = %item.id, %error, "failed to requeue cancelled item");
    }
    ctx.stats.increment_cancelled();
}
