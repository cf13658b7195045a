//! Progress bar for download runs, fed by the reporter's event stream.

use std::time::Duration;

use channel_downloader_core::{ProgressEvent, ProgressEvents, ProgressReporter, progress};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};

/// Creates the reporter for a run of `total` items and, when requested, the
/// task rendering its events.
///
/// When `use_bar` is false the reporter is disabled and no task is spawned.
pub(crate) fn spawn_progress_ui(
    use_bar: bool,
    total: usize,
) -> (ProgressReporter, Option<tokio::task::JoinHandle<()>>) {
    if !use_bar {
        return (ProgressReporter::disabled(), None);
    }
    let (reporter, events) = progress::channel(progress::DEFAULT_TICK_CAPACITY);
    let bar = ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX));
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{pos}/{len}] {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(100));
    let handle = tokio::spawn(render_events(events, bar));
    (reporter, Some(handle))
}

/// Renders events until every reporter clone is dropped.
async fn render_events(mut events: ProgressEvents, bar: ProgressBar) {
    while let Some(event) = events.recv().await {
        apply_event(&bar, &event);
        if matches!(event, ProgressEvent::BatchFinished { .. }) {
            break;
        }
    }
    bar.finish_and_clear();
}

fn apply_event(bar: &ProgressBar, event: &ProgressEvent) {
    match event {
        ProgressEvent::ItemStarted { id } => bar.set_message(format!("{id}: starting")),
        ProgressEvent::ItemProgress {
            id,
            bytes_downloaded,
            total_bytes,
        } => bar.set_message(progress_message(id, *bytes_downloaded, *total_bytes)),
        ProgressEvent::ItemCompleted { id, size_bytes } => {
            bar.inc(1);
            bar.println(format!("done    {id} ({})", HumanBytes(*size_bytes)));
        }
        ProgressEvent::ItemFailed { id, error } => {
            bar.inc(1);
            bar.println(format!("failed  {id}: {error}"));
        }
        ProgressEvent::BatchFinished { completed, failed } => {
            bar.set_message(format!("{completed} completed, {failed} failed"));
        }
    }
}

fn progress_message(id: &str, bytes: u64, total: Option<u64>) -> String {
    match total {
        Some(total) if total > 0 => format!(
            "{id}: {} / {} ({}%)",
            HumanBytes(bytes),
            HumanBytes(total),
            bytes.saturating_mul(100) / total
        ),
        _ => format!("{id}: {}", HumanBytes(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_progress_ui_when_disabled_returns_no_task() {
        let (reporter, handle) = spawn_progress_ui(false, 3);
        assert!(handle.is_none());
        reporter.emit(ProgressEvent::ItemStarted { id: "a".into() });
    }

    #[tokio::test]
    async fn spawn_progress_ui_task_ends_on_batch_finished() {
        let (reporter, handle) = spawn_progress_ui(true, 1);
        reporter.emit(ProgressEvent::ItemStarted { id: "a".into() });
        reporter.emit(ProgressEvent::ItemCompleted {
            id: "a".into(),
            size_bytes: 10,
        });
        reporter.emit(ProgressEvent::BatchFinished {
            completed: 1,
            failed: 0,
        });
        let handle = handle.unwrap_or_else(|| panic!("expected render task"));
        handle.await.unwrap_or_else(|e| panic!("render task failed: {e}"));
    }

    #[test]
    fn progress_message_with_and_without_total() {
        assert_eq!(progress_message("a", 512, Some(1024)), "a: 512 B / 1.00 KiB (50%)");
        assert_eq!(progress_message("a", 512, None), "a: 512 B");
    }
}
