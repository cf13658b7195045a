//! Download command handler: refresh, fetch pending items, report.

use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use channel_downloader_core::{BatchReport, SessionError, partition};
use tracing::{info, warn};

use crate::ProcessExit;
use crate::app::context::AppContext;
use crate::app::{exit_handler, progress_manager, terminal};
use crate::cli::DownloadArgs;

pub async fn run_download_command(
    ctx: &AppContext,
    args: &DownloadArgs,
    quiet: bool,
) -> Result<ProcessExit> {
    let mut session = ctx.open_session(&args.channel, args.sidecar).await?;

    if !args.no_refresh {
        match session.refresh().await {
            Ok(summary) => info!(
                listed = summary.listed,
                added = summary.added,
                "channel refreshed"
            ),
            Err(SessionError::Listing(error)) => {
                warn!(%error, "refresh failed, continuing with the stored item list");
            }
            Err(error) => {
                return Err(error)
                    .with_context(|| format!("Failed to refresh channel '{}'", args.channel));
            }
        }
    }

    let pending = partition(&session.channel()).pending.len();
    if pending == 0 {
        let counts = session.status();
        println!(
            "Nothing to download for {}: {} of {} items complete.",
            session.name(),
            counts.completed,
            counts.total()
        );
        return Ok(ProcessExit::Success);
    }

    let use_bar = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        quiet,
        terminal::is_dumb_terminal(),
    );
    let (reporter, render_handle) = progress_manager::spawn_progress_ui(use_bar, pending);

    let max_threads = args.threads.unwrap_or(ctx.settings.max_threads);
    let handle = session
        .download_pending(usize::from(max_threads), reporter)
        .await
        .with_context(|| format!("Failed to start download for '{}'", args.channel))?;

    let stop = handle.stop_signal();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after in-flight downloads");
            stop.stop();
        }
    });

    let report = handle.join().await?;
    interrupt.abort();
    if let Some(render) = render_handle {
        let _ = render.await;
    }

    print_summary(session.name(), &report);
    if report.interrupted {
        warn!(
            completed = report.completed,
            requeued = report.cancelled,
            "Interrupted. Run again to resume."
        );
    }
    Ok(exit_handler::determine_exit_outcome(&report))
}

fn print_summary(channel: &str, report: &BatchReport) {
    let suffix = if report.interrupted { " (interrupted)" } else { "" };
    println!(
        "{channel}: {} completed, {} failed{suffix}",
        report.completed, report.failed
    );
}
