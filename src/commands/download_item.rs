//! Single-video download: fetch one id of a channel, optionally to a path
//! the user picked.

use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use channel_downloader_core::ItemState;
use tracing::warn;

use crate::ProcessExit;
use crate::app::context::AppContext;
use crate::app::{exit_handler, progress_manager, terminal};
use crate::cli::DownloadItemArgs;

pub async fn run_download_item_command(
    ctx: &AppContext,
    args: &DownloadItemArgs,
    quiet: bool,
) -> Result<ProcessExit> {
    let mut session = ctx.open_session(&args.channel, args.sidecar).await?;

    let use_bar = terminal::should_use_progress_bar(
        io::stderr().is_terminal(),
        quiet,
        terminal::is_dumb_terminal(),
    );
    let (reporter, render_handle) = progress_manager::spawn_progress_ui(use_bar, 1);

    let handle = session
        .download_item(&args.id, args.output.clone(), reporter)
        .await
        .with_context(|| format!("Failed to start download of '{}'", args.id))?;

    let stop = handle.stop_signal();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping download");
            stop.stop();
        }
    });

    let report = handle.join().await?;
    interrupt.abort();
    if let Some(render) = render_handle {
        let _ = render.await;
    }

    let id = args.id.trim();
    match session.item(id) {
        Some(item) if item.state == ItemState::Completed => println!(
            "{}/{id}: completed, {} bytes -> {}",
            session.name(),
            item.size_bytes.unwrap_or_default(),
            item.output_path.display()
        ),
        Some(item) if item.state == ItemState::Failed => println!(
            "{}/{id}: failed: {}",
            session.name(),
            item.last_error.as_deref().unwrap_or("unknown error")
        ),
        _ => println!("{}/{id}: not downloaded (interrupted)", session.name()),
    }
    Ok(exit_handler::determine_exit_outcome(&report))
}
