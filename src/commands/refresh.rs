//! Refresh command handler.

use anyhow::{Context, Result};

use crate::app::context::AppContext;

pub async fn run_refresh_command(ctx: &AppContext, channel: &str) -> Result<()> {
    let mut session = ctx.open_session(channel, false).await?;
    let summary = session
        .refresh()
        .await
        .with_context(|| format!("Failed to refresh channel '{channel}'"))?;
    println!(
        "Refreshed {}: {} listed, {} new",
        session.name(),
        summary.listed,
        summary.added
    );
    Ok(())
}
