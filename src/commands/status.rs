//! Status command handler: item counts by state.

use anyhow::Result;

use crate::app::context::AppContext;

pub async fn run_status_command(ctx: &AppContext, channel: &str) -> Result<()> {
    let session = ctx.open_session(channel, false).await?;
    let counts = session.status();
    let refreshed = session.channel().last_refreshed_at.map_or_else(
        || "never".to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    );

    println!("channel     = {}", session.name());
    println!("refreshed   = {refreshed}");
    println!("total       = {}", counts.total());
    println!("completed   = {}", counts.completed);
    println!("failed      = {}", counts.failed);
    println!("pending     = {}", counts.pending);
    println!("in_progress = {}", counts.in_progress);
    Ok(())
}
