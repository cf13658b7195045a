//! Channels command handler: configured and stored channels with counts.

use anyhow::Result;
use channel_downloader_core::{ChannelSummary, channel_key};

use crate::app::context::AppContext;
use crate::app::settings::load_channel_list;

pub async fn run_channels_command(ctx: &AppContext) -> Result<()> {
    let configured = load_channel_list(&ctx.settings.channel_file)?;
    let stored = ctx.store.list_channels().await?;

    if configured.is_empty() && stored.is_empty() {
        println!(
            "No channels configured. Add one handle per line to {}.",
            ctx.settings.channel_file.display()
        );
        return Ok(());
    }

    println!(
        "{:<32} {:>7} {:>9} {:>6}  last refreshed",
        "channel", "items", "completed", "failed"
    );
    for handle in &configured {
        let key = channel_key(handle);
        let summary = stored.iter().find(|summary| summary.name == key);
        println!("{}", render_row(handle, summary));
    }
    for summary in &stored {
        let listed = configured
            .iter()
            .any(|handle| channel_key(handle) == summary.name);
        if !listed {
            println!("{}", render_row(&summary.name, Some(summary)));
        }
    }
    Ok(())
}

fn render_row(label: &str, summary: Option<&ChannelSummary>) -> String {
    match summary {
        Some(summary) => format!(
            "{:<32} {:>7} {:>9} {:>6}  {}",
            label,
            summary.total,
            summary.completed,
            summary.failed,
            summary
                .last_refreshed_at
                .map_or_else(|| "never".to_string(), |at| at.format("%Y-%m-%d %H:%M").to_string())
        ),
        None => format!("{label:<32} {:>7} {:>9} {:>6}  never", "-", "-", "-"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_row_without_record() {
        let row = render_row("@veritasium", None);
        assert!(row.starts_with("@veritasium"));
        assert!(row.ends_with("never"));
    }

    #[test]
    fn render_row_with_counts() {
        let summary = ChannelSummary {
            name: "veritasium".into(),
            last_refreshed_at: None,
            total: 12,
            completed: 10,
            failed: 1,
        };
        let row = render_row("@veritasium", Some(&summary));
        assert!(row.contains("12"));
        assert!(row.contains("10"));
    }
}
