//! List command handler: one row per item in listing order.

use anyhow::Result;
use channel_downloader_core::{Item, Tone};
use indicatif::HumanBytes;

use crate::app::context::AppContext;

pub async fn run_list_command(ctx: &AppContext, channel: &str) -> Result<()> {
    let session = ctx.open_session(channel, false).await?;
    let items = session.items();
    if items.is_empty() {
        println!(
            "No items known for '{}'. Run `refresh {channel}` first.",
            session.name()
        );
        return Ok(());
    }
    for item in &items {
        println!("{}", render_item(item));
    }
    Ok(())
}

fn render_item(item: &Item) -> String {
    let marker = match item.state.tone() {
        Tone::Success => '+',
        Tone::Error => '!',
        Tone::Neutral => ' ',
    };
    let size = item
        .size_bytes
        .map_or_else(String::new, |bytes| HumanBytes(bytes).to_string());
    let row = format!(
        "{marker} {:<11} {:<14} {:>10}  {}",
        item.state.as_str(),
        item.id,
        size,
        item.title
    );
    match item.last_error.as_deref() {
        Some(error) => format!("{row}  [{error}]"),
        None => row,
    }
}
