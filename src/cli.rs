//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Resumable bulk downloader for every video of a channel.
///
/// Keeps a local record of each channel's videos so an interrupted download
/// picks up where it stopped without fetching finished videos again.
#[derive(Parser, Debug)]
#[command(name = "channel-downloader")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (defaults to ~/.config/channel-downloader/config.toml)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Output directory (overrides `output_dir` from the settings file)
    #[arg(short, long, value_name = "DIR", global = true)]
    pub output_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List channels from the channel file and the local store
    Channels,

    /// Re-list a channel's videos from the remote API
    Refresh(ChannelArgs),

    /// Download every video of a channel that is not complete yet
    Download(DownloadArgs),

    /// Download one video of a channel, optionally to a chosen path
    DownloadItem(DownloadItemArgs),

    /// Show item counts by state
    Status(ChannelArgs),

    /// List a channel's items with their state
    List(ChannelArgs),

    /// Print the effective settings
    Settings,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChannelArgs {
    /// Channel handle (`@name`), name, or id
    pub channel: String,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DownloadArgs {
    /// Channel handle (`@name`), name, or id
    pub channel: String,

    /// Concurrent downloads (1-12, overrides `max_threads`)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u8).range(1..=12))]
    pub threads: Option<u8>,

    /// Use the stored item list without asking the remote API first
    #[arg(long)]
    pub no_refresh: bool,

    /// Write a JSON metadata file next to each download
    #[arg(long)]
    pub sidecar: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DownloadItemArgs {
    /// Channel handle (`@name`), name, or id
    pub channel: String,

    /// Video id
    pub id: String,

    /// Write the video here instead of the channel's output directory
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Write a JSON metadata file next to the download
    #[arg(long)]
    pub sidecar: bool,
}
