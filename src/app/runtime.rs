use anyhow::Result;
use clap::Parser;
use tracing::debug;

use crate::app::context::AppContext;
use crate::app::settings::load_settings;
use crate::app::terminal;
use crate::cli::{Cli, Command};
use crate::{ProcessExit, commands};

pub(crate) async fn run_downloader() -> Result<ProcessExit> {
    // Parse before tracing so --help works without logs
    let cli = Cli::parse();

    let default_level = terminal::resolve_default_log_level(cli.verbose, cli.quiet);
    terminal::init_tracing(default_level);
    debug!(?cli, "CLI arguments parsed");

    let settings = load_settings(cli.config.as_deref(), cli.output_dir.clone())?;

    if let Command::Settings = cli.command {
        commands::run_settings_command(&settings);
        return Ok(ProcessExit::Success);
    }

    let ctx = AppContext::open(settings).await?;
    match &cli.command {
        Command::Channels => commands::run_channels_command(&ctx).await?,
        Command::Refresh(args) => commands::run_refresh_command(&ctx, &args.channel).await?,
        Command::Status(args) => commands::run_status_command(&ctx, &args.channel).await?,
        Command::List(args) => commands::run_list_command(&ctx, &args.channel).await?,
        Command::Download(args) => {
            return commands::run_download_command(&ctx, args, cli.quiet).await;
        }
        Command::DownloadItem(args) => {
            return commands::run_download_item_command(&ctx, args, cli.quiet).await;
        }
        Command::Settings => {}
    }
    Ok(ProcessExit::Success)
}
