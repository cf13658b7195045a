//! CLI command handlers.

mod channels;
mod download;
mod download_item;
mod list;
mod refresh;
mod settings;
mod status;

pub use channels::run_channels_command;
pub use download::run_download_command;
pub use download_item::run_download_item_command;
pub use list::run_list_command;
pub use refresh::run_refresh_command;
pub use settings::run_settings_command;
pub use status::run_status_command;
