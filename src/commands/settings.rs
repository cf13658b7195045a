//! Settings command handler: show effective configuration.

use crate::app::settings::Settings;

pub fn run_settings_command(settings: &Settings) {
    let resolved_path = settings.config_path.as_ref().map_or_else(
        || "<unresolved>".to_string(),
        |path| path.display().to_string(),
    );
    println!("config_path = {resolved_path}");
    println!(
        "config_file = {}",
        if settings.loaded_from_file {
            "loaded"
        } else {
            "not found (using defaults)"
        }
    );
    println!("api_key = {}", settings.masked_api_key());
    if let Some(base_url) = settings.api_base_url.as_deref() {
        println!("api_base_url = {base_url}");
    }
    println!("output_dir = {}", settings.output_dir.display());
    println!("max_threads = {}", settings.max_threads);
    println!("preferred_resolution = {}", settings.preferred_resolution);
    println!("channel_file = {}", settings.channel_file.display());
    println!("database = {}", settings.database.display());
    println!(
        "fetcher = {}",
        settings
            .fetch_url_template
            .as_deref()
            .map_or_else(|| "yt-dlp".to_string(), |template| format!("http {template}"))
    );
    println!("sidecar = {}", settings.sidecar);
}
