//! Settings file and channel list loading for the CLI.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, warn};

const DEFAULT_MAX_THREADS: u8 = 4;
const MAX_THREADS_LIMIT: u8 = 12;
const DEFAULT_RESOLUTION: &str = "1080p";
const DEFAULT_CHANNEL_FILE: &str = "channels.txt";
const DATABASE_FILE_NAME: &str = "channel-downloader.db";

/// Values read from the settings file; `None` means the key was absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FileConfig {
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub max_threads: Option<u8>,
    pub preferred_resolution: Option<String>,
    pub channel_file: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub fetch_url_template: Option<String>,
    pub sidecar: Option<bool>,
}

impl FileConfig {
    /// Validates config values against the CLI's ranges.
    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(max_threads) = self.max_threads
            && !(1..=MAX_THREADS_LIMIT).contains(&max_threads)
        {
            bail!(
                "Invalid config value for `max_threads`: {max_threads}. Expected range: 1..={MAX_THREADS_LIMIT}"
            );
        }
        if let Some(resolution) = self.preferred_resolution.as_deref()
            && !is_resolution_label(resolution)
        {
            bail!(
                "Invalid config value for `preferred_resolution`: '{resolution}'. Expected a label like \"1080p\""
            );
        }
        if let Some(template) = self.fetch_url_template.as_deref()
            && !template.contains("{id}")
        {
            bail!("Invalid config value for `fetch_url_template`: missing `{{id}}` placeholder");
        }
        Ok(())
    }
}

fn is_resolution_label(value: &str) -> bool {
    value
        .strip_suffix('p')
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

/// Effective settings after defaults and CLI overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Settings {
    /// Settings file consulted, if one could be resolved.
    pub config_path: Option<PathBuf>,
    /// Whether the settings file existed and was read.
    pub loaded_from_file: bool,
    pub api_key: Option<String>,
    /// Listing API root; `None` means the public endpoint.
    pub api_base_url: Option<String>,
    pub output_dir: PathBuf,
    pub max_threads: u8,
    pub preferred_resolution: String,
    pub channel_file: PathBuf,
    pub database: PathBuf,
    pub fetch_url_template: Option<String>,
    pub sidecar: bool,
}

impl Settings {
    /// Applies defaults to `file`, then the `--output-dir` override.
    pub(crate) fn resolve(
        config_path: Option<PathBuf>,
        file: Option<FileConfig>,
        output_dir_override: Option<PathBuf>,
    ) -> Self {
        let loaded_from_file = file.is_some();
        let file = file.unwrap_or_default();
        let output_dir = output_dir_override
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        let database = file
            .database
            .unwrap_or_else(|| output_dir.join(DATABASE_FILE_NAME));
        Self {
            config_path,
            loaded_from_file,
            api_key: file.api_key.filter(|key| !key.is_empty()),
            api_base_url: file.api_base_url,
            max_threads: file.max_threads.unwrap_or(DEFAULT_MAX_THREADS),
            preferred_resolution: file
                .preferred_resolution
                .unwrap_or_else(|| DEFAULT_RESOLUTION.to_string()),
            channel_file: file
                .channel_file
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CHANNEL_FILE)),
            database,
            fetch_url_template: file.fetch_url_template,
            sidecar: file.sidecar.unwrap_or(false),
            output_dir,
        }
    }

    /// API key with all but the last four characters hidden.
    pub(crate) fn masked_api_key(&self) -> String {
        match self.api_key.as_deref() {
            None => "<unset>".to_string(),
            Some(key) => {
                let count = key.chars().count();
                if count <= 4 {
                    return "****".to_string();
                }
                let tail: String = key.chars().skip(count - 4).collect();
                format!("****{tail}")
            }
        }
    }
}

/// Loads settings from `explicit` or the default location.
///
/// An explicit path must exist; a missing default file yields defaults.
pub(crate) fn load_settings(
    explicit: Option<&Path>,
    output_dir_override: Option<PathBuf>,
) -> Result<Settings> {
    let (path, required) = match explicit {
        Some(path) => (Some(path.to_path_buf()), true),
        None => (resolve_default_config_path(), false),
    };

    let file = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        Some(path_ref) if required => {
            bail!("Config file '{}' does not exist", path_ref.display());
        }
        _ => None,
    };
    debug!(path = ?path, loaded = file.is_some(), "settings resolved");
    Ok(Settings::resolve(path, file, output_dir_override))
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/channel-downloader/config.toml`
/// 2. `$HOME/.config/channel-downloader/config.toml`
pub(crate) fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("channel-downloader")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("channel-downloader")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

pub(crate) fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "api_key" => cfg.api_key = Some(parse_string_literal(value).with_context(invalid)?),
            "api_base_url" => {
                cfg.api_base_url = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "output_dir" => {
                cfg.output_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "max_threads" => cfg.max_threads = Some(parse_integer_u8(value).with_context(invalid)?),
            "preferred_resolution" => {
                cfg.preferred_resolution =
                    Some(parse_string_literal(value).with_context(invalid)?);
            }
            "channel_file" => {
                cfg.channel_file = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "database" => {
                cfg.database = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            "fetch_url_template" => {
                cfg.fetch_url_template = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "sidecar" => cfg.sidecar = Some(parse_boolean(value).with_context(invalid)?),
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u8(raw_value: &str) -> Result<u8> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<u16>()?;
    u8::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u8"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

/// Reads the channel list: one channel per line, blank lines and `#`
/// comments skipped. A missing file is an empty list.
pub(crate) fn load_channel_list(path: &Path) -> Result<Vec<String>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "channel file not found, no channels configured");
            return Ok(Vec::new());
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Failed to read channel file '{}'", path.display()));
        }
    };
    Ok(parse_channel_list(&raw))
}

fn parse_channel_list(raw: &str) -> Vec<String> {
    let mut channels: Vec<String> = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !channels.iter().any(|existing| existing == line) {
            channels.push(line.to_string());
        }
    }
    channels
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
api_key = "AIzaSecret"
api_base_url = "http://127.0.0.1:8080/youtube/v3"
output_dir = "/media/videos"
max_threads = 8
preferred_resolution = "720p"
channel_file = "/etc/channels.txt"
database = "/var/lib/cd.db"
fetch_url_template = "http://mirror.local/{id}.mp4"
sidecar = true
"#,
        )
        .unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("AIzaSecret"));
        assert_eq!(
            cfg.api_base_url.as_deref(),
            Some("http://127.0.0.1:8080/youtube/v3")
        );
        assert_eq!(cfg.output_dir, Some(PathBuf::from("/media/videos")));
        assert_eq!(cfg.max_threads, Some(8));
        assert_eq!(cfg.preferred_resolution.as_deref(), Some("720p"));
        assert_eq!(cfg.channel_file, Some(PathBuf::from("/etc/channels.txt")));
        assert_eq!(cfg.database, Some(PathBuf::from("/var/lib/cd.db")));
        assert_eq!(
            cfg.fetch_url_template.as_deref(),
            Some("http://mirror.local/{id}.mp4")
        );
        assert_eq!(cfg.sidecar, Some(true));
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
max_threads = 2 # workers
api_key = "abc#def" # hash inside quotes stays
"#,
        )
        .unwrap();
        assert_eq!(cfg.max_threads, Some(2));
        assert_eq!(cfg.api_key.as_deref(), Some("abc#def"));
    }

    #[test]
    fn test_parse_config_rejects_out_of_range_threads() {
        for raw in ["max_threads = 0", "max_threads = 13"] {
            let err = parse_config_str(raw).unwrap_err();
            assert!(err.to_string().contains("max_threads"), "{err}");
        }
    }

    #[test]
    fn test_parse_config_rejects_bad_resolution() {
        let err = parse_config_str(r#"preferred_resolution = "hd""#).unwrap_err();
        assert!(err.to_string().contains("preferred_resolution"));
    }

    #[test]
    fn test_parse_config_rejects_template_without_id() {
        let err = parse_config_str(r#"fetch_url_template = "http://x/file""#).unwrap_err();
        assert!(err.to_string().contains("fetch_url_template"));
    }

    #[test]
    fn test_parse_config_unknown_key_reports_line() {
        let err = parse_config_str("\nsidecar = true\ncolour = 3").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("colour"), "{message}");
        assert!(message.contains("line 3"), "{message}");
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("api_key = bare").unwrap_err();
        assert!(err.to_string().contains("api_key"));
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::resolve(None, None, None);
        assert!(!settings.loaded_from_file);
        assert_eq!(settings.output_dir, PathBuf::from("."));
        assert_eq!(settings.max_threads, 4);
        assert_eq!(settings.preferred_resolution, "1080p");
        assert_eq!(settings.channel_file, PathBuf::from("channels.txt"));
        assert_eq!(settings.database, PathBuf::from("./channel-downloader.db"));
        assert!(!settings.sidecar);
    }

    #[test]
    fn test_settings_output_dir_override_moves_default_database() {
        let file = FileConfig {
            output_dir: Some(PathBuf::from("/from-file")),
            ..FileConfig::default()
        };
        let settings = Settings::resolve(None, Some(file), Some(PathBuf::from("/from-cli")));
        assert_eq!(settings.output_dir, PathBuf::from("/from-cli"));
        assert_eq!(
            settings.database,
            PathBuf::from("/from-cli/channel-downloader.db")
        );
    }

    #[test]
    fn test_masked_api_key() {
        let mut settings = Settings::resolve(None, None, None);
        assert_eq!(settings.masked_api_key(), "<unset>");
        settings.api_key = Some("AIzaSyExample1234".into());
        assert_eq!(settings.masked_api_key(), "****1234");
        settings.api_key = Some("abc".into());
        assert_eq!(settings.masked_api_key(), "****");
    }

    #[test]
    fn test_load_settings_explicit_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_settings(Some(&missing), None).is_err());
    }

    #[test]
    fn test_load_settings_explicit_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "max_threads = 6\n").unwrap();
        let settings = load_settings(Some(&path), None).unwrap();
        assert!(settings.loaded_from_file);
        assert_eq!(settings.max_threads, 6);
    }

    #[test]
    fn test_channel_list_trims_and_skips_blanks() {
        let channels = parse_channel_list("  @veritasium \n\n# comment\n@3blue1brown\n@veritasium\n");
        assert_eq!(channels, vec!["@veritasium", "@3blue1brown"]);
    }

    #[test]
    fn test_missing_channel_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let channels = load_channel_list(&dir.path().join("channels.txt")).unwrap();
        assert!(channels.is_empty());
    }
}
