//! End-to-end CLI tests for the channel-downloader binary.

use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Binary isolated from the user's config, running inside `dir`.
fn cmd(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("channel-downloader").unwrap();
    cmd.current_dir(dir)
        .env("XDG_CONFIG_HOME", dir.join("xdg"))
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_binary_help_displays_usage() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resumable bulk downloader"))
        .stdout(predicate::str::contains("download"));
}

#[test]
fn test_binary_version_displays_version() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("channel-downloader"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path()).assert().failure();
}

#[test]
fn test_binary_invalid_threads_rejected() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .args(["download", "@c", "--threads", "20"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_settings_defaults_without_config_file() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .arg("settings")
        .assert()
        .success()
        .stdout(predicate::str::contains("not found (using defaults)"))
        .stdout(predicate::str::contains("max_threads = 4"))
        .stdout(predicate::str::contains("preferred_resolution = 1080p"))
        .stdout(predicate::str::contains("fetcher = yt-dlp"));
}

#[test]
fn test_settings_masks_api_key() {
    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        "api_key = \"AIzaSyVerySecret9876\"\nmax_threads = 7\nsidecar = true\n",
    );
    cmd(dir.path())
        .arg("settings")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("api_key = ****9876"))
        .stdout(predicate::str::contains("VerySecret").not())
        .stdout(predicate::str::contains("max_threads = 7"))
        .stdout(predicate::str::contains("sidecar = true"));
}

#[test]
fn test_settings_reads_default_config_location() {
    let dir = TempDir::new().unwrap();
    let config_dir = dir.path().join("xdg").join("channel-downloader");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("config.toml"), "max_threads = 9\n").unwrap();
    cmd(dir.path())
        .arg("settings")
        .assert()
        .success()
        .stdout(predicate::str::contains("config_file = loaded"))
        .stdout(predicate::str::contains("max_threads = 9"));
}

#[test]
fn test_invalid_config_reports_key_and_line() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "max_threads = 2\nspeed = 11\n");
    cmd(dir.path())
        .args(["--config"])
        .arg(&config)
        .arg("settings")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown configuration key: 'speed' on line 2"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .args(["settings", "--config", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_channels_lists_configured_handles() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("channels.txt"), "@veritasium\n\n  @3blue1brown  \n").unwrap();
    cmd(dir.path())
        .arg("channels")
        .assert()
        .success()
        .stdout(predicate::str::contains("@veritasium"))
        .stdout(predicate::str::contains("@3blue1brown"))
        .stdout(predicate::str::contains("never"));
}

#[test]
fn test_channels_without_channel_file() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .arg("channels")
        .assert()
        .success()
        .stdout(predicate::str::contains("No channels configured"));
}

#[test]
fn test_status_of_unknown_channel_is_empty() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .args(["status", "@nobody"])
        .assert()
        .success()
        .stdout(predicate::str::contains("channel     = nobody"))
        .stdout(predicate::str::contains("total       = 0"));
}

#[test]
fn test_list_of_unknown_channel_suggests_refresh() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .args(["list", "@nobody"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No items known"));
}

#[test]
fn test_refresh_without_api_key_fails() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .args(["refresh", "@veritasium"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no listing API key configured"));
}

#[test]
fn test_download_of_empty_channel_has_nothing_to_do() {
    let dir = TempDir::new().unwrap();
    cmd(dir.path())
        .args(["download", "@veritasium", "--no-refresh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to download"));
}

async fn mount_channel(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "contentDetails": { "relatedPlaylists": { "uploads": "UU1" } } }]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/playlistItems"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "snippet": { "title": "Alpha", "resourceId": { "videoId": "a" } } },
                { "snippet": { "title": "Beta", "resourceId": { "videoId": "b" } } }
            ]
        })))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/a.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 128]))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/media/b.mp4"))
        .respond_with(ResponseTemplate::new(410))
        .mount(server)
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_refresh_download_and_list_against_mock_api() {
    let server = MockServer::start().await;
    mount_channel(&server).await;

    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        &format!(
            "api_key = \"k\"\napi_base_url = \"{uri}/api\"\nfetch_url_template = \"{uri}/media/{{id}}.mp4\"\noutput_dir = \"{out}\"\n",
            uri = server.uri(),
            out = dir.path().join("out").display()
        ),
    );

    let workdir = dir.path().to_path_buf();
    tokio::task::spawn_blocking(move || {
        cmd(&workdir)
            .arg("--config")
            .arg(&config)
            .args(["download", "@demo", "--threads", "2"])
            .assert()
            .code(2)
            .stdout(predicate::str::contains("demo: 1 completed, 1 failed"));

        cmd(&workdir)
            .arg("--config")
            .arg(&config)
            .args(["list", "@demo"])
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"))
            .stdout(predicate::str::contains("Alpha"))
            .stdout(predicate::str::contains("failed"))
            .stdout(predicate::str::contains("removed"));

        cmd(&workdir)
            .arg("--config")
            .arg(&config)
            .arg("channels")
            .assert()
            .success()
            .stdout(predicate::str::contains("demo"));
    })
    .await
    .unwrap();

    assert_eq!(
        fs::metadata(dir.path().join("out").join("demo").join("a.mp4"))
            .unwrap()
            .len(),
        128
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_item_to_chosen_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/pick.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = write_config(
        dir.path(),
        &format!(
            "fetch_url_template = \"{uri}/media/{{id}}.mp4\"\noutput_dir = \"{out}\"\n",
            uri = server.uri(),
            out = dir.path().join("out").display()
        ),
    );
    let target = dir.path().join("chosen").join("clip.mp4");

    let workdir = dir.path().to_path_buf();
    let target_arg = target.clone();
    tokio::task::spawn_blocking(move || {
        cmd(&workdir)
            .arg("--config")
            .arg(&config)
            .args(["download-item", "@demo", "pick", "--sidecar", "--output"])
            .arg(&target_arg)
            .assert()
            .success()
            .stdout(predicate::str::contains("demo/pick: completed, 64 bytes"));

        cmd(&workdir)
            .arg("--config")
            .arg(&config)
            .args(["status", "@demo"])
            .assert()
            .success()
            .stdout(predicate::str::contains("completed   = 1"));
    })
    .await
    .unwrap();

    assert_eq!(fs::metadata(&target).unwrap().len(), 64);
    assert!(dir.path().join("chosen").join("clip.mp4.json").is_file());
}
