//! End-to-end pipeline: YouTube lister and HTTP fetcher against wiremock,
//! a file-backed store, and a channel session in between.

use std::sync::Arc;

use channel_downloader_core::progress::{self, DEFAULT_TICK_CAPACITY};
use channel_downloader_core::{
    ChannelSession, HttpFetcher, ItemState, ProgressEvent, ProgressReporter, SessionConfig,
    YouTubeLister,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::file_store;

async fn mount_api(server: &MockServer, ids: &[&str]) {
    Mock::given(method("GET"))
        .and(path("/api/channels"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "contentDetails": { "relatedPlaylists": { "uploads": "UU1" } } }]
        })))
        .mount(server)
        .await;
    let entries: Vec<_> = ids
        .iter()
        .map(|id| {
            json!({
                "snippet": { "title": format!("Video {id}"), "resourceId": { "videoId": id } }
            })
        })
        .collect();
    Mock::given(method("GET"))
        .and(path("/api/playlistItems"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": entries })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_refresh_and_download_whole_channel() {
    let server = MockServer::start().await;
    mount_api(&server, &["a", "b", "gone"]).await;
    for (id, body) in [("a", vec![1u8; 1000]), ("b", vec![2u8; 2500])] {
        Mock::given(method("GET"))
            .and(path(format!("/media/{id}.mp4")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
            .expect(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/media/gone.mp4"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let (store, _db_dir, _db_path) = file_store().await;
    let lister =
        Arc::new(YouTubeLister::with_base_url("key", format!("{}/api", server.uri())).unwrap());
    let fetcher = Arc::new(HttpFetcher::new(format!("{}/media/{{id}}.mp4", server.uri())).unwrap());
    let mut config = SessionConfig::new(out.path());
    config.write_sidecars = true;
    let mut session = ChannelSession::open("@demo", config, store.clone(), lister, fetcher)
        .await
        .unwrap();

    let summary = session.refresh().await.unwrap();
    assert_eq!(summary.added, 3);

    let (reporter, events) = progress::channel(DEFAULT_TICK_CAPACITY);
    let report = session
        .download_pending(2, reporter)
        .await
        .unwrap()
        .join()
        .await
        .unwrap();
    let events = events.collect().await;

    assert_eq!((report.completed, report.failed), (2, 1));
    let status = session.status();
    assert_eq!((status.completed, status.failed), (2, 1));

    let channel = store.load("demo").await.unwrap();
    let a = channel.item("a").unwrap();
    assert_eq!(a.state, ItemState::Completed);
    assert_eq!(a.size_bytes, Some(1000));
    assert_eq!(std::fs::metadata(&a.output_path).unwrap().len(), 1000);
    assert!(a.output_path.with_extension("mp4.json").is_file());
    let gone = channel.item("gone").unwrap();
    assert_eq!(gone.state, ItemState::Failed);
    assert!(!gone.output_path.exists());
    assert!(events.contains(&ProgressEvent::ItemCompleted {
        id: "b".into(),
        size_bytes: 2500
    }));

    // Second run only retries the removed item; wiremock verifies a and b
    // were requested exactly once.
    let report = session
        .download_pending(2, ProgressReporter::disabled())
        .await
        .unwrap()
        .join()
        .await
        .unwrap();
    assert_eq!((report.completed, report.failed), (0, 1));
}
