//! End-to-end resolution against mocked providers and a scripted extraction tool.

mod common;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use url::Url;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::fixtures::{self, VIDEO_ID, VIDEO_LINK, VIDEO_TITLE};
use common::mocks::{ScriptedTool, failed, ok};
use common::{Sandbox, fast_options};
use rusty_resolver::audio_sources::ResolveOptions;
use rusty_resolver::audio_sources::catalog_api::CatalogApi;
use rusty_resolver::audio_sources::provider_chain::ProviderChain;
use rusty_resolver::audio_sources::stream_api::StreamApi;
use rusty_resolver::utils::ytdlp::ToolMode;
use rusty_resolver::{MediaRequest, ResolvedSource};

const CANONICAL_LINK: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

fn stream_chain(server: &MockServer, options: ResolveOptions) -> ProviderChain {
    let api = StreamApi::with_client(Client::new(), Url::parse(&server.uri()).unwrap());
    ProviderChain::new(options).with_provider(Arc::new(api))
}

/// A tool that must never run.
fn idle_tool() -> Arc<ScriptedTool> {
    Arc::new(ScriptedTool::new(|inv| failed(&format!("unexpected invocation {:?}", inv))))
}

/// Serves lookups, download metadata and downloads for the sample video.
fn download_tool(total_mb: u64, probe: Option<&'static str>) -> Arc<ScriptedTool> {
    Arc::new(ScriptedTool::new(move |inv| match (&inv.mode, inv.format.as_deref()) {
        (ToolMode::GetUrl, _) => match probe {
            Some(url) => ok(format!("{}\n", url)),
            None => failed("ERROR: Requested format is not available"),
        },
        (ToolMode::DumpJson, None) => ok(fixtures::video_info(total_mb)),
        (ToolMode::DumpJson, Some(_)) => ok(fixtures::download_info("m4a")),
        (ToolMode::Download { .. }, _) => ok(""),
        (ToolMode::FlatPlaylistIds { .. }, _) => failed("not a playlist"),
    }))
}

#[tokio::test]
async fn test_immediate_audio_response_is_streamed() {
    common::init();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/downloads/stream"))
        .and(query_param("query", "Bohemian Rhapsody"))
        .respond_with(
            ResponseTemplate::new(302).insert_header("Location", format!("{}/files/q.mp3", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/q.mp3"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "audio/mpeg"))
        .mount(&server)
        .await;

    let sandbox = Sandbox::with_accounts(1);
    let tool = idle_tool();
    let policy = sandbox.policy(stream_chain(&server, fast_options()), tool.clone());

    let (location, is_local) = policy
        .resolve(&MediaRequest::audio("Bohemian Rhapsody"))
        .await
        .unwrap()
        .into_pair();

    assert_eq!(location, format!("{}/files/q.mp3", server.uri()));
    assert!(!is_local);
    assert!(tool.invocations().is_empty());
}

#[tokio::test]
async fn test_render_job_completing_after_three_seconds_is_streamed() {
    common::init();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/downloads/stream"))
        .respond_with(
            ResponseTemplate::new(202)
                .set_body_json(fixtures::accepted_job("/api/downloads/9/status", "/api/downloads/9/file")),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/downloads/9/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::job_status("processing")))
        .up_to_n_times(3)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/downloads/9/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::job_status("completed")))
        .mount(&server)
        .await;

    let sandbox = Sandbox::with_accounts(1);
    let policy = sandbox.policy(stream_chain(&server, ResolveOptions::default()), idle_tool());

    let started = Instant::now();
    let source = policy
        .resolve(&MediaRequest::audio("Bohemian Rhapsody"))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(
        source,
        ResolvedSource::remote(Url::parse(&format!("{}/api/downloads/9/file", server.uri())).unwrap())
    );
    // Polls at 0s, 1s and 2s are pending, the one at 3s completes
    assert!(elapsed >= Duration::from_millis(2900), "returned after {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(4500), "returned after {:?}", elapsed);
}

#[tokio::test]
async fn test_exhausted_providers_fall_back_to_local_audio() {
    common::init();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/downloads/stream"))
        .and(query_param("query", VIDEO_TITLE))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/search/songs"))
        .and(query_param("query", VIDEO_TITLE))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::empty_catalog_search()))
        .expect(1)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let chain = ProviderChain::new(fast_options())
        .with_provider(Arc::new(StreamApi::with_client(Client::new(), base.clone())))
        .with_provider(Arc::new(CatalogApi::with_client(Client::new(), base)));

    let sandbox = Sandbox::with_accounts(3);
    let tool = download_tool(10, None);
    let policy = sandbox.policy(chain, tool.clone());

    let source = policy.resolve(&MediaRequest::audio(VIDEO_LINK)).await.unwrap();

    let expected = sandbox.downloads.path().join(format!("{}.m4a", VIDEO_ID));
    assert_eq!(source, ResolvedSource::local(expected.clone()));
    assert!(expected.exists());
    assert_eq!(tool.downloads(), 1);
    // The link reached the tool without its tracking parameters
    assert!(tool.invocations().iter().all(|inv| inv.target == CANONICAL_LINK));
    // Lookup and extraction alike run with a rotated credential
    assert_eq!(tool.invocations().len(), 3);
    assert!(
        tool.invocations()
            .iter()
            .all(|inv| inv.cookies.as_ref().is_some_and(|c| c.starts_with(sandbox.cookies.path())))
    );
}

#[tokio::test]
async fn test_repeated_audio_request_reuses_the_download() {
    common::init();
    let sandbox = Sandbox::with_accounts(1);
    let tool = download_tool(10, None);
    let policy = sandbox.policy(ProviderChain::default(), tool.clone());
    let request = MediaRequest::audio(VIDEO_LINK);

    let first = policy.resolve(&request).await.unwrap();
    let second = policy.resolve(&request).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(tool.downloads(), 1);
}

#[tokio::test]
async fn test_oversized_video_is_refused() {
    common::init();
    let sandbox = Sandbox::with_accounts(1);
    let tool = download_tool(300, None);
    let policy = sandbox.policy(ProviderChain::default(), tool.clone());

    let source = policy.resolve(&MediaRequest::video(VIDEO_LINK)).await;

    assert_eq!(source, None);
    assert_eq!(tool.count(|inv| inv.mode == ToolMode::GetUrl), 1);
    assert_eq!(tool.downloads(), 0);
}

#[tokio::test]
async fn test_video_at_the_size_ceiling_is_downloaded() {
    common::init();
    let sandbox = Sandbox::with_accounts(1);
    let tool = download_tool(250, None);
    let policy = sandbox.policy(ProviderChain::default(), tool.clone());

    let (location, is_local) = policy
        .resolve(&MediaRequest::video(VIDEO_LINK))
        .await
        .unwrap()
        .into_pair();

    assert!(is_local);
    assert!(location.ends_with(&format!("{}.mp4", VIDEO_ID)));
    assert_eq!(tool.downloads(), 1);
}

#[tokio::test]
async fn test_probed_video_is_streamed_without_download() {
    common::init();
    let sandbox = Sandbox::with_accounts(1);
    let tool = download_tool(300, Some("https://rr3.example/videoplayback?itag=22"));
    let policy = sandbox.policy(ProviderChain::default(), tool.clone());

    let source = policy.resolve(&MediaRequest::video(VIDEO_LINK)).await.unwrap();

    assert!(!source.is_local_file());
    assert_eq!(tool.invocations().len(), 1);
}

#[tokio::test]
async fn test_song_audio_lands_under_its_title() {
    common::init();
    let sandbox = Sandbox::with_accounts(1);
    let tool = download_tool(10, None);
    let policy = sandbox.policy(ProviderChain::default(), tool.clone());

    let source = policy
        .resolve(&MediaRequest::song_audio(VIDEO_LINK, "140", "Track"))
        .await
        .unwrap();

    let expected = sandbox.downloads.path().join("Track.mp3");
    assert_eq!(source, ResolvedSource::local(expected.clone()));
    assert!(expected.exists());
    let download = tool
        .invocations()
        .into_iter()
        .find(|inv| matches!(inv.mode, ToolMode::Download { .. }))
        .unwrap();
    assert_eq!(download.format.as_deref(), Some("140"));
}

#[tokio::test]
async fn test_missing_credentials_only_fail_the_request() {
    common::init();
    let sandbox = Sandbox::with_accounts(0);
    let tool = download_tool(10, None);
    let policy = sandbox.policy(ProviderChain::default(), tool.clone());

    let source = policy
        .resolve(&MediaRequest::song_video(VIDEO_LINK, "137", "Clip"))
        .await;

    assert_eq!(source, None);
    assert!(tool.invocations().is_empty());
}

#[tokio::test]
async fn test_dropping_the_request_stops_polling() {
    common::init();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/downloads/stream"))
        .respond_with(ResponseTemplate::new(202).set_body_json(fixtures::accepted_job("/s", "/f")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/s"))
        .respond_with(ResponseTemplate::new(200).set_body_json(fixtures::job_status("queued")))
        .mount(&server)
        .await;

    let sandbox = Sandbox::with_accounts(1);
    let policy = sandbox.policy(stream_chain(&server, fast_options()), idle_tool());
    let request = MediaRequest::audio("Song");

    let outcome = tokio::time::timeout(Duration::from_millis(300), policy.resolve(&request)).await;
    assert!(outcome.is_err());
    // Let a poll that was already on the wire land before counting
    tokio::time::sleep(Duration::from_millis(100)).await;

    let polls = |requests: Vec<wiremock::Request>| requests.iter().filter(|r| r.url.path() == "/s").count();
    let before = polls(server.received_requests().await.unwrap());
    tokio::time::sleep(Duration::from_millis(300)).await;
    let after = polls(server.received_requests().await.unwrap());

    assert!(before > 0);
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_concurrent_requests_resolve_independently() {
    common::init();
    let server = MockServer::start().await;
    for name in ["one", "two"] {
        Mock::given(method("GET"))
            .and(path("/api/downloads/stream"))
            .and(query_param("query", name))
            .respond_with(
                ResponseTemplate::new(302)
                    .insert_header("Location", format!("{}/files/{}.mp3", server.uri(), name)),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/api/downloads/stream"))
        .and(query_param("query", "three"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).insert_header("Content-Type", "audio/mpeg"))
        .mount(&server)
        .await;

    let sandbox = Sandbox::with_accounts(1);
    let tool = Arc::new(
        ScriptedTool::new(|inv| match inv.mode {
            ToolMode::DumpJson => ok(fixtures::download_info("webm")),
            _ => ok(""),
        })
        .with_download_ext("webm"),
    );
    let policy = sandbox.policy(stream_chain(&server, fast_options()), tool.clone());

    let requests: Vec<_> = ["one", "two", "three"].into_iter().map(MediaRequest::audio).collect();
    let results = join_all(requests.iter().map(|r| policy.resolve(r))).await;

    let local: Vec<bool> = results
        .into_iter()
        .map(|r| r.map(|s| s.is_local_file()).unwrap_or(false))
        .collect();
    assert_eq!(local, vec![false, false, true]);
    assert_eq!(tool.downloads(), 1);
}
