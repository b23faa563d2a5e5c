//! Integration tests for the download engine.
//!
//! These tests run DownloadEngine against a mock HTTP server and check
//! telemetry pairing, the concurrency bound, fail-fast dispatch, throttling
//! and local file output.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hls_fetch_core::download::{DownloadError, OutputMode, Throttle};
use hls_fetch_core::events::{
    SEGMENT_COMPLETED, SEGMENT_DOWNLOAD_TIME, SEGMENT_STARTED, STREAM_DOWNLOAD_TIME,
};
use hls_fetch_core::manifest::{Resource, ResourceKind};
use hls_fetch_core::{DownloadEngine, EngineError, HttpClient, RecordingSink, RetryPolicy};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        mock_server
    }};
}

// ==================== Helper Functions ====================

fn segment(base: &str, name: &str) -> Resource {
    Resource {
        kind: ResourceKind::Segment,
        uri: Some(format!("{base}/{name}")),
        local_file: PathBuf::from(name),
        content: None,
        key: None,
        iv: None,
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(2, Duration::from_millis(10))
}

async fn serve_segments(server: &MockServer, count: usize, delay: Duration) -> Vec<Resource> {
    let mut resources = Vec::with_capacity(count);
    for i in 0..count {
        let name = format!("seg{i}.ts");
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(vec![0x47u8; 188])
                    .set_delay(delay),
            )
            .mount(server)
            .await;
        resources.push(segment(&server.uri(), &name));
    }
    resources
}

// ==================== Telemetry ====================

#[tokio::test]
async fn test_twenty_segments_emit_paired_counters() {
    let mock_server = require_mock_server!();
    let resources = serve_segments(&mock_server, 20, Duration::ZERO).await;
    let sink = Arc::new(RecordingSink::new());
    let engine = DownloadEngine::new(4, fast_retry(), None).unwrap();

    let report = engine
        .download(&resources, &HttpClient::new(), OutputMode::Discard, sink.clone())
        .await
        .unwrap();

    assert_eq!(report.completed, 20);
    assert_eq!(report.bytes, 20 * 188);
    assert_eq!(sink.counter_value(SEGMENT_STARTED), 20);
    assert_eq!(sink.counter_value(SEGMENT_COMPLETED), 20);
    assert_eq!(sink.stats_for(SEGMENT_DOWNLOAD_TIME).len(), 20);
    assert_eq!(sink.stats_for(STREAM_DOWNLOAD_TIME).len(), 1);
    assert!(sink.errors().is_empty());
}

// ==================== Concurrency ====================

#[tokio::test]
async fn test_in_flight_never_exceeds_concurrency() {
    let mock_server = require_mock_server!();
    let resources = serve_segments(&mock_server, 10, Duration::from_millis(100)).await;
    let sink = Arc::new(RecordingSink::new());
    let engine = DownloadEngine::new(2, fast_retry(), None).unwrap();

    let started = Instant::now();
    let report = engine
        .download(&resources, &HttpClient::new(), OutputMode::Discard, sink.clone())
        .await
        .unwrap();

    assert_eq!(report.completed, 10);
    assert!(report.peak_in_flight <= 2, "peak was {}", report.peak_in_flight);
    // Five waves of two 100 ms responses.
    assert!(started.elapsed() >= Duration::from_millis(450));
}

// ==================== Fail-fast ====================

#[tokio::test]
async fn test_first_failure_stops_dispatch() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/bad.ts"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/later.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 10]))
        .expect(0)
        .mount(&mock_server)
        .await;

    let resources = vec![
        segment(&mock_server.uri(), "bad.ts"),
        segment(&mock_server.uri(), "later.ts"),
        segment(&mock_server.uri(), "later.ts"),
    ];
    let sink = Arc::new(RecordingSink::new());
    let engine = DownloadEngine::new(1, fast_retry(), None).unwrap();

    let result = engine
        .download(&resources, &HttpClient::new(), OutputMode::Discard, sink.clone())
        .await;

    match result {
        Err(EngineError::Download {
            kind: ResourceKind::Segment,
            source: DownloadError::HttpStatus { status: 500, .. },
        }) => {}
        other => panic!("expected segment HTTP 500 failure, got {other:?}"),
    }
    assert_eq!(sink.counter_value(SEGMENT_STARTED), 1);
    assert_eq!(sink.counter_value(SEGMENT_COMPLETED), 1);
    assert_eq!(sink.stats_for(STREAM_DOWNLOAD_TIME).len(), 1);
}

#[tokio::test]
async fn test_retry_recovers_from_one_failure() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/flaky.ts"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 64]))
        .mount(&mock_server)
        .await;

    let resources = vec![segment(&mock_server.uri(), "flaky.ts")];
    let sink = Arc::new(RecordingSink::new());
    let engine = DownloadEngine::new(1, fast_retry(), None).unwrap();

    let report = engine
        .download(&resources, &HttpClient::new(), OutputMode::Discard, sink.clone())
        .await
        .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.retried, 1);
    assert_eq!(report.bytes, 64);
    assert_eq!(sink.counter_value(SEGMENT_STARTED), 1);
}

// ==================== Throttle ====================

#[tokio::test]
async fn test_throttle_paces_each_response() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/big.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4000]))
        .mount(&mock_server)
        .await;

    let resources = vec![
        segment(&mock_server.uri(), "big.ts"),
        segment(&mock_server.uri(), "big.ts"),
    ];
    let sink = Arc::new(RecordingSink::new());
    let engine = DownloadEngine::new(2, fast_retry(), Throttle::new(8000)).unwrap();

    let started = Instant::now();
    let report = engine
        .download(&resources, &HttpClient::new(), OutputMode::Discard, sink.clone())
        .await
        .unwrap();

    assert_eq!(report.bytes, 8000);
    // Throttling is per response, so two parallel bodies take about 500 ms, not 1 s.
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(450), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_millis(950), "elapsed {elapsed:?}");
}

// ==================== Output ====================

#[tokio::test]
async fn test_local_files_mode_writes_tree() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/seg0.ts"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"segment-bytes".to_vec()))
        .mount(&mock_server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let manifest_file = temp_dir.path().join("master.m3u8");
    let segment_file = temp_dir.path().join("manifest0").join("seg0.ts");
    let resources = vec![
        Resource {
            kind: ResourceKind::Manifest,
            uri: Some(format!("{}/master.m3u8", mock_server.uri())),
            local_file: manifest_file.clone(),
            content: Some("#EXTM3U\nmanifest0/seg0.ts\n".to_string()),
            key: None,
            iv: None,
        },
        Resource {
            local_file: segment_file.clone(),
            ..segment(&mock_server.uri(), "seg0.ts")
        },
    ];
    let sink = Arc::new(RecordingSink::new());
    let engine = DownloadEngine::new(4, fast_retry(), None).unwrap();

    let report = engine
        .download(&resources, &HttpClient::new(), OutputMode::LocalFiles, sink.clone())
        .await
        .unwrap();

    assert_eq!(report.completed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        std::fs::read_to_string(&manifest_file).unwrap(),
        "#EXTM3U\nmanifest0/seg0.ts\n"
    );
    assert_eq!(std::fs::read(&segment_file).unwrap(), b"segment-bytes");
}
