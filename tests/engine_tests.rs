//! End-to-end tests for the upload engine against a wiremock provider.
//!
//! The engine blocks its caller while it joins the uploader thread, so the
//! engine side of every test runs on a blocking task while the mock server
//! keeps serving on the async workers.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use stream_uploader::cloud::{upload_to_cloud, CloudUploadRequest, UploadEngine};
use stream_uploader::config::PipelineConfig;
use stream_uploader::error::UploadError;
use stream_uploader::models::{Packet, ProgressFn, StorageLocation, UploadDestination};
use tempfile::NamedTempFile;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MIB: usize = 1024 * 1024;

fn quick_retry_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.backoff.base_delay_ms = 0;
    config.backoff.max_delay_ms = 5;
    config.backoff.jitter_ms = 0;
    config.upload.tick_interval_ms = 5;
    config
}

fn session_destination(server: &MockServer) -> UploadDestination {
    UploadDestination {
        url: format!("{}/session/xyz", server.uri()),
        bucket: "vods".to_string(),
        session: "xyz".to_string(),
        loc: StorageLocation::ResumableSession,
    }
}

fn wait_for_upload(engine: &UploadEngine, bytes: u64) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if engine.uploaded_bytes() >= bytes {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

/// Test a 10 MiB stream split into one full chunk and a final remainder
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_resumable_stream_chunking() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/session/xyz"))
        .and(header("content-range", "bytes 0-8388607/*"))
        .respond_with(ResponseTemplate::new(308).insert_header("Range", "bytes=0-8388607"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/session/xyz"))
        .and(header("content-range", "bytes 8388608-10485759/10485760"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let destination = session_destination(&server);
    let config = quick_retry_config();

    tokio::task::spawn_blocking(move || {
        let engine = UploadEngine::new("vod-e2e", &destination, &config).unwrap();
        assert_eq!(engine.session_id(), "xyz");

        for _ in 0..10 {
            engine.submit(Packet::from(vec![7u8; MIB])).unwrap();
        }
        assert!(wait_for_upload(&engine, 8 * MIB as u64));

        engine.flush().unwrap();
        assert_eq!(engine.uploaded_bytes(), 10 * MIB as u64);
        assert_eq!(engine.pending_bytes(), 0);
        assert!(engine.segment_ids().is_empty());
    })
    .await
    .unwrap();
}

/// Test that a transient failure is retried and the stream still completes
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(header("content-range", "bytes 0-99/100"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let destination = session_destination(&server);
    let config = quick_retry_config();

    tokio::task::spawn_blocking(move || {
        let engine = UploadEngine::new("vod-retry", &destination, &config).unwrap();
        engine.submit(Packet::from(vec![1u8; 100])).unwrap();
        engine.flush().unwrap();
        assert_eq!(engine.uploaded_bytes(), 100);
    })
    .await
    .unwrap();
}

/// Test that running out of attempts fails the stream and rejects new packets
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_retry_budget_exhaustion() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let destination = session_destination(&server);
    let mut config = quick_retry_config();
    config.upload.max_retries = 2;

    tokio::task::spawn_blocking(move || {
        let engine = UploadEngine::new("vod-fail", &destination, &config).unwrap();
        engine.submit(Packet::from(vec![1u8; 64])).unwrap();

        let err = engine.flush().unwrap_err();
        assert!(matches!(err, UploadError::RetryBudgetExhausted { attempts: 2, .. }));
        assert!(engine.is_failed());
        assert_eq!(engine.uploaded_bytes(), 0);
        // New packets are refused with the error that ended the stream
        assert_eq!(engine.submit(Packet::from(vec![1u8; 8])), Err(err.clone()));
        // The stored outcome is returned again
        assert_eq!(engine.flush().unwrap_err(), err);
    })
    .await
    .unwrap();
}

/// Test a multipart stream committing three parts in order
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_multipart_stream_collects_part_tokens() {
    let server = MockServer::start().await;
    for part in 1..=3 {
        Mock::given(method("PUT"))
            .and(path(format!("/part/{}", part)))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", format!("e{}", part).as_str()))
            .expect(1)
            .mount(&server)
            .await;
    }
    for part in 2..=3 {
        Mock::given(method("GET"))
            .and(path("/vod/vod-parts/upload/part"))
            .and(query_param("part", part.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": format!("{}/part/{}", server.uri(), part),
                "bucket": "vods",
                "session": "mp-1",
                "loc": 2
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let destination = UploadDestination {
        url: format!("{}/part/1", server.uri()),
        bucket: "vods".to_string(),
        session: "mp-1".to_string(),
        loc: StorageLocation::Multipart,
    };
    let mut config = quick_retry_config();
    config.upload.chunk_size_bytes = 1024;
    config.multipart.part_authority_url = Some(server.uri());

    tokio::task::spawn_blocking(move || {
        let engine = UploadEngine::new("vod-parts", &destination, &config).unwrap();
        engine.submit(Packet::from(vec![9u8; 2500])).unwrap();
        assert!(wait_for_upload(&engine, 2048));

        engine.flush().unwrap();
        assert_eq!(engine.uploaded_bytes(), 2500);
        assert_eq!(engine.segment_ids(), vec!["e1", "e2", "e3"]);
        assert_eq!(engine.session_id(), "mp-1");
    })
    .await
    .unwrap();
}

/// Test that an upload aborting while the file is still being fed reports the abort
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upload_to_cloud_surfaces_abort_during_feed() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let mut file = NamedTempFile::new().unwrap();
    let block = vec![3u8; MIB];
    for _ in 0..64 {
        file.write_all(&block).unwrap();
    }
    file.flush().unwrap();

    let request = CloudUploadRequest {
        task: "task-abort".to_string(),
        file: file.path().to_string_lossy().into_owned(),
        destination: session_destination(&server),
    };
    let mut config = quick_retry_config();
    config.upload.max_retries = 1;
    config.upload.chunk_size_bytes = 1024;

    let err = tokio::task::spawn_blocking(move || {
        let result = upload_to_cloud(&request, &config, None);
        drop(file);
        result.unwrap_err()
    })
    .await
    .unwrap();

    assert!(matches!(err, UploadError::RetryBudgetExhausted { attempts: 1, .. }));
    assert!(err.is_fatal());
}

/// Test uploading a finished local file with progress reporting
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_upload_to_cloud_reports_progress() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(header("content-range", "bytes 0-2999/3000"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&[5u8; 3000]).unwrap();
    file.flush().unwrap();

    let request = CloudUploadRequest {
        task: "task-9".to_string(),
        file: file.path().to_string_lossy().into_owned(),
        destination: session_destination(&server),
    };
    let config = quick_retry_config();

    let reported = tokio::task::spawn_blocking(move || {
        let reported = Arc::new(AtomicU64::new(0));
        let sink = Arc::clone(&reported);
        let progress: ProgressFn = Arc::new(move |_dl_total: u64, _dl_now: u64, ul_total: u64, ul_now: u64| {
            assert_eq!(ul_total, 3000);
            sink.store(ul_now, Ordering::SeqCst);
        });

        let result = upload_to_cloud(&request, &config, Some(progress)).unwrap();
        assert_eq!(result.uploaded_bytes, 3000);
        assert_eq!(result.session, "xyz");
        drop(file);
        reported.load(Ordering::SeqCst)
    })
    .await
    .unwrap();

    assert_eq!(reported, 3000);
}
