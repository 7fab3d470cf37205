//! Integration tests for the multipart storage backend.
//!
//! One wiremock server plays both the storage provider (part PUTs) and the
//! part authority that signs the URL of each following part.

use serde_json::json;
use stream_uploader::cloud::multipart::MultipartClient;
use stream_uploader::cloud::CloudStorageClient;
use stream_uploader::config::MultipartSettings;
use stream_uploader::error::UploadError;
use stream_uploader::models::{StorageLocation, UploadDestination};
use wiremock::matchers::{body_bytes, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_settings() -> MultipartSettings {
    MultipartSettings {
        segment_retry_delay_ms: 1,
        min_timeout_secs: 5,
        ..MultipartSettings::default()
    }
}

async fn client_for(server: &MockServer) -> MultipartClient {
    let mut client = MultipartClient::new("vid-1", &server.uri(), fast_settings()).unwrap();
    client
        .initialize_destination(&UploadDestination {
            url: format!("{}/part/1", server.uri()),
            bucket: "vods".to_string(),
            session: "upload-77".to_string(),
            loc: StorageLocation::Multipart,
        })
        .await
        .unwrap();
    client
}

/// Test that an empty part is never sent
#[tokio::test]
async fn test_empty_part_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"unused\""))
        .expect(0)
        .mount(&server)
        .await;

    let mut client = client_for(&server).await;
    let receipt = client.upload_bytes(&[], true, 4096).await.unwrap();
    assert_eq!(receipt.bytes_accepted, 0);
    assert_eq!(receipt.segment_token, None);
}

/// Test that a successful part returns its ETag as the segment token
#[tokio::test]
async fn test_part_upload_returns_etag() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/part/1"))
        .and(body_bytes(b"segment-one".to_vec()))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag-1\""))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client_for(&server).await;
    let receipt = client.upload_bytes(b"segment-one", false, 0).await.unwrap();
    assert_eq!(receipt.bytes_accepted, 11);
    assert_eq!(receipt.segment_token.as_deref(), Some("\"etag-1\""));
    assert_eq!(client.session_id(), "upload-77");
}

/// Test that a success without an ETag is an integrity failure
#[tokio::test]
async fn test_missing_etag_is_integrity_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut client = client_for(&server).await;
    let err = client.upload_bytes(b"data", false, 0).await.unwrap_err();
    assert!(matches!(err, UploadError::Integrity(_)));
}

/// Test that a rejected part is reported as a transient network failure
#[tokio::test]
async fn test_rejected_part_is_transient_failure() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403).set_body_string("SignatureDoesNotMatch"))
        .mount(&server)
        .await;

    let mut client = client_for(&server).await;
    let err = client.upload_bytes(b"data", false, 0).await.unwrap_err();
    match err {
        UploadError::TransientNetwork(msg) => assert!(msg.contains("403")),
        other => panic!("unexpected error {:?}", other),
    }
}

/// Test that a new segment fetches the next part URL and later parts go there
#[tokio::test]
async fn test_new_segment_switches_part_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vod/vid-1/upload/part"))
        .and(query_param("part", "2"))
        .and(query_param("bucket", "vods"))
        .and(query_param("session", "upload-77"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": format!("{}/part/2", server.uri()),
            "loc": 2
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/part/2"))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", "etag-2"))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = client_for(&server).await;
    assert_eq!(client.current_part(), 1);
    client.start_new_segment().await.unwrap();
    assert_eq!(client.current_part(), 2);

    let receipt = client.upload_bytes(b"second", true, 100).await.unwrap();
    assert_eq!(receipt.segment_token.as_deref(), Some("etag-2"));
    // bucket and session carry over when the authority omits them
    assert_eq!(client.session_id(), "upload-77");
}

/// Test that an unreachable authority fails after the configured attempts
#[tokio::test]
async fn test_segment_negotiation_exhausts_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/vod/vid-1/upload/part"))
        .respond_with(ResponseTemplate::new(500))
        .expect(5)
        .mount(&server)
        .await;

    let mut client = client_for(&server).await;
    let err = client.start_new_segment().await.unwrap_err();
    assert!(matches!(err, UploadError::SegmentNegotiation(_)));
    assert!(err.is_fatal());
}
