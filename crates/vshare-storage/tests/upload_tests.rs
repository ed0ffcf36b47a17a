//! Object store client against a local S3 stand-in.

use std::time::Duration;

use vshare_storage::{ObjectStore, ObjectStoreClient, ObjectStoreConfig, StorageError};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer, upload_timeout: Duration) -> ObjectStoreClient {
    ObjectStoreClient::new(ObjectStoreConfig {
        endpoint_url: server.uri(),
        access_key_id: "test-key".to_string(),
        secret_access_key: "test-secret".to_string(),
        region: "us-east-1".to_string(),
        upload_timeout,
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_upload_puts_object_path_style() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/thumbnails/u1/thumbs/v1/t1.jpg"))
        .and(header("content-type", "image/jpeg"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(10)).await;

    client
        .upload_object("thumbnails", "u1/thumbs/v1/t1.jpg", vec![0xff, 0xd8, 0xff], "image/jpeg")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stalled_upload_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_millis(300)).await;

    let started = std::time::Instant::now();
    let err = client
        .upload_object("thumbnails", "u1/thumbs/v1/t2.jpg", vec![1u8; 16], "image/jpeg")
        .await
        .unwrap_err();

    assert!(matches!(err, StorageError::Timeout(_)), "got {err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_check_bucket_reachable() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(10)).await;

    client.check_bucket("thumbnails").await.unwrap();
}

#[tokio::test]
async fn test_check_bucket_missing() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client_for(&server, Duration::from_secs(10)).await;

    let err = client.check_bucket("videos").await.unwrap_err();
    assert!(matches!(err, StorageError::ConfigError(_)), "got {err:?}");
}
