use mockito::Matcher;
use std::time::Duration;
use tokio::sync::mpsc;

use event_photo_uploader::errors::{AppError, UploadErrorKind};
use event_photo_uploader::uploader::{
    FileItem, HttpUploadClient, PacingPolicy, SequentialUploader, UploadTransport,
};

const TIMEOUT: Duration = Duration::from_secs(30);

fn photo(name: &str, size: usize) -> FileItem {
    FileItem::new(name, "image/jpeg", vec![b'x'; size])
}

fn no_delays() -> PacingPolicy {
    PacingPolicy {
        default_delay: Duration::ZERO,
        large_file_delay: Duration::ZERO,
        ..PacingPolicy::default()
    }
}

#[tokio::test]
async fn test_multipart_upload_success() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/upload")
        .match_header(
            "content-type",
            Matcher::Regex("multipart/form-data; boundary=.*".to_string()),
        )
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="file-0"; filename="beach.jpg""#.to_string()),
            Matcher::Regex(r#"name="sessionId""#.to_string()),
            Matcher::Regex("summer-party".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"success": true, "results": [{"filename": "beach.jpg", "fileId": "drive-1", "sizeMB": "0.25"}]}"#,
        )
        .create_async()
        .await;

    let client = HttpUploadClient::new(format!("{}/api/upload", server.url()))
        .unwrap()
        .with_chunk_size(64 * 1024);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let response = client
        .send_file(&photo("beach.jpg", 256 * 1024), "summer-party", TIMEOUT, tx)
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(response.file_id(), Some("drive-1"));
    assert_eq!(response.uploaded_size_mb(), Some(0.25));

    let mut ticks = Vec::new();
    while let Ok(percent) = rx.try_recv() {
        ticks.push(percent);
    }
    assert_eq!(ticks, vec![25, 50, 75, 100]);
}

#[tokio::test]
async fn test_payload_too_large_is_classified() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/upload")
        .with_status(413)
        .with_body(r#"{"error": "File too large"}"#)
        .create_async()
        .await;

    let client = HttpUploadClient::new(format!("{}/api/upload", server.url())).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    let failure = client
        .send_file(&photo("huge.jpg", 1024), "event-1", TIMEOUT, tx)
        .await
        .unwrap_err();

    assert_eq!(failure.kind, UploadErrorKind::TooLarge);
    assert_eq!(failure.status, Some(413));
    assert_eq!(failure.reason(), "File too large for server");
}

#[tokio::test]
async fn test_server_error_keeps_error_detail() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/upload")
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": "Drive quota exceeded"}"#)
        .create_async()
        .await;

    let client = HttpUploadClient::new(format!("{}/api/upload", server.url())).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    let failure = client
        .send_file(&photo("a.jpg", 1024), "event-1", TIMEOUT, tx)
        .await
        .unwrap_err();

    assert_eq!(failure.kind, UploadErrorKind::ServerError);
    assert_eq!(
        failure.message,
        "HTTP 500: Internal Server Error - Drive quota exceeded"
    );
    assert!(failure.is_retryable());
}

#[tokio::test]
async fn test_non_json_success_body() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/api/upload")
        .with_status(200)
        .with_body("<html>ok</html>")
        .create_async()
        .await;

    let client = HttpUploadClient::new(format!("{}/api/upload", server.url())).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    let failure = client
        .send_file(&photo("a.jpg", 1024), "event-1", TIMEOUT, tx)
        .await
        .unwrap_err();

    assert_eq!(failure.kind, UploadErrorKind::InvalidResponse);
    assert_eq!(failure.message, "Invalid response format");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
    let client = HttpUploadClient::new("http://127.0.0.1:1/api/upload").unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    let failure = client
        .send_file(&photo("a.jpg", 1024), "event-1", TIMEOUT, tx)
        .await
        .unwrap_err();

    assert_eq!(failure.kind, UploadErrorKind::NetworkError);
    assert_eq!(failure.reason(), "Network error occurred");
}

#[tokio::test]
async fn test_invalid_endpoint_is_rejected() {
    assert!(matches!(
        HttpUploadClient::new("not a url"),
        Err(AppError::Validation { .. })
    ));
    assert!(HttpUploadClient::new("ftp://example.com/upload").is_err());
}

#[tokio::test]
async fn test_pipeline_over_http() {
    let mut server = mockito::Server::new_async().await;
    let ok = server
        .mock("POST", "/api/upload")
        .match_body(Matcher::Regex(r#"filename="(one|three)\.jpg""#.to_string()))
        .with_status(200)
        .with_body(r#"{"success": true, "sizeMB": 0.01}"#)
        .expect(2)
        .create_async()
        .await;
    let rejected = server
        .mock("POST", "/api/upload")
        .match_body(Matcher::Regex(r#"filename="two\.jpg""#.to_string()))
        .with_status(413)
        .create_async()
        .await;

    let client = HttpUploadClient::new(format!("{}/api/upload", server.url())).unwrap();
    let uploader = SequentialUploader::new(client).with_pacing(no_delays());
    let files = vec![
        photo("one.jpg", 10 * 1024),
        photo("two.jpg", 10 * 1024),
        photo("three.jpg", 10 * 1024),
    ];

    let mut statuses = Vec::new();
    let outcome = uploader
        .upload(&files, "event-7", |p| statuses.push(p.status))
        .await
        .unwrap();

    ok.assert_async().await;
    rejected.assert_async().await;

    assert_eq!(outcome.uploaded_files, 2);
    assert_eq!(outcome.failed_files, 1);
    assert_eq!(outcome.results[1].error_kind(), Some(UploadErrorKind::TooLarge));
    assert!((outcome.uploaded_size_mb - 0.02).abs() < 1e-9);
    assert_eq!(
        statuses.last().unwrap(),
        "✅ Upload complete! 2 successful (0.0MB), 1 failed"
    );
}
