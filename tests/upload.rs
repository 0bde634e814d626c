use std::{
    io::Write,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    Router,
    body::Bytes,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use file_transfer::{
    FileUriResolver, NoProgress, ProgressEvent, ProgressSink, UploadClient, UploadError,
    UploadOptions, UploadRequest,
};
use serde_json::json;
use tempfile::NamedTempFile;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::oneshot,
};

async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

async fn echo(body: Bytes) -> String {
    String::from_utf8_lossy(&body).into_owned()
}

/// Echoes the request headers that matter to the multipart contract.
async fn echo_headers(headers: HeaderMap, _body: Bytes) -> String {
    let tags: Vec<_> = headers
        .get_all("x-tag")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    json!({
        "content_type": headers["content-type"].to_str().unwrap(),
        "content_types": headers.get_all("content-type").iter().count(),
        "content_length": headers.get("content-length").map(|v| v.to_str().unwrap().to_string()),
        "tags": tags,
    })
    .to_string()
}

/// Answers every upload with a 500 whose body stops short of its declared length.
async fn spawn_truncating_server() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 4096];
        while !request.ends_with(b"--\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\nshort")
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });
    addr
}

async fn reject(_body: Bytes) -> (StatusCode, &'static str) {
    (StatusCode::INTERNAL_SERVER_ERROR, "storage offline")
}

fn temp_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents).unwrap();
    file.flush().unwrap();
    file
}

fn recorder() -> (Arc<Mutex<Vec<ProgressEvent>>>, impl ProgressSink + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = Arc::clone(&events);
    let sink = move |event: ProgressEvent| sink_events.lock().unwrap().push(event);
    (events, sink)
}

#[tokio::test]
async fn test_upload_returns_echoed_body() {
    let addr = spawn_server(Router::new().route("/upload", post(echo))).await;
    let contents: Vec<u8> = (0..1024).map(|i| b'a' + (i % 26) as u8).collect();
    let file = temp_file(&contents);

    let request = UploadRequest::builder(format!("http://{addr}/upload"), file.path())
        .file_field("photo")
        .file_name("notes.txt")
        .mime_type("text/plain")
        .field("caption", "hello")
        .build()
        .unwrap();
    let (events, sink) = recorder();

    let body = UploadClient::new().upload(request, sink).await.unwrap();

    assert!(body.contains("Content-Disposition: form-data; name=\"photo\"; filename=\"notes.txt\""));
    assert!(body.contains("Content-Type: text/plain"));
    assert!(body.contains(std::str::from_utf8(&contents).unwrap()));
    assert!(body.contains("name=\"caption\"\r\n\r\nhello\r\n"));

    let file_part = body.find("name=\"photo\"").unwrap();
    let filename_part = body.find("name=\"filename\"").unwrap();
    let caption_part = body.find("name=\"caption\"").unwrap();
    assert!(file_part < filename_part && filename_part < caption_part);

    let events = events.lock().unwrap();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e.total_bytes == body.len() as i64));
    assert!(events.iter().all(|e| (0.0..=1.0).contains(&e.progress)));
}

#[tokio::test]
async fn test_headers_are_accumulated_and_length_is_declared() {
    let addr = spawn_server(Router::new().route("/upload", post(echo_headers))).await;
    let file = temp_file(b"payload");

    let request = UploadRequest::builder(format!("http://{addr}/upload"), file.path())
        .header("X-Tag", "one")
        .header("X-Tag", "two")
        .header("Content-Type", "text/plain")
        .build()
        .unwrap();

    let body = UploadClient::new().upload(request, NoProgress).await.unwrap();
    let echoed: serde_json::Value = serde_json::from_str(&body).unwrap();

    assert_eq!(echoed["tags"], json!(["one", "two"]));
    assert_eq!(echoed["content_types"], 1);
    assert!(
        echoed["content_type"]
            .as_str()
            .unwrap()
            .starts_with("multipart/form-data; boundary=")
    );
    assert!(echoed["content_length"].is_string());
}

#[tokio::test]
async fn test_missing_file_reports_not_found_without_progress() {
    let (events, sink) = recorder();
    let request = UploadRequest::builder("http://127.0.0.1:9/upload", "/no/such/file.jpg")
        .build()
        .unwrap();

    let err = UploadClient::new().upload(request, sink).await.unwrap_err();

    assert!(matches!(err, UploadError::FileNotFound(ref path) if path.ends_with("file.jpg")));
    assert_eq!(err.code(), "FILE_NOT_FOUND");
    assert!(events.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_server_error_hands_back_response() {
    let addr = spawn_server(Router::new().route("/upload", post(reject))).await;
    let file = temp_file(b"data");
    let request = UploadRequest::builder(format!("http://{addr}/upload"), file.path())
        .build()
        .unwrap();

    match UploadClient::new().upload(request, NoProgress).await {
        Err(UploadError::HttpFailure(response)) => {
            assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(response.body, "storage offline");
            assert_eq!(response.url.path(), "/upload");
        }
        other => panic!("expected an HTTP failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreadable_error_body_still_reports_http_failure() {
    let addr = spawn_truncating_server().await;
    let file = temp_file(b"data");
    let request = UploadRequest::builder(format!("http://{addr}/upload"), file.path())
        .build()
        .unwrap();

    match UploadClient::new().upload(request, NoProgress).await {
        Err(UploadError::HttpFailure(response)) => {
            assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(response.body, "");
        }
        other => panic!("expected an HTTP failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unreachable_server_is_transport_error() {
    let file = temp_file(b"data");
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let request = UploadRequest::builder(format!("http://{addr}/upload"), file.path())
        .build()
        .unwrap();
    let err = UploadClient::new().upload(request, NoProgress).await.unwrap_err();

    assert_eq!(err.code(), "TRANSPORT_ERROR");
}

#[tokio::test]
async fn test_malformed_url_is_transport_error() {
    let file = temp_file(b"data");
    let request = UploadRequest::builder("not a url", file.path())
        .build()
        .unwrap();

    let err = UploadClient::new().upload(request, NoProgress).await.unwrap_err();
    assert!(matches!(err, UploadError::Transport(_)));
}

#[tokio::test]
async fn test_concurrent_uploads_report_independently() {
    let addr = spawn_server(Router::new().route("/upload", post(echo))).await;
    let small = temp_file(&vec![b's'; 64 * 1024]);
    let large = temp_file(&vec![b'l'; 1024 * 1024]);
    let client = UploadClient::new();

    let (small_events, small_sink) = recorder();
    let (large_events, large_sink) = recorder();
    let small_request = UploadRequest::builder(format!("http://{addr}/upload"), small.path())
        .build()
        .unwrap();
    let large_request = UploadRequest::builder(format!("http://{addr}/upload"), large.path())
        .build()
        .unwrap();

    let (small_body, large_body) = tokio::join!(
        client.upload(small_request, small_sink),
        client.upload(large_request, large_sink),
    );
    let small_len = small_body.unwrap().len() as i64;
    let large_len = large_body.unwrap().len() as i64;

    for (events, total) in [(small_events.clone(), small_len), (large_events.clone(), large_len)] {
        let events = events.lock().unwrap();
        assert!(!events.is_empty());
        assert!(events.iter().all(|e| e.total_bytes == total));
        assert!(events.windows(2).all(|w| w[0].bytes_written <= w[1].bytes_written));
    }
    // One event per fifty writes: the large body needs more writes than the small one.
    assert!(large_events.lock().unwrap().len() > small_events.lock().unwrap().len());
}

#[tokio::test]
async fn test_spawn_completes_once_after_progress() {
    let addr = spawn_server(Router::new().route("/upload", post(echo))).await;
    let file = temp_file(&vec![b'x'; 256 * 1024]);
    let request = UploadRequest::builder(format!("http://{addr}/upload"), file.path())
        .build()
        .unwrap();

    let (events, sink) = recorder();
    let (done_tx, done_rx) = oneshot::channel();
    let events_at_completion = Arc::clone(&events);

    let handle = UploadClient::new().spawn(request, sink, move |result| {
        let seen = events_at_completion.lock().unwrap().len();
        let _ = done_tx.send((result, seen));
    });

    let (result, seen_at_completion) = done_rx.await.unwrap();
    handle.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(events.lock().unwrap().len(), seen_at_completion);
}

#[tokio::test]
async fn test_upload_from_host_options() {
    let addr = spawn_server(Router::new().route("/upload", post(echo))).await;
    let file = temp_file(b"options payload");
    let options = UploadOptions::from_value(json!({
        "fileKey": "document",
        "uri": format!("file://{}", file.path().display()),
        "uploadUrl": format!("http://{addr}/upload"),
        "mimeType": "application/pdf",
        "fileName": "report.pdf",
        "headers": {},
        "data": { "pages": 3, "draft": false, "owner": null }
    }))
    .unwrap();

    let request = options.into_request(&FileUriResolver).unwrap();
    let body = UploadClient::new().upload(request, NoProgress).await.unwrap();

    assert!(body.contains("name=\"document\"; filename=\"report.pdf\""));
    assert!(body.contains("Content-Type: application/pdf"));
    assert!(body.contains("name=\"pages\"\r\n\r\n3.0\r\n"));
    assert!(body.contains("name=\"draft\"\r\n\r\nfalse\r\n"));
    assert!(body.contains("name=\"owner\"\r\n\r\nnull\r\n"));
}
