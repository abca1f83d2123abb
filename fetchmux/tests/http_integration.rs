//! Integration tests for the request service over real HTTP.
//!
//! A local one-shot server answers each request, so these tests cover the
//! full path from `NetworkService` through `ReqwestTransport`:
//! - Content-Length bodies report progress up to 1.0
//! - chunked bodies complete without any progress report
//! - typed decoding through `fetch_decoded`
//!
//! Run with: `cargo test --test http_integration`

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use fetchmux::{
    DownloadManager, HeaderFields, NetworkResult, NetworkService, ProgressCallback,
    ReqwestTransport, Request, SerialDispatcher, TransportConfig,
};

// ============================================================================
// Helper Functions
// ============================================================================

/// Accepts one connection, reads the request head and writes `response`.
async fn serve_once(response: String) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/resource", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            head.extend_from_slice(&buf[..n]);
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.flush().await.unwrap();
    });

    url
}

fn service() -> NetworkService {
    let transport =
        ReqwestTransport::new(TransportConfig::default().with_timeout(Duration::from_secs(5)))
            .unwrap();
    let manager = DownloadManager::builder(Arc::new(transport))
        .dispatcher(Arc::new(SerialDispatcher::new()))
        .build();
    NetworkService::new(manager)
}

/// GETs `url`, returning the result and every progress fraction reported.
async fn get_with_progress(
    service: &NetworkService,
    url: &str,
) -> (NetworkResult<Bytes>, Vec<f64>) {
    let progress = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&progress);
    let callback: ProgressCallback = Arc::new(move |fraction: f64| sink.lock().push(fraction));
    let (tx, rx) = oneshot::channel();

    service.get(url, HeaderFields::new(), 0.5, Some(callback), move |result| {
        let _ = tx.send(result);
    });

    let result = tokio::time::timeout(Duration::from_secs(10), rx)
        .await
        .expect("download timed out")
        .expect("completion dropped");
    // Progress is dispatched ahead of the completion on the same context.
    let fractions = progress.lock().clone();
    (result, fractions)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_content_length_body_reports_progress_to_one() {
    let url = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Length: 12\r\nConnection: close\r\n\r\nhello world!"
            .to_string(),
    )
    .await;
    let service = service();

    let (result, progress) = get_with_progress(&service, &url).await;

    assert_eq!(result, Ok(Bytes::from_static(b"hello world!")));
    assert_eq!(progress.last(), Some(&1.0));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    assert!(service.manager().is_idle());
}

#[tokio::test]
async fn test_chunked_body_reports_no_progress() {
    let url = serve_once(
        "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n\
         5\r\nhello\r\n7\r\n world!\r\n0\r\n\r\n"
            .to_string(),
    )
    .await;
    let service = service();

    let (result, progress) = get_with_progress(&service, &url).await;

    assert_eq!(result, Ok(Bytes::from_static(b"hello world!")));
    assert!(progress.is_empty());
}

#[tokio::test]
async fn test_fetch_decoded_over_http() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Tile {
        id: u32,
    }

    let body = r#"{"id":42}"#;
    let url = serve_once(format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\
         Connection: close\r\n\r\n{}",
        body.len(),
        body
    ))
    .await;

    let tile: Tile = service().fetch_decoded(Request::get(&url)).await.unwrap();

    assert_eq!(tile, Tile { id: 42 });
}
