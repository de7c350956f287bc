//! Concurrent requests over one HTTP/2 connection.

use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode, Version};
use hyper::client::conn::http2;
use hyper_util::rt::{TokioExecutor, TokioIo};
use tokio::net::TcpStream;

mod common;

async fn connect(addr: std::net::SocketAddr) -> http2::SendRequest<Body> {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (sender, conn) = http2::handshake(TokioExecutor::new(), TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = conn.await;
    });
    sender
}

async fn get(
    mut sender: http2::SendRequest<Body>,
    uri: String,
) -> (StatusCode, Version, Instant) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = sender.send_request(request).await.unwrap();
    (response.status(), response.version(), Instant::now())
}

#[tokio::test]
async fn slow_request_does_not_block_fast_ones() {
    let server = common::start_server(common::fast_config()).await;
    let sender = connect(server.addr).await;
    let start = Instant::now();

    let slow = tokio::spawn(get(sender.clone(), server.url("/url/timeout")));
    // Give the slow stream a head start on the shared connection.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let fast = tokio::spawn(get(sender.clone(), server.url("/url/example/path")));
    let error = tokio::spawn(get(sender.clone(), server.url("/url/error")));
    let default = tokio::spawn(get(sender, server.url("/missing")));

    let (fast_status, fast_version, fast_done) = fast.await.unwrap();
    let (error_status, _, error_done) = error.await.unwrap();
    let (default_status, _, default_done) = default.await.unwrap();
    let (slow_status, _, slow_done) = slow.await.unwrap();

    assert_eq!(fast_version, Version::HTTP_2);
    assert_eq!(fast_status, StatusCode::OK);
    assert_eq!(error_status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(default_status, StatusCode::BAD_REQUEST);
    assert_eq!(slow_status, StatusCode::INTERNAL_SERVER_ERROR);

    for done in [fast_done, error_done, default_done] {
        assert!(done < slow_done, "fast stream waited behind the slow one");
    }
    assert!(slow_done.duration_since(start) >= Duration::from_millis(300));

    server.stop().await.unwrap();
}

#[tokio::test]
async fn many_concurrent_streams_get_their_own_status() {
    let server = common::start_server(common::fast_config()).await;
    let sender = connect(server.addr).await;

    let paths = ["/url/example/path", "/url/error/", "/elsewhere", "/url/example/path/"];
    let expected = [
        StatusCode::OK,
        StatusCode::INTERNAL_SERVER_ERROR,
        StatusCode::BAD_REQUEST,
        StatusCode::OK,
    ];

    let mut tasks = Vec::new();
    for i in 0..40 {
        let idx = i % paths.len();
        let sender = sender.clone();
        let uri = server.url(paths[idx]);
        tasks.push((idx, tokio::spawn(get(sender, uri))));
    }
    for (idx, task) in tasks {
        let (status, _, _) = task.await.unwrap();
        assert_eq!(status, expected[idx], "{}", paths[idx]);
    }

    server.stop().await.unwrap();
}
