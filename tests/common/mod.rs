//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{routing::post, Json, Router};
use h2c_test_server::observability::SpanProcessor;
use h2c_test_server::{HttpServer, Lifecycle, Phase, ServerConfig, ServerError, Shutdown};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A running server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub lifecycle: Lifecycle,
    pub handle: JoinHandle<Result<(), ServerError>>,
}

#[allow(dead_code)]
impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the server to stop.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        self.handle.await.expect("server task panicked")
    }
}

/// Loopback config with a shortened slow route so tests stay quick.
#[allow(dead_code)]
pub fn fast_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.handlers.slow_delay_ms = 300;
    config.tracing.enabled = false;
    config
}

#[allow(dead_code)]
pub async fn start_server(config: ServerConfig) -> TestServer {
    let server = HttpServer::new(config).expect("server setup");
    launch(server).await
}

#[allow(dead_code)]
pub async fn start_server_with_spans(config: ServerConfig, spans: SpanProcessor) -> TestServer {
    launch(HttpServer::with_span_processor(config, Some(spans))).await
}

async fn launch(server: HttpServer) -> TestServer {
    let listener = TcpListener::bind(&server.config().listener.bind_address)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    let lifecycle = server.lifecycle();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    let handle = tokio::spawn(async move { server.run(listener, server_shutdown).await });
    tokio::time::timeout(Duration::from_secs(5), lifecycle.wait_for(Phase::Listening))
        .await
        .expect("server did not start listening");

    TestServer {
        addr,
        shutdown,
        lifecycle,
        handle,
    }
}

/// Client speaking HTTP/2 without upgrade (h2c prior knowledge).
#[allow(dead_code)]
pub fn h2_client() -> reqwest::Client {
    reqwest::Client::builder()
        .http2_prior_knowledge()
        .no_proxy()
        .build()
        .unwrap()
}

/// Plain HTTP/1.1 client.
#[allow(dead_code)]
pub fn h1_client() -> reqwest::Client {
    reqwest::Client::builder()
        .http1_only()
        .no_proxy()
        .build()
        .unwrap()
}

/// Start a collector that stores every JSON batch POSTed to `/spans`.
#[allow(dead_code)]
pub async fn start_collector() -> (SocketAddr, Arc<Mutex<Vec<serde_json::Value>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let store = received.clone();
    let app = Router::new().route(
        "/spans",
        post(move |Json(batch): Json<serde_json::Value>| {
            let store = store.clone();
            async move {
                store.lock().unwrap().push(batch);
                axum::http::StatusCode::ACCEPTED
            }
        }),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, received)
}
