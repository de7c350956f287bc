//! Cleartext HTTP/2 upgrade (`Upgrade: h2c`) for HTTP/1.1 clients.
//!
//! An upgrading request is answered with `101 Switching Protocols`, after
//! which the connection is served as HTTP/2 by the same router. The request
//! that carried the upgrade becomes stream 1. hyper's HTTP/2 server has no
//! notion of that implicit stream, so its response HEADERS frame is spliced
//! into the outgoing bytes at the first frame boundary after the server's
//! SETTINGS preface.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderName, Request, StatusCode, Version},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use hyper::server::conn::http2;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::service::TowerToHyperService;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::oneshot;
use tower::ServiceExt;

use crate::lifecycle::ShutdownSignal;

const HTTP2_SETTINGS: &str = "http2-settings";

const FRAME_HEADER_LEN: usize = 9;
const FRAME_TYPE_HEADERS: u8 = 0x1;
const FLAG_END_STREAM: u8 = 0x1;
const FLAG_END_HEADERS: u8 = 0x4;
const UPGRADE_STREAM_ID: u32 = 1;
/// `:status` in the HPACK static table.
const STATUS_NAME_INDEX: u8 = 8;

/// State for [`h2c_upgrade`]: the router that serves upgraded connections.
#[derive(Debug, Clone)]
pub struct H2cUpgrade {
    app: Router,
    shutdown: ShutdownSignal,
}

impl H2cUpgrade {
    /// Upgraded connections are sent GOAWAY once `shutdown` fires.
    pub fn new(app: Router, shutdown: ShutdownSignal) -> Self {
        Self { app, shutdown }
    }

    async fn serve(self, on_upgrade: OnUpgrade, stream_one: Request<Body>) {
        let upgraded = match on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                tracing::warn!(error = %e, "h2c upgrade failed");
                return;
            }
        };
        tracing::debug!(uri = %stream_one.uri(), "Connection upgraded to h2c");

        let (frame_tx, frame_rx) = oneshot::channel();
        let app = self.app.clone();
        tokio::spawn(async move {
            let response = match app.oneshot(stream_one).await {
                Ok(response) => response,
                Err(never) => match never {},
            };
            let _ = frame_tx.send(stream_one_headers(response.status()));
        });

        let io = TokioIo::new(StreamOneWriter::new(TokioIo::new(upgraded), frame_rx));
        let conn = http2::Builder::new(TokioExecutor::new())
            .serve_connection(io, TowerToHyperService::new(self.app));
        tokio::pin!(conn);

        let mut shutdown = self.shutdown;
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    tracing::debug!(error = %e, "h2c connection closed with error");
                }
                return;
            }
            _ = shutdown.recv() => {}
        }

        conn.as_mut().graceful_shutdown();
        if let Err(e) = conn.await {
            tracing::debug!(error = %e, "h2c connection closed with error");
        }
    }
}

/// Whether an HTTP/1.1 request asks to switch to cleartext HTTP/2.
pub fn is_h2c_upgrade(version: Version, headers: &HeaderMap) -> bool {
    version == Version::HTTP_11
        && has_token(headers, &header::UPGRADE, "h2c")
        && has_token(headers, &header::CONNECTION, "upgrade")
        && has_token(headers, &header::CONNECTION, HTTP2_SETTINGS)
        && headers.get_all(HTTP2_SETTINGS).iter().count() == 1
}

fn has_token(headers: &HeaderMap, name: &HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Answer `Upgrade: h2c` requests with 101 and hand the connection to HTTP/2.
/// Every other request passes through untouched.
pub async fn h2c_upgrade(
    State(upgrade): State<H2cUpgrade>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    if !is_h2c_upgrade(req.version(), req.headers()) {
        return next.run(req).await;
    }

    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(upgrade.serve(on_upgrade, into_stream_one(req)));

    (
        StatusCode::SWITCHING_PROTOCOLS,
        [(header::CONNECTION, "Upgrade"), (header::UPGRADE, "h2c")],
    )
        .into_response()
}

/// The upgrading request as it is replayed on stream 1.
fn into_stream_one(req: Request<Body>) -> Request<Body> {
    let (mut parts, _body) = req.into_parts();
    parts.version = Version::HTTP_2;
    parts.headers.remove(header::CONNECTION);
    parts.headers.remove(header::UPGRADE);
    parts.headers.remove(HTTP2_SETTINGS);
    Request::from_parts(parts, Body::empty())
}

/// HEADERS frame ending stream 1 with `status`.
fn stream_one_headers(status: StatusCode) -> Vec<u8> {
    let code = status.as_str().as_bytes();
    // Literal without indexing, indexed name: the peer's dynamic table is
    // left as the server's encoder expects it.
    let mut block = vec![STATUS_NAME_INDEX, 3];
    block.extend_from_slice(code);

    let len = u32::try_from(block.len()).unwrap_or(u32::MAX).to_be_bytes();
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + block.len());
    frame.extend_from_slice(&len[1..]);
    frame.push(FRAME_TYPE_HEADERS);
    frame.push(FLAG_END_STREAM | FLAG_END_HEADERS);
    frame.extend_from_slice(&UPGRADE_STREAM_ID.to_be_bytes());
    frame.extend_from_slice(&block);
    frame
}

/// IO wrapper that tracks outgoing frame boundaries and writes the stream 1
/// response between two frames once it is ready.
struct StreamOneWriter<T> {
    inner: T,
    frame_rx: Option<oneshot::Receiver<Vec<u8>>>,
    pending: Vec<u8>,
    header: [u8; FRAME_HEADER_LEN],
    header_filled: usize,
    body_left: usize,
    frames_written: usize,
}

impl<T> StreamOneWriter<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn new(inner: T, frame_rx: oneshot::Receiver<Vec<u8>>) -> Self {
        Self {
            inner,
            frame_rx: Some(frame_rx),
            pending: Vec::new(),
            header: [0; FRAME_HEADER_LEN],
            header_filled: 0,
            body_left: 0,
            frames_written: 0,
        }
    }

    fn poll_inject(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        if let Some(rx) = self.frame_rx.as_mut() {
            match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(frame)) => {
                    self.pending = frame;
                    self.frame_rx = None;
                }
                Poll::Ready(Err(_)) => self.frame_rx = None,
                Poll::Pending => {}
            }
        }

        // Only between frames, and never ahead of the SETTINGS preface.
        if self.pending.is_empty() || self.header_filled != 0 || self.frames_written == 0 {
            return Poll::Ready(Ok(()));
        }
        while !self.pending.is_empty() {
            let n = ready!(Pin::new(&mut self.inner).poll_write(cx, &self.pending))?;
            if n == 0 {
                return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
            }
            self.pending.drain(..n);
        }
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    /// Account for bytes the inner writer accepted.
    fn advance(&mut self, mut written: &[u8]) {
        while !written.is_empty() {
            if self.header_filled < FRAME_HEADER_LEN {
                let take = (FRAME_HEADER_LEN - self.header_filled).min(written.len());
                self.header[self.header_filled..self.header_filled + take]
                    .copy_from_slice(&written[..take]);
                self.header_filled += take;
                written = &written[take..];
                if self.header_filled == FRAME_HEADER_LEN {
                    self.body_left = usize::from(self.header[0]) << 16
                        | usize::from(self.header[1]) << 8
                        | usize::from(self.header[2]);
                }
            } else {
                let take = self.body_left.min(written.len());
                self.body_left -= take;
                written = &written[take..];
            }

            if self.header_filled == FRAME_HEADER_LEN && self.body_left == 0 {
                self.header_filled = 0;
                self.frames_written += 1;
            }
        }
    }
}

impl<T> AsyncRead for StreamOneWriter<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        // The connection always has a read outstanding, so this is where a
        // response that becomes ready on an idle connection goes out.
        if let Poll::Ready(Err(e)) = this.poll_inject(cx) {
            return Poll::Ready(Err(e));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<T> AsyncWrite for StreamOneWriter<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        ready!(this.poll_inject(cx))?;
        let n = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
        this.advance(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(this.poll_inject(cx))?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn upgrade_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade, HTTP2-Settings"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("h2c"));
        headers.insert(HTTP2_SETTINGS, HeaderValue::from_static("AAMAAABkAAQAAP__"));
        headers
    }

    #[test]
    fn detects_complete_upgrade_request() {
        assert!(is_h2c_upgrade(Version::HTTP_11, &upgrade_headers()));
        assert!(!is_h2c_upgrade(Version::HTTP_10, &upgrade_headers()));
        assert!(!is_h2c_upgrade(Version::HTTP_2, &upgrade_headers()));

        let mut headers = upgrade_headers();
        headers.remove(HTTP2_SETTINGS);
        assert!(!is_h2c_upgrade(Version::HTTP_11, &headers));

        let mut headers = upgrade_headers();
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        assert!(!is_h2c_upgrade(Version::HTTP_11, &headers));

        let mut headers = upgrade_headers();
        headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        assert!(!is_h2c_upgrade(Version::HTTP_11, &headers));
    }

    #[test]
    fn stream_one_frame_layout() {
        assert_eq!(
            stream_one_headers(StatusCode::INTERNAL_SERVER_ERROR),
            vec![0, 0, 5, 0x1, 0x5, 0, 0, 0, 1, 0x08, 3, b'5', b'0', b'0']
        );
    }

    #[test]
    fn stream_one_request_drops_upgrade_headers() {
        let mut req = Request::builder()
            .uri("/url/error")
            .header("x-keep", "1")
            .body(Body::from("ignored"))
            .unwrap();
        req.headers_mut().extend(upgrade_headers());

        let replayed = into_stream_one(req);
        assert_eq!(replayed.version(), Version::HTTP_2);
        assert_eq!(replayed.uri(), "/url/error");
        assert!(replayed.headers().get(header::UPGRADE).is_none());
        assert!(replayed.headers().get(HTTP2_SETTINGS).is_none());
        assert_eq!(replayed.headers()["x-keep"], "1");
    }

    #[tokio::test]
    async fn response_lands_between_frames_after_preface() {
        let (mut peer, io) = tokio::io::duplex(1024);
        let (tx, rx) = oneshot::channel();
        let mut writer = StreamOneWriter::new(io, rx);
        let injected = stream_one_headers(StatusCode::OK);
        tx.send(injected.clone()).unwrap();

        // SETTINGS (one setting), written in two pieces split inside the header.
        let settings = [0, 0, 6, 0x4, 0, 0, 0, 0, 0, 0, 3, 0, 0, 0, 100];
        // PING
        let ping = [0, 0, 8, 0x6, 0, 0, 0, 0, 0, 1, 2, 3, 4, 5, 6, 7, 8];
        writer.write_all(&settings[..4]).await.unwrap();
        writer.write_all(&settings[4..]).await.unwrap();
        writer.write_all(&ping).await.unwrap();
        writer.flush().await.unwrap();

        let mut expected = settings.to_vec();
        expected.extend_from_slice(&injected);
        expected.extend_from_slice(&ping);
        let mut received = vec![0; expected.len()];
        peer.read_exact(&mut received).await.unwrap();
        assert_eq!(received, expected);
    }
}
