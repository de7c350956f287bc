//! Header logging middleware.

use axum::{body::Body, http::Request, middleware::Next, response::Response};

use crate::http::handlers::request_target;

/// Log the request line and every header value, then delegate.
pub async fn log_headers(req: Request<Body>, next: Next) -> Response {
    tracing::info!(
        method = %req.method(),
        uri = request_target(req.uri()),
        version = ?req.version(),
        "Request headers"
    );
    // HeaderMap iteration yields one entry per value.
    for (name, value) in req.headers() {
        tracing::info!(
            header = %name,
            value = %String::from_utf8_lossy(value.as_bytes()),
            "Request header"
        );
    }
    next.run(req).await
}
