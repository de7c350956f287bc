//! Per-request span middleware.
//!
//! Wraps everything below it in a `tracing` span, then hands a finished
//! [`SpanRecord`] to the span processor once the response is produced.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use crate::http::handlers::{request_target, MatchedRoute};
use crate::observability::spans::{SpanContext, SpanRecord, SpanSink, TraceParent};

/// State for [`trace_requests`].
#[derive(Debug, Clone)]
pub struct TraceState {
    pub sink: SpanSink,
    pub operation_name: Arc<str>,
}

pub async fn trace_requests(
    State(state): State<TraceState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let parent = req
        .headers()
        .get(TraceParent::HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(TraceParent::parse);
    let ctx = SpanContext::new(parent.as_ref());

    let method = req.method().to_string();
    let target = request_target(req.uri()).to_string();

    let span = tracing::info_span!(
        "request",
        otel.name = %state.operation_name,
        trace_id = %ctx.trace_id,
        span_id = %ctx.span_id,
        method = %method,
        uri = %target,
        status = tracing::field::Empty,
        duration_ms = tracing::field::Empty,
    );

    // Detached: a client that gives up still leaves exactly one span.
    let task = tokio::spawn(
        async move {
            let started_at = SystemTime::now();
            let start = Instant::now();
            let response = next.run(req).await;
            let duration = start.elapsed();

            let status = response.status().as_u16();
            let span = tracing::Span::current();
            span.record("status", status);
            span.record("duration_ms", duration.as_secs_f64() * 1000.0);

            let route = response
                .extensions()
                .get::<MatchedRoute>()
                .and_then(|m| m.0.clone());
            let start_unix_nanos = started_at
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));

            state.sink.record(SpanRecord {
                trace_id: ctx.trace_id,
                span_id: ctx.span_id,
                parent_span_id: ctx.parent_id,
                name: state.operation_name.to_string(),
                method,
                target,
                route,
                status,
                start_unix_nanos,
                duration,
            });

            response
        }
        .instrument(span),
    );

    match task.await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Traced request task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
