//! Request span records and the batching span processor.
//!
//! # Responsibilities
//! - Describe one finished request as a [`SpanRecord`]
//! - Generate and propagate W3C trace context identifiers
//! - Buffer records in a bounded queue and export them in batches
//! - Flush everything still queued exactly once at shutdown
//!
//! # Design Decisions
//! - Recording never blocks a request: a full queue drops the span
//! - One worker task owns the exporter, so exporters need no locking
//! - Export failures are logged and the batch discarded (no retries)

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::TracingConfig;
use crate::observability::export::{ExportError, SpanExporter};

/// Interval after which a partial batch is exported anyway.
const SCHEDULED_DELAY: Duration = Duration::from_secs(5);

/// 16-byte trace id, rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(u128);

/// 8-byte span id, rendered as 16 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpanId(u64);

impl TraceId {
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().as_u128())
    }
}

impl SpanId {
    pub fn random() -> Self {
        // Truncation keeps the random low half of a v4 uuid.
        Self(uuid::Uuid::new_v4().as_u128() as u64)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl Serialize for TraceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl Serialize for SpanId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parsed W3C `traceparent` header (`00-<trace-id>-<parent-id>-<flags>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceParent {
    pub trace_id: TraceId,
    pub parent_id: SpanId,
    pub sampled: bool,
}

impl TraceParent {
    pub const HEADER: &'static str = "traceparent";

    /// Parse a header value; `None` for anything malformed or all-zero.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let parent_id = parts.next()?;
        let flags = parts.next()?;

        if version.len() != 2 || version == "ff" || !is_lower_hex(version) {
            return None;
        }
        // Version 00 has exactly four fields.
        if version == "00" && parts.next().is_some() {
            return None;
        }
        if trace_id.len() != 32 || parent_id.len() != 16 || flags.len() != 2 {
            return None;
        }
        if !is_lower_hex(trace_id) || !is_lower_hex(parent_id) || !is_lower_hex(flags) {
            return None;
        }

        let trace_id = u128::from_str_radix(trace_id, 16).ok()?;
        let parent_id = u64::from_str_radix(parent_id, 16).ok()?;
        let flags = u8::from_str_radix(flags, 16).ok()?;
        if trace_id == 0 || parent_id == 0 {
            return None;
        }

        Some(Self {
            trace_id: TraceId(trace_id),
            parent_id: SpanId(parent_id),
            sampled: flags & 0x01 == 0x01,
        })
    }
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Identity of a request span, continuing an incoming trace when present.
#[derive(Debug, Clone, Copy)]
pub struct SpanContext {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    pub parent_id: Option<SpanId>,
}

impl SpanContext {
    pub fn new(parent: Option<&TraceParent>) -> Self {
        Self {
            trace_id: parent.map_or_else(TraceId::random, |p| p.trace_id),
            span_id: SpanId::random(),
            parent_id: parent.map(|p| p.parent_id),
        }
    }
}

/// One finished request span.
#[derive(Debug, Clone, Serialize)]
pub struct SpanRecord {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<SpanId>,
    /// Fixed operation name.
    pub name: String,
    pub method: String,
    /// Request target (path and query).
    pub target: String,
    /// Matched route pattern, absent for unregistered paths.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    pub status: u16,
    pub start_unix_nanos: u64,
    #[serde(with = "duration_micros")]
    pub duration: Duration,
}

mod duration_micros {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_micros()).unwrap_or(u64::MAX))
    }
}

/// Cloneable, non-blocking handle for recording finished spans.
#[derive(Debug, Clone)]
pub struct SpanSink {
    tx: mpsc::Sender<SpanRecord>,
    dropped: Arc<AtomicU64>,
}

impl SpanSink {
    /// Queue a span for export. Drops it when the queue is full or closed.
    pub fn record(&self, span: SpanRecord) {
        match self.tx.try_send(span) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(dropped, "Span queue full, dropping span");
            }
            Err(TrySendError::Closed(span)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(
                    dropped,
                    span_id = %span.span_id,
                    "Span processor stopped, dropping span"
                );
            }
        }
    }

    /// Spans dropped so far because the queue was full or already closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Counters reported when the processor stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub exported: u64,
    pub failed_batches: u64,
    pub dropped: u64,
}

/// Owner of the export worker. Dropping it without calling
/// [`SpanProcessor::shutdown`] still flushes, but nobody observes the outcome.
#[derive(Debug)]
pub struct SpanProcessor {
    sink: SpanSink,
    stop_tx: oneshot::Sender<()>,
    worker: JoinHandle<(ExportStats, Option<ExportError>)>,
}

impl SpanProcessor {
    /// Spawn the export worker. Must be called inside a Tokio runtime.
    pub fn spawn<E>(exporter: E, config: &TracingConfig) -> Self
    where
        E: SpanExporter + 'static,
    {
        let (tx, rx) = mpsc::channel(config.max_queue_size.max(1));
        let (stop_tx, stop_rx) = oneshot::channel();
        let dropped = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            exporter,
            rx,
            batch_size: config.max_export_batch_size.max(1),
            timeout: config.export_timeout(),
            stats: ExportStats::default(),
        };
        let worker = tokio::spawn(worker.run(stop_rx));

        tracing::debug!(
            max_queue_size = config.max_queue_size,
            max_export_batch_size = config.max_export_batch_size,
            "Span processor started"
        );

        Self {
            sink: SpanSink { tx, dropped },
            stop_tx,
            worker,
        }
    }

    /// Handle for the request middleware.
    pub fn sink(&self) -> SpanSink {
        self.sink.clone()
    }

    /// Export everything still queued, then stop the worker.
    ///
    /// Returns the last export error seen during the final flush, if any.
    pub async fn shutdown(self) -> Result<ExportStats, ExportError> {
        let dropped = self.sink.dropped();
        // The worker may already be gone if it panicked.
        let _ = self.stop_tx.send(());

        let (mut stats, error) = self.worker.await.map_err(|_| ExportError::Stopped)?;
        stats.dropped = dropped;

        tracing::info!(
            exported = stats.exported,
            failed_batches = stats.failed_batches,
            dropped = stats.dropped,
            "Span processor flushed"
        );

        match error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

struct Worker<E> {
    exporter: E,
    rx: mpsc::Receiver<SpanRecord>,
    batch_size: usize,
    timeout: Duration,
    stats: ExportStats,
}

impl<E: SpanExporter> Worker<E> {
    async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) -> (ExportStats, Option<ExportError>) {
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(SCHEDULED_DELAY);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                received = self.rx.recv() => match received {
                    Some(span) => {
                        batch.push(span);
                        if batch.len() >= self.batch_size {
                            let _ = self.export(&mut batch).await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        let _ = self.export(&mut batch).await;
                    }
                }
            }
        }

        // Final flush: whatever is buffered plus whatever is still queued.
        self.rx.close();
        let mut last_error = None;
        loop {
            while batch.len() < self.batch_size {
                match self.rx.try_recv() {
                    Ok(span) => batch.push(span),
                    Err(_) => break,
                }
            }
            if batch.is_empty() {
                break;
            }
            if let Err(e) = self.export(&mut batch).await {
                last_error = Some(e);
            }
        }

        (self.stats, last_error)
    }

    async fn export(&mut self, batch: &mut Vec<SpanRecord>) -> Result<(), ExportError> {
        let spans = std::mem::take(batch);
        let count = spans.len() as u64;

        let result = match tokio::time::timeout(self.timeout, self.exporter.export(spans)).await {
            Ok(result) => result,
            Err(_) => Err(ExportError::Timeout(self.timeout)),
        };

        match &result {
            Ok(()) => self.stats.exported += count,
            Err(e) => {
                self.stats.failed_batches += 1;
                tracing::warn!(error = %e, spans = count, "Span export failed, batch dropped");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::export::InMemoryExporter;

    fn record(status: u16) -> SpanRecord {
        let ctx = SpanContext::new(None);
        SpanRecord {
            trace_id: ctx.trace_id,
            span_id: ctx.span_id,
            parent_span_id: None,
            name: "http.server".into(),
            method: "GET".into(),
            target: "/url/error".into(),
            route: Some("/url/error".into()),
            status,
            start_unix_nanos: 0,
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn parses_valid_traceparent() {
        let parent =
            TraceParent::parse("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").unwrap();
        assert_eq!(parent.trace_id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(parent.parent_id.to_string(), "00f067aa0ba902b7");
        assert!(parent.sampled);

        let ctx = SpanContext::new(Some(&parent));
        assert_eq!(ctx.trace_id, parent.trace_id);
        assert_eq!(ctx.parent_id, Some(parent.parent_id));
        assert_ne!(ctx.span_id, parent.parent_id);
    }

    #[test]
    fn rejects_malformed_traceparent() {
        for value in [
            "",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7",
            "00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01",
            "00-00000000000000000000000000000000-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-0000000000000000-01",
            "ff-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01",
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-extra",
        ] {
            assert!(TraceParent::parse(value).is_none(), "accepted {value:?}");
        }
    }

    #[test]
    fn ids_render_fixed_width_hex() {
        let ctx = SpanContext::new(None);
        assert_eq!(ctx.trace_id.to_string().len(), 32);
        assert_eq!(ctx.span_id.to_string().len(), 16);
        assert!(ctx.parent_id.is_none());
    }

    #[test]
    fn span_record_serializes_ids_as_hex() {
        let json = serde_json::to_value(record(500)).unwrap();
        assert_eq!(json["status"], 500);
        assert_eq!(json["duration"], 3000);
        assert_eq!(json["trace_id"].as_str().unwrap().len(), 32);
        assert!(json.get("parent_span_id").is_none());
    }

    #[tokio::test]
    async fn shutdown_flushes_queued_spans() {
        let exporter = InMemoryExporter::default();
        let config = TracingConfig {
            max_export_batch_size: 2,
            ..TracingConfig::default()
        };
        let processor = SpanProcessor::spawn(exporter.clone(), &config);
        let sink = processor.sink();
        for status in [200, 400, 500, 500, 200] {
            sink.record(record(status));
        }

        let stats = processor.shutdown().await.unwrap();
        assert_eq!(stats.exported, 5);
        assert_eq!(stats.dropped, 0);

        let statuses: Vec<u16> = exporter.spans().iter().map(|s| s.status).collect();
        assert_eq!(statuses, vec![200, 400, 500, 500, 200]);
        assert!(exporter.batch_sizes().iter().all(|&n| n <= 2));
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let exporter = InMemoryExporter::default();
        let config = TracingConfig {
            max_queue_size: 1,
            max_export_batch_size: 1,
            ..TracingConfig::default()
        };
        let processor = SpanProcessor::spawn(exporter.clone(), &config);
        let sink = processor.sink();
        // The worker has not been polled yet on this current-thread runtime.
        for _ in 0..4 {
            sink.record(record(200));
        }
        assert_eq!(sink.dropped(), 3);

        let stats = processor.shutdown().await.unwrap();
        assert_eq!(stats.exported, 1);
        assert_eq!(stats.dropped, 3);
    }

    #[tokio::test]
    async fn records_after_shutdown_are_dropped() {
        let exporter = InMemoryExporter::default();
        let processor = SpanProcessor::spawn(exporter.clone(), &TracingConfig::default());
        let sink = processor.sink();
        processor.shutdown().await.unwrap();

        sink.record(record(500));
        assert_eq!(sink.dropped(), 1);
        assert!(exporter.spans().is_empty());
    }

    #[tokio::test]
    async fn failing_exporter_reports_error_on_shutdown() {
        let exporter = InMemoryExporter::failing();
        let processor = SpanProcessor::spawn(exporter, &TracingConfig::default());
        processor.sink().record(record(200));

        let err = processor.shutdown().await.unwrap_err();
        assert!(matches!(err, ExportError::Rejected(_)));
    }
}
