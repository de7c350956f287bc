//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request handling produces:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!     → spans.rs (one SpanRecord per request, batched)
//!         → export.rs (log, HTTP collector, or in-memory exporter)
//! ```
//!
//! # Design Decisions
//! - Request span tracing is optional and purely observational
//! - Span export runs off the request path on its own task
//! - Metrics are cheap (atomic increments) and off by default

pub mod export;
pub mod logging;
pub mod metrics;
pub mod spans;

pub use export::{ConfiguredExporter, ExportError, InMemoryExporter, LogExporter, SpanExporter};
pub use spans::{SpanProcessor, SpanRecord, SpanSink};
