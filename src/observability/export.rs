//! Span exporters: the collaborators that receive finished spans.
//!
//! The backend behind an exporter is out of this crate's hands; all it
//! promises is that `export` eventually resolves. Exporters are driven by a
//! single worker task (see [`crate::observability::spans`]).

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::TracingConfig;
use crate::observability::spans::SpanRecord;

/// Error type for span export.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("collector rejected batch: {0}")]
    Rejected(String),
    #[error("export timed out after {0:?}")]
    Timeout(Duration),
    #[error("span processor already stopped")]
    Stopped,
}

/// Receives batches of finished spans.
pub trait SpanExporter: Send + Sync {
    fn export(
        &self,
        batch: Vec<SpanRecord>,
    ) -> impl Future<Output = Result<(), ExportError>> + Send;
}

/// Emits each span as a structured log event.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExporter;

impl SpanExporter for LogExporter {
    async fn export(&self, batch: Vec<SpanRecord>) -> Result<(), ExportError> {
        for span in batch {
            tracing::info!(
                target: "h2c_test_server::spans",
                trace_id = %span.trace_id,
                span_id = %span.span_id,
                parent_span_id = span.parent_span_id.map(tracing::field::display),
                operation = %span.name,
                method = %span.method,
                uri = %span.target,
                route = span.route.as_deref(),
                status = span.status,
                duration_us = u64::try_from(span.duration.as_micros()).unwrap_or(u64::MAX),
                "Span finished"
            );
        }
        Ok(())
    }
}

/// POSTs each batch as a JSON array to a collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpJsonExporter {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpJsonExporter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

impl SpanExporter for HttpJsonExporter {
    async fn export(&self, batch: Vec<SpanRecord>) -> Result<(), ExportError> {
        let response = self.client.post(&self.endpoint).json(&batch).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ExportError::Rejected(format!(
                "{} responded with {status}",
                self.endpoint
            )))
        }
    }
}

/// Exporter selected from configuration.
#[derive(Debug, Clone)]
pub enum ConfiguredExporter {
    Log(LogExporter),
    Http(HttpJsonExporter),
}

impl ConfiguredExporter {
    /// Collector endpoint when configured, the log otherwise.
    pub fn from_config(config: &TracingConfig) -> Result<Self, ExportError> {
        match &config.endpoint {
            Some(endpoint) => Ok(Self::Http(HttpJsonExporter::new(
                endpoint.clone(),
                config.export_timeout(),
            )?)),
            None => Ok(Self::Log(LogExporter)),
        }
    }
}

impl SpanExporter for ConfiguredExporter {
    async fn export(&self, batch: Vec<SpanRecord>) -> Result<(), ExportError> {
        match self {
            Self::Log(exporter) => exporter.export(batch).await,
            Self::Http(exporter) => exporter.export(batch).await,
        }
    }
}

/// Keeps exported spans in memory; used by tests to inspect what was traced.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExporter {
    batches: Arc<Mutex<Vec<Vec<SpanRecord>>>>,
    fail: bool,
}

impl InMemoryExporter {
    /// An exporter that rejects every batch.
    pub fn failing() -> Self {
        Self {
            batches: Arc::default(),
            fail: true,
        }
    }

    /// All exported spans, in export order.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.lock().iter().flatten().cloned().collect()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.lock().iter().map(Vec::len).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Vec<SpanRecord>>> {
        // A poisoned lock still holds valid span data.
        self.batches
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl SpanExporter for InMemoryExporter {
    async fn export(&self, batch: Vec<SpanRecord>) -> Result<(), ExportError> {
        if self.fail {
            return Err(ExportError::Rejected("in-memory exporter set to fail".into()));
        }
        self.lock().push(batch);
        Ok(())
    }
}
