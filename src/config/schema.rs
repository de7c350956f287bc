//! Configuration schema definitions.
//!
//! Every section has compiled defaults, so an empty (or absent) config file
//! yields the canonical test server: `0.0.0.0:8080`, the canned delays, no
//! header logging, span tracing to the log.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the test server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Per-behavior handler latencies.
    pub handlers: HandlerConfig,

    /// Optional request middleware.
    pub middleware: MiddlewareConfig,

    /// Request span tracing and export.
    pub tracing: TracingConfig,

    /// Startup/shutdown settings.
    pub lifecycle: LifecycleConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Artificial latency applied by each handler before writing its status.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Delay for `/url/example/path` (200).
    pub success_delay_ms: u64,

    /// Delay for `/url/error` (500).
    pub error_delay_ms: u64,

    /// Delay for `/url/timeout` (500). Tuned to sit just under common
    /// client-side request timeouts of two seconds.
    pub slow_delay_ms: u64,

    /// Delay for unregistered paths (400).
    pub default_delay_ms: u64,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            success_delay_ms: 2,
            error_delay_ms: 0,
            slow_delay_ms: 1960,
            default_delay_ms: 8,
        }
    }
}

/// Optional observational middleware.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MiddlewareConfig {
    /// Log every request header before dispatch.
    pub log_headers: bool,
}

/// Request span configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Wrap the dispatcher in a per-request span.
    pub enabled: bool,

    /// Fixed operation name given to every request span.
    pub operation_name: String,

    /// Collector URL receiving JSON span batches. Spans go to the log when unset.
    pub endpoint: Option<String>,

    /// Spans buffered before new ones are dropped.
    pub max_queue_size: usize,

    /// Maximum spans handed to the exporter at once.
    pub max_export_batch_size: usize,

    /// Per-batch export timeout in milliseconds.
    pub export_timeout_ms: u64,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            operation_name: "http.server".to_string(),
            endpoint: None,
            max_queue_size: 2048,
            max_export_batch_size: 512,
            export_timeout_ms: 10_000,
        }
    }
}

impl TracingConfig {
    pub fn export_timeout(&self) -> Duration {
        Duration::from_millis(self.export_timeout_ms)
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Upper bound on in-flight request draining after a shutdown signal.
    pub drain_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            drain_timeout_ms: 5_000,
        }
    }
}

impl LifecycleConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log line format.
    pub log_format: LogFormat,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
