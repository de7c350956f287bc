//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize metrics and the span pipeline
//! - Register signal handlers
//! - Bind the listener and hand it to the HTTP server
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listener binds last (traffic only when ready)

use crate::config::ServerConfig;
use crate::http::{HttpServer, ServerError};
use crate::lifecycle::signals::SignalListener;
use crate::lifecycle::Shutdown;
use crate::net;
use crate::observability::metrics;

/// Run the server until a termination signal arrives and draining completes.
pub async fn start(config: ServerConfig) -> Result<(), ServerError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        log_headers = config.middleware.log_headers,
        tracing = config.tracing.enabled,
        slow_delay_ms = config.handlers.slow_delay_ms,
        drain_timeout_ms = config.lifecycle.drain_timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(&config.observability.metrics_address)?;
    }

    let mut signals = SignalListener::register()?;
    let server = HttpServer::new(config)?;
    let listener = net::bind(&server.config().listener).await?;

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        let signal = signals.recv().await;
        tracing::info!(%signal, "Shutdown signal received");
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await
}
