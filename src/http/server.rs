//! HTTP server setup and lifecycle.
//!
//! # Responsibilities
//! - Build the Axum router: dispatcher plus optional middleware
//! - Serve HTTP/1.1, HTTP/2 prior knowledge and `Upgrade: h2c` on one listener
//! - Stop accepting on shutdown, drain in-flight requests with a bound
//! - Flush the span processor once the server has stopped

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::http::h2c::{h2c_upgrade, H2cUpgrade};
use crate::http::handlers::dispatch;
use crate::http::middleware::{log_headers, trace_requests, TraceState};
use crate::lifecycle::{Lifecycle, Phase, Shutdown, ShutdownSignal};
use crate::net::ListenerError;
use crate::observability::metrics::MetricsError;
use crate::observability::{ConfiguredExporter, ExportError, SpanProcessor};
use crate::routing::RouteTable;

/// Error type for server startup and operation.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("Server I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Tracing setup failed: {0}")]
    TracingSetup(#[source] ExportError),
    #[error("Server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Metrics setup failed: {0}")]
    Metrics(#[from] MetricsError),
}

/// HTTP server for the canned endpoints.
pub struct HttpServer {
    router: Router,
    config: ServerConfig,
    spans: Option<SpanProcessor>,
    lifecycle: Lifecycle,
    /// Tells upgraded h2c connections, which `axum::serve` does not track,
    /// to wind down.
    upgraded: Shutdown,
}

impl HttpServer {
    /// Create a server, starting the span processor when tracing is enabled.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let spans = if config.tracing.enabled {
            let exporter = ConfiguredExporter::from_config(&config.tracing)
                .map_err(ServerError::TracingSetup)?;
            Some(SpanProcessor::spawn(exporter, &config.tracing))
        } else {
            None
        };
        Ok(Self::with_span_processor(config, spans))
    }

    /// Create a server around an existing span processor. Request tracing is
    /// enabled exactly when a processor is given.
    pub fn with_span_processor(config: ServerConfig, spans: Option<SpanProcessor>) -> Self {
        let routes = Arc::new(RouteTable::new(&config.handlers));
        for route in routes.routes() {
            tracing::debug!(
                pattern = %route.pattern,
                status = route.behavior.status().as_u16(),
                delay_ms = u64::try_from(route.behavior.delay.as_millis()).unwrap_or(u64::MAX),
                "Route registered"
            );
        }

        let trace_state = spans.as_ref().map(|processor| TraceState {
            sink: processor.sink(),
            operation_name: Arc::from(config.tracing.operation_name.as_str()),
        });
        let upgraded = Shutdown::new();
        let router = Self::build_router(&config, routes, trace_state, upgraded.subscribe());

        Self {
            router,
            config,
            spans,
            lifecycle: Lifecycle::new(),
            upgraded,
        }
    }

    /// Build the Axum router with the enabled middleware layers.
    ///
    /// Layer order, outermost first: h2c upgrade, HTTP trace events,
    /// request span, header logger, dispatcher. Upgraded connections are
    /// served by everything below the upgrade layer.
    fn build_router(
        config: &ServerConfig,
        routes: Arc<RouteTable>,
        trace_state: Option<TraceState>,
        upgraded: ShutdownSignal,
    ) -> Router {
        let mut router = Router::new().fallback(dispatch).with_state(routes);

        if config.middleware.log_headers {
            router = router.layer(middleware::from_fn(log_headers));
        }
        if let Some(state) = trace_state {
            router = router.layer(middleware::from_fn_with_state(state, trace_requests));
        }

        let app = router.layer(TraceLayer::new_for_http());
        let upgrade = H2cUpgrade::new(app.clone(), upgraded);
        app.layer(middleware::from_fn_with_state(upgrade, h2c_upgrade))
    }

    /// A clone of the router, for driving requests in-process.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Handle for observing lifecycle phases.
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Serve until `shutdown` fires, then drain and flush.
    ///
    /// In-flight requests get up to `lifecycle.drain_timeout_ms` to finish;
    /// connections still open after that are abandoned.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        let drain_timeout = self.config.lifecycle.drain_timeout();

        let (stop_accepting, accepting_stopped) = oneshot::channel::<()>();
        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();
        let mut serve = tokio::spawn(
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = accepting_stopped.await;
                })
                .into_future(),
        );

        self.lifecycle.advance(Phase::Listening);
        tracing::info!(address = %addr, "Listening (HTTP/1.1 + HTTP/2 h2c)");

        let result = tokio::select! {
            res = &mut serve => flatten(res),
            _ = shutdown.recv() => {
                self.lifecycle.advance(Phase::Draining);
                tracing::info!(
                    drain_timeout_ms = u64::try_from(drain_timeout.as_millis()).unwrap_or(u64::MAX),
                    "Draining in-flight requests"
                );
                let _ = stop_accepting.send(());
                self.upgraded.trigger();

                match tokio::time::timeout(drain_timeout, &mut serve).await {
                    Ok(res) => flatten(res),
                    Err(_) => {
                        tracing::warn!("Drain timeout elapsed, abandoning open connections");
                        serve.abort();
                        Ok(())
                    }
                }
            }
        };

        if let Some(spans) = self.spans {
            if let Err(e) = spans.shutdown().await {
                tracing::warn!(error = %e, "Span flush failed");
            }
        }

        self.lifecycle.advance(Phase::Stopped);
        tracing::info!("HTTP server stopped");
        result
    }
}

fn flatten(
    res: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    Ok(res??)
}
