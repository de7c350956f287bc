//! h2c test server.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client request (HTTP/1.1 or HTTP/2 prior knowledge)
//!     ─────────────────▶ net listener ─▶ axum serve
//!                                          │
//!                         ┌────────────────▼────────────────┐
//!                         │ optional: request span (trace)  │
//!                         │ optional: header logger         │
//!                         │ dispatcher ─▶ route table       │
//!                         │   success   200  (2ms)          │
//!                         │   error     500  (0ms)          │
//!                         │   timeout   500  (1960ms)       │
//!                         │   default   400  (8ms)          │
//!                         └────────────────┬────────────────┘
//!     Client response  ◀───────────────────┘  (status only, no body)
//!
//!     SIGINT/SIGTERM ─▶ stop accepting ─▶ drain (bounded) ─▶ flush spans ─▶ exit
//! ```

use h2c_test_server::{config, lifecycle, observability};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match config::load_from_env() {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet.
            eprintln!("h2c-test-server: {e}");
            return Err(e.into());
        }
    };

    observability::logging::init_logging(&config.observability)?;

    tracing::info!("h2c-test-server v{} starting", env!("CARGO_PKG_VERSION"));

    if let Err(e) = lifecycle::start(config).await {
        tracing::error!(error = %e, "Fatal error");
        return Err(e.into());
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
