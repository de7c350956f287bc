//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum::serve, HTTP/1.1 or HTTP/2 prior knowledge)
//!     → h2c.rs (HTTP/1.1 `Upgrade: h2c` → 101 → HTTP/2 on the same socket)
//!     → middleware/trace.rs (optional request span)
//!     → middleware/log_headers.rs (optional header dump)
//!     → handlers.rs (route lookup, delay, fixed status)
//!     → Send to client
//! ```

pub mod h2c;
pub mod handlers;
pub mod middleware;
pub mod server;

pub use handlers::{dispatch, MatchedRoute};
pub use server::{HttpServer, ServerError};
