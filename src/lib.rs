//! HTTP/2 cleartext (h2c) test server library.
//!
//! Serves a fixed set of canned endpoints for exercising HTTP client
//! behavior: success, server error, slow (timeout-inducing), and a default
//! 400 for everything else.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod routing;

pub use config::ServerConfig;
pub use http::{HttpServer, ServerError};
pub use lifecycle::{Lifecycle, Phase, Shutdown, ShutdownSignal};
