//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Configured bind address
//!     → listener.rs (parse, bind)
//!     → Hand off to HTTP layer (axum::serve, HTTP/1.1 + h2c)
//! ```
//!
//! # Design Decisions
//! - Cleartext only; HTTP/2 by prior knowledge or `Upgrade: h2c`
//! - Bind failures are fatal at startup

pub mod listener;

pub use listener::{bind, ListenerError};
