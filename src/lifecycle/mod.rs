//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → metrics → span processor → signal handlers → bind → serve
//!
//! Shutdown (shutdown.rs, signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger → stop accepting → drain → flush spans
//!
//! Phases (phase.rs):
//!     Starting → Listening → Draining → Stopped
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then observability, then listener
//! - Ordered shutdown: stop accept, drain, flush
//! - Drain has a deadline: open connections are abandoned after it

pub mod phase;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use phase::{Lifecycle, Phase};
pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::{Signal, SignalListener};
pub use startup::start;
