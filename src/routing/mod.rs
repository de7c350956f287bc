//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (route lookup)
//!     → matcher.rs (exact / subtree pattern evaluation)
//!     → Return: matched behavior, or the default behavior
//!
//! Route Compilation (at startup):
//!     HandlerConfig (delays)
//!     → canned patterns + behaviors
//!     → Freeze as immutable RouteTable
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (exact map + prefix scan)
//! - Deterministic: same path always resolves to the same behavior

pub mod matcher;
pub mod router;

pub use matcher::PathPattern;
pub use router::{Behavior, BehaviorKind, Resolved, Route, RouteTable};
