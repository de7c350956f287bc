//! Optional request middleware.
//!
//! Both layers only observe: neither touches the request nor changes the
//! status code produced by the dispatcher.

pub mod log_headers;
pub mod trace;

pub use log_headers::log_headers;
pub use trace::{trace_requests, TraceState};
