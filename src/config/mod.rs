//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! compiled defaults, or TOML file named by H2C_TEST_SERVER_CONFIG
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → handed to HttpServer at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    HandlerConfig, LifecycleConfig, ListenerConfig, LogFormat, MiddlewareConfig,
    ObservabilityConfig, ServerConfig, TracingConfig,
};
