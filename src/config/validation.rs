//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (queue sizes > 0, drain timeout > 0)
//! - Check addresses and exporter URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// Upper bound for any single handler delay.
const MAX_HANDLER_DELAY_MS: u64 = 60_000;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field}: delay of {value}ms exceeds {max}ms", max = MAX_HANDLER_DELAY_MS)]
    DelayTooLong { field: &'static str, value: u64 },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("tracing.max_export_batch_size ({batch}) exceeds tracing.max_queue_size ({queue})")]
    BatchExceedsQueue { batch: usize, queue: usize },

    #[error("tracing.endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("tracing.operation_name must not be empty")]
    EmptyOperationName,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(
        "listener.bind_address",
        &config.listener.bind_address,
        &mut errors,
    );
    if config.observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &config.observability.metrics_address,
            &mut errors,
        );
    }

    let handlers = &config.handlers;
    for (field, value) in [
        ("handlers.success_delay_ms", handlers.success_delay_ms),
        ("handlers.error_delay_ms", handlers.error_delay_ms),
        ("handlers.slow_delay_ms", handlers.slow_delay_ms),
        ("handlers.default_delay_ms", handlers.default_delay_ms),
    ] {
        if value > MAX_HANDLER_DELAY_MS {
            errors.push(ValidationError::DelayTooLong { field, value });
        }
    }

    let tracing = &config.tracing;
    if tracing.operation_name.trim().is_empty() {
        errors.push(ValidationError::EmptyOperationName);
    }
    if tracing.max_queue_size == 0 {
        errors.push(ValidationError::Zero {
            field: "tracing.max_queue_size",
        });
    }
    if tracing.max_export_batch_size == 0 {
        errors.push(ValidationError::Zero {
            field: "tracing.max_export_batch_size",
        });
    } else if tracing.max_export_batch_size > tracing.max_queue_size {
        errors.push(ValidationError::BatchExceedsQueue {
            batch: tracing.max_export_batch_size,
            queue: tracing.max_queue_size,
        });
    }
    if tracing.export_timeout_ms == 0 {
        errors.push(ValidationError::Zero {
            field: "tracing.export_timeout_ms",
        });
    }
    if let Some(endpoint) = &tracing.endpoint {
        match url::Url::parse(endpoint) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => errors.push(ValidationError::InvalidEndpoint(format!(
                "unsupported scheme {:?}",
                url.scheme()
            ))),
            Err(e) => errors.push(ValidationError::InvalidEndpoint(e.to_string())),
        }
    }

    if config.lifecycle.drain_timeout_ms == 0 {
        errors.push(ValidationError::Zero {
            field: "lifecycle.drain_timeout_ms",
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}
