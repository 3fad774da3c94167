//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, parseable addresses and filters)
//! - Validate middleware options by building them once
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before the config is accepted by the lifecycle controller

use std::net::SocketAddr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::{MiddlewareConfig, ServerConfig};
use crate::idempotency::IdempotencyConfig;
use crate::security::cors::cors_layer;
use crate::security::rate_limit::RateLimiterState;

/// A single semantic problem with a configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Prefix the field path, e.g. `header_name` → `middlewares[0].header_name`.
    pub fn within(self, prefix: &str) -> Self {
        Self {
            field: format!("{}.{}", prefix, self.field),
            message: self.message,
        }
    }
}

pub(crate) fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.service_name.trim().is_empty() {
        errors.push(ValidationError::new("service_name", "is required and must be non-empty"));
    }

    if !config.base_path.starts_with('/') {
        errors.push(ValidationError::new("base_path", "must start with '/'"));
    }

    if config.listener.host.trim().is_empty() {
        errors.push(ValidationError::new("listener.host", "must be non-empty"));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.limits.body_limit_bytes == 0 {
        errors.push(ValidationError::new("limits.body_limit_bytes", "must be greater than 0"));
    }

    if config.shutdown.timeout_ms == 0 {
        errors.push(ValidationError::new("shutdown.timeout_ms", "must be greater than 0"));
    }

    if let Err(e) = EnvFilter::try_new(&config.logging.level) {
        errors.push(ValidationError::new("logging.level", e.to_string()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address such as 0.0.0.0:9090",
        ));
    }

    for (index, middleware) in config.middlewares.iter().enumerate() {
        let prefix = format!("middlewares[{}]", index);
        let result = match middleware {
            MiddlewareConfig::Cors(opts) => cors_layer(opts).map(|_| ()),
            MiddlewareConfig::RateLimit(opts) => RateLimiterState::from_options(opts).map(|_| ()),
            MiddlewareConfig::Idempotency(opts) => IdempotencyConfig::from_options(opts).map(|_| ()),
            MiddlewareConfig::RequestLogging => Ok(()),
        };
        if let Err(e) = result {
            errors.push(e.within(&prefix));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{CorsOptions, IdempotencyOptions};

    #[test]
    fn test_valid_config() {
        let config = ServerConfig::new("orders");
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServerConfig::default();
        config.base_path = "api".to_string();
        config.listener.max_connections = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["service_name", "base_path", "listener.max_connections"]);
    }

    #[test]
    fn test_middleware_errors_carry_index() {
        let mut config = ServerConfig::new("orders");
        config.middlewares.push(MiddlewareConfig::RequestLogging);
        config.middlewares.push(MiddlewareConfig::Idempotency(IdempotencyOptions {
            header_name: "bad header".to_string(),
            ..IdempotencyOptions::default()
        }));
        config.middlewares.push(MiddlewareConfig::Cors(CorsOptions {
            origin: "bad\norigin".to_string(),
            ..CorsOptions::default()
        }));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "middlewares[1].header_name");
        assert_eq!(errors[1].field, "middlewares[2].origin");
    }

    #[test]
    fn test_metrics_address_checked_only_when_enabled() {
        let mut config = ServerConfig::new("orders");
        config.observability.metrics_address = "nowhere".to_string();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "observability.metrics_address");
    }
}
