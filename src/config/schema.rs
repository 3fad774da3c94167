//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default request body limit (10 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Root configuration for a service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Service name reported by `/health` and attached to every log line.
    pub service_name: String,

    /// Path prefix under which user routes are mounted.
    pub base_path: String,

    /// Listener configuration (host, port, connection limit).
    pub listener: ListenerConfig,

    /// Request limits applied to every request.
    pub limits: LimitsConfig,

    /// Graceful shutdown settings.
    pub shutdown: ShutdownConfig,

    /// Log level and format.
    pub logging: LoggingConfig,

    /// Metrics exporter settings.
    pub observability: ObservabilityConfig,

    /// Optional middleware, applied in declaration order (first is outermost).
    pub middlewares: Vec<MiddlewareConfig>,
}

impl ServerConfig {
    /// Default configuration for the named service.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Self::default()
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            base_path: "/".to_string(),
            listener: ListenerConfig::default(),
            limits: LimitsConfig::default(),
            shutdown: ShutdownConfig::default(),
            logging: LoggingConfig::default(),
            observability: ObservabilityConfig::default(),
            middlewares: Vec::new(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host or IP to bind.
    pub host: String,

    /// Port to bind; 0 lets the OS pick an ephemeral port.
    pub port: u16,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            max_connections: 10_000,
        }
    }
}

/// Per-request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub body_limit_bytes: usize,

    /// Total time allowed for a request in seconds; 0 disables the timeout.
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            body_limit_bytes: DEFAULT_BODY_LIMIT,
            request_timeout_secs: 30,
        }
    }
}

/// Graceful shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time allowed for in-flight connections to drain, in milliseconds.
    pub timeout_ms: u64,
}

impl ShutdownConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self { timeout_ms: 10_000 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (trace, debug, info, warn, error, or `target=level` lists).
    pub level: String,

    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// A configurable middleware entry.
///
/// ```toml
/// [[middlewares]]
/// type = "idempotency"
/// ttl_ms = 3600000
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MiddlewareConfig {
    Cors(CorsOptions),
    RateLimit(RateLimitOptions),
    Idempotency(IdempotencyOptions),
    RequestLogging,
}

impl MiddlewareConfig {
    /// Name used in logs and validation messages.
    pub fn name(&self) -> &'static str {
        match self {
            MiddlewareConfig::Cors(_) => "cors",
            MiddlewareConfig::RateLimit(_) => "rate_limit",
            MiddlewareConfig::Idempotency(_) => "idempotency",
            MiddlewareConfig::RequestLogging => "request_logging",
        }
    }
}

/// CORS policy options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsOptions {
    /// Allowed origin, or `*` for any.
    pub origin: String,

    /// Allowed methods.
    pub methods: Vec<String>,

    /// Allowed request headers.
    pub allowed_headers: Vec<String>,

    /// Allow credentials. Ignored when `origin` is `*`.
    pub credentials: bool,
}

impl Default for CorsOptions {
    fn default() -> Self {
        Self {
            origin: "*".to_string(),
            methods: ["GET", "POST", "PUT", "DELETE", "PATCH", "OPTIONS"]
                .map(String::from)
                .to_vec(),
            allowed_headers: ["Content-Type", "Authorization"].map(String::from).to_vec(),
            credentials: true,
        }
    }
}

/// Per-client rate limiting options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitOptions {
    /// Requests allowed per window.
    pub limit: u32,

    /// Window length in milliseconds.
    pub window_ms: u64,

    /// Paths (and their sub-paths) that are never limited.
    pub exclude_paths: Vec<String>,

    /// Error message returned with 429.
    pub message: String,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            window_ms: 15 * 60 * 1000,
            exclude_paths: Vec::new(),
            message: "Too many requests, please try again later".to_string(),
        }
    }
}

/// Idempotency coordinator options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdempotencyOptions {
    /// Request header carrying the key (case-insensitive).
    pub header_name: String,

    /// Retention of a key after it was first seen, in milliseconds.
    pub ttl_ms: u64,

    /// Methods subject to deduplication.
    pub methods: Vec<String>,

    /// Maximum number of remembered keys.
    pub capacity: usize,

    /// Interval of the store's background sweep, in milliseconds.
    pub sweep_interval_ms: u64,

    /// Largest response body that is captured for replay.
    pub max_body_bytes: usize,
}

impl Default for IdempotencyOptions {
    fn default() -> Self {
        Self {
            header_name: "Idempotent-Key".to_string(),
            ttl_ms: 24 * 60 * 60 * 1000,
            methods: ["POST", "PUT", "PATCH"].map(String::from).to_vec(),
            capacity: 10_000,
            sweep_interval_ms: 60_000,
            max_body_bytes: DEFAULT_BODY_LIMIT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: ServerConfig = toml::from_str(r#"service_name = "orders""#).unwrap();
        assert_eq!(config.service_name, "orders");
        assert_eq!(config.base_path, "/");
        assert_eq!(config.listener.port, 3000);
        assert_eq!(config.shutdown.timeout(), Duration::from_secs(10));
        assert!(config.middlewares.is_empty());
    }

    #[test]
    fn test_middleware_list_keeps_order() {
        let config: ServerConfig = toml::from_str(
            r#"
            service_name = "orders"

            [[middlewares]]
            type = "cors"
            origin = "https://example.com"

            [[middlewares]]
            type = "idempotency"
            ttl_ms = 1000

            [[middlewares]]
            type = "request_logging"
            "#,
        )
        .unwrap();

        let names: Vec<_> = config.middlewares.iter().map(MiddlewareConfig::name).collect();
        assert_eq!(names, ["cors", "idempotency", "request_logging"]);

        match &config.middlewares[1] {
            MiddlewareConfig::Idempotency(opts) => {
                assert_eq!(opts.ttl_ms, 1000);
                assert_eq!(opts.header_name, "Idempotent-Key");
            }
            other => panic!("unexpected middleware {:?}", other),
        }
    }

    #[test]
    fn test_unknown_middleware_type_is_rejected() {
        let result: Result<ServerConfig, _> = toml::from_str(
            r#"
            service_name = "orders"
            [[middlewares]]
            type = "teleport"
            "#,
        );
        assert!(result.is_err());
    }
}
