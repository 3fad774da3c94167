//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (validated, immutable)
//!     → handed to the lifecycle controller, shared via Arc
//! ```
//!
//! # Design Decisions
//! - Config is immutable once the controller accepts it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CorsOptions, IdempotencyOptions, LimitsConfig, ListenerConfig, LogFormat, LoggingConfig,
    MiddlewareConfig, ObservabilityConfig, RateLimitOptions, ServerConfig, ShutdownConfig,
};
pub use validation::{validate_config, ValidationError};
