//! HTTP service kit: a request-deduplicating HTTP scaffold with an explicit lifecycle.

// Core subsystems
pub mod cache;
pub mod config;
pub mod http;
pub mod idempotency;
pub mod net;

// Endpoints
pub mod health;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use cache::{TtlStore, TtlStoreConfig};
pub use config::schema::ServerConfig;
pub use http::ApiError;
pub use idempotency::{Idempotency, IdempotencyConfig};
pub use lifecycle::{LifecycleError, LifecycleState, Server};
