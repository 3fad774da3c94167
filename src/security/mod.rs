//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → cors.rs (preflight and origin policy, when configured)
//!     → rate_limit.rs (per-client token bucket, when configured)
//!     → handler
//! Outgoing response:
//!     → headers.rs (hardened default headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: options that cannot be turned into a layer reject the config
//! - No trust in client input

pub mod cors;
pub mod headers;
pub mod rate_limit;

pub use cors::cors_layer;
pub use headers::with_security_headers;
pub use rate_limit::{rate_limit_middleware, RateLimiterState};
