//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper auto builder, HTTP/1.1 and HTTP/2)
//!     → base layers (panic catcher, request id, security headers,
//!       compression, timeout, body limit)
//!     → middleware/ (configured: cors, rate_limit, idempotency, request_logging)
//!     → /health, user routes, or the 404 fallback
//!     → error.rs (JSON error bodies)
//! ```

pub mod error;
pub mod middleware;
pub mod request;
pub mod server;

pub use error::ApiError;
pub use request::X_REQUEST_ID;
pub use server::{build_handler_chain, HandlerChain};
