//! Idempotency subsystem.
//!
//! # Data Flow
//! ```text
//! request with key header
//!     → coordinator.rs (admit: bypass / proceed / conflict / replay)
//!     → downstream handler (only on proceed)
//!     → middleware.rs (capture status, content type, body)
//!     → coordinator.rs (complete: InFlight → Completed)
//! ```
//!
//! # Design Decisions
//! - Records live in a [`TtlStore`](crate::cache::TtlStore) owned by the coordinator
//! - A key whose handler never finishes stays in flight until its TTL expires

pub mod coordinator;
pub mod middleware;
pub mod record;

pub use coordinator::{Admission, Idempotency, IdempotencyConfig, IdempotencyStore, CONFLICT_MESSAGE};
pub use middleware::idempotency_middleware;
pub use record::{CompletedResponse, IdempotencyRecord, REPLAYED_HEADER};
