//! In-process caching subsystem.
//!
//! # Data Flow
//! ```text
//! Caller (idempotency coordinator, ...)
//!     → ttl.rs has/get (lazy expiry of the requested key)
//!     → ttl.rs set / insert_if_absent (capacity eviction, oldest first)
//!
//! Background:
//!     sweeper task (fixed interval)
//!     → copy expired keys → delete one by one
//! ```
//!
//! # Design Decisions
//! - Stores are explicitly constructed and owned, never global
//! - No knowledge of HTTP; values are any `Clone` type
//! - Single process only, nothing is persisted

pub mod ttl;

pub use ttl::{TtlStore, TtlStoreConfig};
