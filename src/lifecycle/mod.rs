//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Initialize (controller.rs):
//!     Validate config → Build handler chain → Initialized
//!
//! Start (controller.rs):
//!     Bind listener → Spawn accept loop → Running
//!
//! Shutdown (controller.rs, shutdown.rs):
//!     Trigger → Stop accepting → Drain connections (bounded) → Stopped
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → caller invokes shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then handler chain, then listener
//! - Ordered shutdown: stop accept, drain, destroy stores
//! - Shutdown has a hard deadline: remaining connections are aborted

pub mod controller;
pub mod error;
pub mod shutdown;
pub mod signals;

pub use controller::{Initialized, LifecycleState, Server, Started};
pub use error::LifecycleError;
pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::shutdown_signal;
