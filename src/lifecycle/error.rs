use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::config::validation::{join_errors, ValidationError};
use crate::net::ListenerError;

/// Errors from the lifecycle controller.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Server already initialized")]
    AlreadyInitialized,

    #[error("Server not initialized. Call initialize() first.")]
    NotInitialized,

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Server stopped. Call reset() before starting again.")]
    Stopped,

    #[error("Invalid configuration: {}", join_errors(.0))]
    InvalidConfig(Vec<ValidationError>),

    #[error("Invalid middleware configuration: {0}")]
    Middleware(ValidationError),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Listener(ListenerError),

    #[error("Shutdown did not complete within {timeout:?}; remaining connections were aborted")]
    ShutdownTimeout { timeout: Duration },

    #[error("Server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<ListenerError> for LifecycleError {
    fn from(err: ListenerError) -> Self {
        match err {
            ListenerError::Bind { address, source } => LifecycleError::Bind { address, source },
            other => LifecycleError::Listener(other),
        }
    }
}

impl LifecycleError {
    /// The bind failed because the port is taken.
    pub fn is_addr_in_use(&self) -> bool {
        matches!(self, LifecycleError::Bind { source, .. } if source.kind() == io::ErrorKind::AddrInUse)
    }
}
