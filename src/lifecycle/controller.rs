//! Server lifecycle controller.
//!
//! ```text
//! Uninitialized ──initialize──▶ Initialized ──start──▶ Running
//!                                    ▲                    │
//!                                    └──reset── Stopped ◀─┘ shutdown
//! ```
//!
//! Transitions take `&mut self`, so a single owner drives the server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{Instrument, Span};

use crate::config::{validate_config, ListenerConfig, ServerConfig};
use crate::http::server::{build_handler_chain, serve, Draining, HandlerChain};
use crate::idempotency::IdempotencyStore;
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::shutdown::Shutdown;
use crate::net::{ConnectionTracker, Listener};
use crate::observability::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Initialized => "initialized",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`Server::initialize`].
#[derive(Debug, Clone)]
pub struct Initialized {
    /// The complete handler chain, usable without a listener.
    pub app: Router,
    /// Span carrying the service name; controller logs run inside it.
    pub span: Span,
}

/// Returned by [`Server::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    pub local_addr: SocketAddr,
    pub port: u16,
    pub service_name: String,
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    serve_task: JoinHandle<Draining>,
}

/// HTTP service with an explicit lifecycle.
///
/// Owns the listener, the open connections and every store created for
/// the configured middleware. Dropping a running server stops accepting
/// and aborts its connections.
pub struct Server {
    state: LifecycleState,
    config: Option<Arc<ServerConfig>>,
    routes: Option<Router>,
    app: Option<Router>,
    stores: Vec<Arc<IdempotencyStore>>,
    span: Span,
    tracker: ConnectionTracker,
    running: Option<RunningServer>,
}

impl Server {
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Uninitialized,
            config: None,
            routes: None,
            app: None,
            stores: Vec::new(),
            span: Span::none(),
            tracker: ConnectionTracker::new(),
            running: None,
        }
    }

    /// Validate `config` and build the handler chain around `routes`.
    ///
    /// On failure the server stays uninitialized.
    pub fn initialize(
        &mut self,
        config: ServerConfig,
        routes: Router,
    ) -> Result<Initialized, LifecycleError> {
        if self.state != LifecycleState::Uninitialized {
            return Err(LifecycleError::AlreadyInitialized);
        }

        validate_config(&config).map_err(LifecycleError::InvalidConfig)?;

        let span = tracing::info_span!("service", service = %config.service_name);
        let _entered = span.enter();

        let HandlerChain { app, stores } =
            build_handler_chain(&config, routes.clone()).map_err(LifecycleError::Middleware)?;

        tracing::info!(
            base_path = %config.base_path,
            middlewares = config.middlewares.len(),
            "Server initialized"
        );

        self.config = Some(Arc::new(config));
        self.routes = Some(routes);
        self.app = Some(app.clone());
        self.stores = stores;
        self.span = span.clone();
        self.transition(LifecycleState::Initialized);

        Ok(Initialized { app, span: span.clone() })
    }

    /// Bind the listener and start accepting connections.
    ///
    /// `overrides` replaces the configured listener settings for this start.
    /// A failed bind leaves the server initialized.
    pub async fn start(
        &mut self,
        overrides: Option<&ListenerConfig>,
    ) -> Result<Started, LifecycleError> {
        match self.state {
            LifecycleState::Uninitialized => return Err(LifecycleError::NotInitialized),
            LifecycleState::Running => return Err(LifecycleError::AlreadyRunning),
            LifecycleState::Stopped => return Err(LifecycleError::Stopped),
            LifecycleState::Initialized => {}
        }
        let (Some(config), Some(app)) = (self.config.clone(), self.app.clone()) else {
            return Err(LifecycleError::NotInitialized);
        };

        let listener_config = overrides.unwrap_or(&config.listener);
        let listener = match Listener::bind(listener_config).instrument(self.span.clone()).await {
            Ok(listener) => listener,
            Err(e) => {
                let err = LifecycleError::from(e);
                self.span.in_scope(|| {
                    if err.is_addr_in_use() {
                        tracing::error!(port = listener_config.port, "Port is already in use");
                    } else {
                        tracing::error!(error = %err, "Failed to start server");
                    }
                });
                return Err(err);
            }
        };
        let local_addr = listener.local_addr().map_err(|source| LifecycleError::Bind {
            address: format!("{}:{}", listener_config.host, listener_config.port),
            source,
        })?;

        let shutdown = Shutdown::new();
        let serve_task = tokio::spawn(
            serve(listener, app, shutdown.subscribe(), self.tracker.clone())
                .instrument(self.span.clone()),
        );

        self.running = Some(RunningServer {
            local_addr,
            shutdown,
            serve_task,
        });
        self.transition(LifecycleState::Running);
        self.span
            .in_scope(|| tracing::info!(address = %local_addr, "Server listening"));

        Ok(Started {
            local_addr,
            port: local_addr.port(),
            service_name: config.service_name.clone(),
        })
    }

    /// Stop accepting, drain open connections, and stop.
    ///
    /// Connections still open at the deadline are aborted and
    /// [`LifecycleError::ShutdownTimeout`] is returned. Either way the server
    /// ends up stopped and its stores are destroyed. A server that is not
    /// running is left untouched.
    pub async fn shutdown(&mut self, timeout: Duration) -> Result<(), LifecycleError> {
        let Some(running) = self.running.take() else {
            self.span
                .in_scope(|| tracing::debug!(state = %self.state, "Shutdown requested while not running"));
            return Ok(());
        };

        let result = drain(running, timeout).instrument(self.span.clone()).await;

        for store in self.stores.drain(..) {
            store.destroy();
        }
        self.transition(LifecycleState::Stopped);
        result
    }

    /// Rebuild a stopped server so it can be started again.
    ///
    /// The handler chain is rebuilt from the retained config and routes, so
    /// idempotency records start empty.
    pub fn reset(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Running => Err(LifecycleError::AlreadyRunning),
            LifecycleState::Stopped => {
                let (Some(config), Some(routes)) = (self.config.clone(), self.routes.clone()) else {
                    return Err(LifecycleError::NotInitialized);
                };
                let _entered = self.span.clone().entered();
                let HandlerChain { app, stores } =
                    build_handler_chain(&config, routes).map_err(LifecycleError::Middleware)?;
                self.app = Some(app);
                self.stores = stores;
                self.transition(LifecycleState::Initialized);
                tracing::info!("Server reset");
                Ok(())
            }
            LifecycleState::Uninitialized | LifecycleState::Initialized => Ok(()),
        }
    }

    fn transition(&mut self, next: LifecycleState) {
        tracing::debug!(from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
        metrics::record_lifecycle(next.as_str());
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn is_initialized(&self) -> bool {
        self.state != LifecycleState::Uninitialized
    }

    pub fn is_running(&self) -> bool {
        self.state == LifecycleState::Running
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running.as_ref().map(|r| r.local_addr)
    }

    /// Connections currently open.
    pub fn active_connections(&self) -> u64 {
        self.tracker.active_count()
    }

    /// The handler chain, once initialized.
    pub fn app(&self) -> Option<&Router> {
        self.app.as_ref()
    }

    pub fn config(&self) -> Option<&ServerConfig> {
        self.config.as_deref()
    }
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

async fn drain(running: RunningServer, timeout: Duration) -> Result<(), LifecycleError> {
    let deadline = Instant::now() + timeout;
    let RunningServer {
        shutdown,
        mut serve_task,
        ..
    } = running;

    tracing::info!(timeout = ?timeout, "Shutting down");
    shutdown.trigger();

    let stopped = timeout_at(deadline, &mut serve_task).await;
    let Draining {
        graceful,
        mut connections,
    } = match stopped {
        Ok(joined) => joined?,
        Err(_) => {
            // Dropping the task drops the listener; wait for it.
            serve_task.abort();
            let _ = serve_task.await;
            tracing::warn!("Accept loop did not stop before the deadline");
            return Err(LifecycleError::ShutdownTimeout { timeout });
        }
    };

    match timeout_at(deadline, graceful.shutdown()).await {
        Ok(()) => {
            while connections.join_next().await.is_some() {}
            tracing::info!("All connections drained");
            Ok(())
        }
        Err(_) => {
            tracing::warn!(
                remaining = connections.len(),
                "Shutdown deadline reached, aborting open connections"
            );
            connections.shutdown().await;
            Err(LifecycleError::ShutdownTimeout { timeout })
        }
    }
}
