//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the handler chain: base layers, configured middleware, user routes,
//!   `/health` and the 404 fallback
//! - Configure HTTP/1.1 and HTTP/2 support
//! - Run the accept loop until shutdown is signalled
//! - Hand open connections back for draining

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, DefaultBodyLimit};
use axum::http::Request;
use axum::Router;
use hyper::body::Incoming;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use tokio::task::JoinSet;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::{LimitsConfig, ServerConfig, ValidationError};
use crate::health::{health_routes, HealthState};
use crate::http::error::{handle_panic, not_found};
use crate::http::middleware::{apply_middlewares, Layered};
use crate::http::request::with_request_id;
use crate::idempotency::IdempotencyStore;
use crate::lifecycle::ShutdownSignal;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::security::with_security_headers;

/// The assembled application and the stores it owns.
pub struct HandlerChain {
    pub app: Router,
    pub stores: Vec<Arc<IdempotencyStore>>,
}

/// Assemble the full handler chain for `routes`.
///
/// User routes are mounted at the root when `base_path` is `/` and nested
/// under it otherwise. `/health` and the 404 handler only see requests no
/// user route matched, so a user route at `/health` wins.
pub fn build_handler_chain(
    config: &ServerConfig,
    routes: Router,
) -> Result<HandlerChain, ValidationError> {
    let base = config.base_path.trim_end_matches('/');
    let app = if base.is_empty() {
        routes
    } else {
        Router::new().nest(base, routes)
    };

    let unmatched = health_routes(HealthState::new(&config.service_name)).fallback(not_found);
    let app = app.fallback_service(unmatched);

    let Layered { router, stores } = apply_middlewares(app, &config.middlewares)?;

    Ok(HandlerChain {
        app: with_base_layers(router, &config.limits),
        stores,
    })
}

/// Layers applied to every request, innermost first.
#[allow(deprecated)]
fn with_base_layers(router: Router, limits: &LimitsConfig) -> Router {
    let mut router = router
        .layer(DefaultBodyLimit::max(limits.body_limit_bytes))
        .layer(RequestBodyLimitLayer::new(limits.body_limit_bytes));

    if limits.request_timeout_secs > 0 {
        router = router.layer(TimeoutLayer::new(Duration::from_secs(limits.request_timeout_secs)));
    }

    let router = router.layer(CompressionLayer::new());
    let router = with_security_headers(router);
    let router = with_request_id(router);
    router.layer(CatchPanicLayer::custom(handle_panic))
}

/// Connections still open when the accept loop stopped.
pub struct Draining {
    pub graceful: GracefulShutdown,
    pub connections: JoinSet<()>,
}

/// Accept connections until `signal` fires, then drop the listener.
///
/// Each connection runs in its own task inside the returned [`JoinSet`],
/// watched by the returned [`GracefulShutdown`].
pub async fn serve(
    listener: Listener,
    app: Router,
    mut signal: ShutdownSignal,
    tracker: ConnectionTracker,
) -> Draining {
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();
    let builder = auto::Builder::new(TokioExecutor::new());

    loop {
        tokio::select! {
            _ = signal.recv() => break,

            Some(_) = connections.join_next(), if !connections.is_empty() => {}

            accepted = listener.accept() => {
                let (stream, peer, permit) = match accepted {
                    Ok(accepted) => accepted,
                    Err(ListenerError::Accept(e)) => {
                        tracing::warn!(error = %e, "Accept failed");
                        continue;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Listener failed, no longer accepting");
                        break;
                    }
                };

                let guard = tracker.track();
                let service = app.clone().map_request(move |mut req: Request<Incoming>| {
                    req.extensions_mut().insert(ConnectInfo::<SocketAddr>(peer));
                    req
                });
                let conn = builder
                    .serve_connection_with_upgrades(TokioIo::new(stream), TowerToHyperService::new(service))
                    .into_owned();
                let conn = graceful.watch(conn);

                connections.spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::debug!(connection_id = %guard.id(), peer_addr = %peer, error = %e, "Connection error");
                    }
                    drop(permit);
                    drop(guard);
                });
            }
        }
    }

    drop(listener);
    tracing::info!(open_connections = connections.len(), "Stopped accepting connections");

    Draining {
        graceful,
        connections,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, StatusCode};
    use axum::routing::get;
    use serde_json::{json, Value};

    async fn call(app: &Router, path: &str) -> axum::response::Response {
        app.clone()
            .oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn routes() -> Router {
        Router::new()
            .route("/orders", get(|| async { "orders" }))
            .route("/boom", get(|| async { panic!("boom") as () }))
    }

    #[tokio::test]
    async fn test_root_base_path_merges_routes() {
        let chain = build_handler_chain(&ServerConfig::new("orders"), routes()).unwrap();

        let response = call(&chain.app, "/orders").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");

        assert_eq!(call(&chain.app, "/health").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_nested_base_path() {
        let mut config = ServerConfig::new("orders");
        config.base_path = "/api/v1/".to_string();
        let chain = build_handler_chain(&config, routes()).unwrap();

        assert_eq!(call(&chain.app, "/api/v1/orders").await.status(), StatusCode::OK);
        assert_eq!(call(&chain.app, "/health").await.status(), StatusCode::OK);

        let missing = call(&chain.app, "/orders").await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(missing).await, json!({ "error": "Not Found", "path": "/orders" }));
    }

    #[tokio::test]
    async fn test_user_health_route_takes_precedence() {
        let custom = || Router::new().route("/health", get(|| async { "custom" }));

        let chain = build_handler_chain(&ServerConfig::new("orders"), custom()).unwrap();
        let response = call(&chain.app, "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"custom");

        let mut config = ServerConfig::new("orders");
        config.base_path = "/api".to_string();
        let chain = build_handler_chain(&config, custom()).unwrap();
        let bytes = axum::body::to_bytes(call(&chain.app, "/api/health").await.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"custom");
        assert_eq!(json_body(call(&chain.app, "/health").await).await["status"], "healthy");
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let chain = build_handler_chain(&ServerConfig::new("orders"), routes()).unwrap();

        let response = call(&chain.app, "/boom").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json_body(response).await, json!({ "error": "Internal Server Error" }));
    }
}
