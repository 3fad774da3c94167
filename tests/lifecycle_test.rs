//! Lifecycle integration tests over real sockets.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use reqwest::StatusCode;
use serde_json::Value;
use service_kit::config::ListenerConfig;
use service_kit::lifecycle::{LifecycleError, LifecycleState, Server};
use tokio::net::TcpStream;

mod common;

use common::{client, start_server, test_config, Gate};

#[tokio::test]
async fn test_health_endpoint() {
    let (mut server, _, url) = start_server(test_config("orders"), Router::new()).await;

    let response = client().get(format!("{}/health", url)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "orders");
    assert!(body["uptime"].as_f64().unwrap() >= 0.0);
    assert!(body["timestamp"].is_string());

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_user_health_route_replaces_builtin() {
    let routes = Router::new().route("/health", get(|| async { "custom health" }));
    let mut server = Server::new();
    server.initialize(test_config("orders"), routes).unwrap();
    assert_eq!(server.state(), LifecycleState::Initialized);

    let started = server.start(None).await.unwrap();
    let response = client()
        .get(format!("http://{}/health", started.local_addr))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.unwrap(), "custom health");

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_unknown_path_is_json_404() {
    let (mut server, _, url) = start_server(test_config("orders"), Router::new()).await;

    let response = client().get(format!("{}/missing/thing", url)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Not Found");
    assert_eq!(body["path"], "/missing/thing");

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_lifecycle_misuse() {
    let mut server = Server::new();
    assert!(matches!(server.start(None).await, Err(LifecycleError::NotInitialized)));
    server.shutdown(Duration::from_secs(1)).await.unwrap();

    server.initialize(test_config("orders"), Router::new()).unwrap();
    assert!(matches!(
        server.initialize(test_config("orders"), Router::new()),
        Err(LifecycleError::AlreadyInitialized)
    ));

    server.start(None).await.unwrap();
    assert!(matches!(server.start(None).await, Err(LifecycleError::AlreadyRunning)));
    server.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(server.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_graceful_drain_completes_in_flight_request() {
    let gate = Gate::default();
    let (mut server, _, url) = start_server(test_config("orders"), gate.routes()).await;

    let request = tokio::spawn(client().post(format!("{}/slow", url)).send());
    gate.wait_entered().await;

    let release = gate.release.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        release.notify_one();
    });

    server.shutdown(Duration::from_secs(5)).await.unwrap();
    assert_eq!(server.state(), LifecycleState::Stopped);

    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_shutdown_timeout_with_hanging_handler() {
    let gate = Gate::default();
    let (mut server, addr, url) = start_server(test_config("orders"), gate.routes()).await;

    let request = tokio::spawn(client().get(format!("{}/hang", url)).send());
    gate.wait_entered().await;
    assert_eq!(server.active_connections(), 1);

    let err = server.shutdown(Duration::from_millis(200)).await.unwrap_err();
    assert!(matches!(err, LifecycleError::ShutdownTimeout { .. }));
    assert_eq!(server.state(), LifecycleState::Stopped);

    // Listener is closed and the hanging connection was aborted.
    assert!(TcpStream::connect(addr).await.is_err());
    assert!(request.await.unwrap().is_err());
    assert_eq!(server.active_connections(), 0);
    assert_eq!(gate.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_bind_conflict_leaves_server_initialized() {
    let (mut first, addr, _) = start_server(test_config("first"), Router::new()).await;

    let mut config = test_config("second");
    config.listener.port = addr.port();
    let mut second = Server::new();
    second.initialize(config, Router::new()).unwrap();

    let err = second.start(None).await.unwrap_err();
    assert!(err.is_addr_in_use());
    assert_eq!(second.state(), LifecycleState::Initialized);

    let overrides = ListenerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        max_connections: 16,
    };
    let started = second.start(Some(&overrides)).await.unwrap();
    assert_ne!(started.port, addr.port());

    second.shutdown(Duration::from_secs(5)).await.unwrap();
    first.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[tokio::test]
async fn test_reset_clears_idempotency_records() {
    let counter = Arc::new(AtomicUsize::new(0));
    let (mut server, _, url) =
        start_server(common::idempotent_config("orders"), common::order_routes(counter.clone())).await;

    let post = |url: String| async move {
        client()
            .post(format!("{}/orders", url))
            .header("Idempotent-Key", "reset-key")
            .send()
            .await
            .unwrap()
    };

    assert_eq!(post(url.clone()).await.status(), StatusCode::CREATED);
    assert!(post(url).await.headers().contains_key("x-idempotent-replayed"));
    server.shutdown(Duration::from_secs(5)).await.unwrap();

    server.reset().unwrap();
    let started = server.start(None).await.unwrap();
    let url = format!("http://{}", started.local_addr);

    let response = post(url).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(!response.headers().contains_key("x-idempotent-replayed"));
    assert_eq!(counter.load(Ordering::SeqCst), 2);

    server.shutdown(Duration::from_secs(5)).await.unwrap();
}
