//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use service_kit::config::{IdempotencyOptions, MiddlewareConfig, ServerConfig};
use service_kit::lifecycle::Server;
use tokio::sync::Notify;

/// Config bound to an ephemeral loopback port.
pub fn test_config(service_name: &str) -> ServerConfig {
    let mut config = ServerConfig::new(service_name);
    config.listener.host = "127.0.0.1".to_string();
    config.listener.port = 0;
    config
}

/// Config with the idempotency middleware enabled.
pub fn idempotent_config(service_name: &str) -> ServerConfig {
    let mut config = test_config(service_name);
    config
        .middlewares
        .push(MiddlewareConfig::Idempotency(IdempotencyOptions::default()));
    config
}

/// Initialize and start a server, returning it with its base URL.
pub async fn start_server(config: ServerConfig, routes: Router) -> (Server, SocketAddr, String) {
    let mut server = Server::new();
    server.initialize(config, routes).unwrap();
    let started = server.start(None).await.unwrap();
    let url = format!("http://{}", started.local_addr);
    (server, started.local_addr, url)
}

/// `POST /orders` creating an order per handler execution, `GET /orders` listing.
pub fn order_routes(counter: Arc<AtomicUsize>) -> Router {
    let create = counter.clone();
    Router::new().route(
        "/orders",
        post(move || {
            let counter = create.clone();
            async move {
                let id = counter.fetch_add(1, Ordering::SeqCst) + 1;
                (StatusCode::CREATED, Json(json!({ "id": id, "status": "created" })))
            }
        })
        .get(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Json(json!({ "orders": [] }))
            }
        }),
    )
}

/// Handler gate: the handler signals `entered`, then waits for `release`.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
    pub calls: Arc<AtomicUsize>,
}

impl Gate {
    /// `POST /slow` (released by the gate) and `GET /hang` (never returns).
    pub fn routes(&self) -> Router {
        let slow = self.clone();
        let hang = self.clone();
        Router::new()
            .route(
                "/slow",
                post(move || {
                    let gate = slow.clone();
                    async move {
                        gate.calls.fetch_add(1, Ordering::SeqCst);
                        gate.entered.notify_one();
                        gate.release.notified().await;
                        (StatusCode::CREATED, Json(json!({ "status": "created" })))
                    }
                }),
            )
            .route(
                "/hang",
                get(move || {
                    let gate = hang.clone();
                    async move {
                        gate.calls.fetch_add(1, Ordering::SeqCst);
                        gate.entered.notify_one();
                        std::future::pending::<()>().await;
                        "unreachable"
                    }
                }),
            )
    }

    pub async fn wait_entered(&self) {
        tokio::time::timeout(Duration::from_secs(5), self.entered.notified())
            .await
            .expect("handler was not reached");
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}
