//! Configurable middleware registry.
//!
//! Turns the `middlewares` list from the config into layers on the router.
//! The first entry ends up outermost, so it sees the request first.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::Router;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;
use tracing::{Level, Span};

use crate::config::{MiddlewareConfig, ValidationError};
use crate::http::request::request_id;
use crate::idempotency::{idempotency_middleware, Idempotency, IdempotencyConfig, IdempotencyStore};
use crate::security::{cors_layer, rate_limit_middleware, RateLimiterState};

/// Request span carrying the method, URI and request id.
pub fn make_request_span(request: &Request<Body>) -> Span {
    tracing::info_span!(
        "request",
        method = %request.method(),
        uri = %request.uri(),
        request_id = request_id(request).unwrap_or("-"),
    )
}

/// Router with the configured middleware applied, plus the stores created for it.
pub struct Layered {
    pub router: Router,
    pub stores: Vec<Arc<IdempotencyStore>>,
}

/// Apply `middlewares` in declaration order, first entry outermost.
///
/// On error, stores already created are destroyed before returning.
pub fn apply_middlewares(
    router: Router,
    middlewares: &[MiddlewareConfig],
) -> Result<Layered, ValidationError> {
    let mut router = router;
    let mut stores: Vec<Arc<IdempotencyStore>> = Vec::new();

    for (index, middleware) in middlewares.iter().enumerate().rev() {
        let prefix = format!("middlewares[{}]", index);
        let applied = apply_one(router, middleware, &mut stores);
        router = match applied {
            Ok(router) => router,
            Err(e) => {
                for store in &stores {
                    store.destroy();
                }
                return Err(e.within(&prefix));
            }
        };
        tracing::debug!(middleware = middleware.name(), index, "Middleware applied");
    }

    Ok(Layered { router, stores })
}

fn apply_one(
    router: Router,
    middleware: &MiddlewareConfig,
    stores: &mut Vec<Arc<IdempotencyStore>>,
) -> Result<Router, ValidationError> {
    let router = match middleware {
        MiddlewareConfig::Cors(opts) => router.layer(cors_layer(opts)?),
        MiddlewareConfig::RateLimit(opts) => {
            let state = Arc::new(RateLimiterState::from_options(opts)?);
            router.layer(axum::middleware::from_fn_with_state(state, rate_limit_middleware))
        }
        MiddlewareConfig::Idempotency(opts) => {
            let idem = Idempotency::new(IdempotencyConfig::from_options(opts)?);
            stores.push(Arc::clone(idem.store()));
            router.layer(axum::middleware::from_fn_with_state(
                Arc::new(idem),
                idempotency_middleware,
            ))
        }
        MiddlewareConfig::RequestLogging => router.layer(
            TraceLayer::new_for_http()
                .make_span_with(make_request_span)
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Millis),
                ),
        ),
    };
    Ok(router)
}
