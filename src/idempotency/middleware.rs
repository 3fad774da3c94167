//! Axum middleware wrapping the coordinator.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::http::error::ApiError;
use crate::idempotency::coordinator::{Admission, Idempotency, CONFLICT_MESSAGE};
use crate::idempotency::record::CompletedResponse;
use crate::observability::metrics;

/// Deduplicate keyed write requests.
///
/// Install with `axum::middleware::from_fn_with_state(Arc<Idempotency>, idempotency_middleware)`.
pub async fn idempotency_middleware(
    State(idem): State<Arc<Idempotency>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let key = match idem.admit(req.method(), req.headers()) {
        Admission::Bypass => {
            metrics::record_idempotency("bypass");
            return next.run(req).await;
        }
        Admission::Conflict => {
            tracing::debug!(method = %req.method(), path = %req.uri().path(), "Idempotency key in flight");
            metrics::record_idempotency("conflict");
            return ApiError::conflict(CONFLICT_MESSAGE).into_response();
        }
        Admission::Replay(completed) => {
            tracing::debug!(status = %completed.status, "Replaying stored response");
            metrics::record_idempotency("replayed");
            return completed.replay();
        }
        Admission::Proceed(key) => key,
    };

    let response = next.run(req).await;
    let (parts, body) = response.into_parts();

    let bytes = match axum::body::to_bytes(body, idem.config().max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            // Key stays in flight until its TTL runs out.
            tracing::warn!(key = %key, error = %e, "Failed to capture response for idempotency key");
            metrics::record_idempotency("capture_failed");
            return ApiError::internal(format!("response capture failed: {}", e)).into_response();
        }
    };

    let completed = CompletedResponse {
        status: parts.status,
        content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
        body: bytes.clone(),
    };
    if idem.complete(&key, completed) {
        tracing::debug!(key = %key, status = %parts.status, "Stored response for idempotency key");
        metrics::record_idempotency("stored");
    }

    Response::from_parts(parts, Body::from(bytes))
}
