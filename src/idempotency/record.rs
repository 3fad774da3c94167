//! Stored idempotency state per key.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::Response;

/// Marker header set on replayed responses.
pub const REPLAYED_HEADER: HeaderName = HeaderName::from_static("x-idempotent-replayed");

/// State of one idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyRecord {
    /// The first request with this key is still being handled.
    InFlight,
    /// The first request finished with this response.
    Completed(CompletedResponse),
}

/// The captured terminal response of a keyed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: Bytes,
}

impl CompletedResponse {
    /// Rebuild the response for a duplicate request, marked as replayed.
    pub fn replay(&self) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        if let Some(content_type) = &self.content_type {
            headers.insert(header::CONTENT_TYPE, content_type.clone());
        }
        headers.insert(REPLAYED_HEADER, HeaderValue::from_static("true"));
        response
    }
}
