//! Per-client rate limiting middleware.
//!
//! # Design Decisions
//! - Buckets that have refilled to capacity are dropped once per window,
//!   since a full bucket behaves exactly like a fresh one
//! - Responses carry `RateLimit` and `RateLimit-Policy` headers (draft 8)

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::config::{RateLimitOptions, ValidationError};
use crate::http::error::ApiError;
use crate::observability::metrics;

/// A simple token bucket rate limiter.
struct TokenBucket {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    fn new(capacity: f64) -> Self {
        Self {
            tokens: capacity,
            last_update: Instant::now(),
        }
    }

    fn refilled(&self, now: Instant, capacity: f64, refill_rate: f64) -> f64 {
        let elapsed = now.duration_since(self.last_update).as_secs_f64();
        (self.tokens + elapsed * refill_rate).min(capacity)
    }

    fn try_acquire(&mut self, now: Instant, capacity: f64, refill_rate: f64) -> bool {
        self.tokens = self.refilled(now, capacity, refill_rate);
        self.last_update = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Outcome of a rate limit check for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    /// Whole requests left in the bucket.
    pub remaining: u32,
    /// Seconds until the bucket is full again.
    pub reset_secs: u64,
    /// Seconds until the next request would be allowed.
    pub retry_after_secs: u64,
}

/// Shared state for the rate limiter: one bucket per client address.
pub struct RateLimiterState {
    buckets: DashMap<String, TokenBucket>,
    capacity: f64,
    refill_rate: f64,
    window: Duration,
    last_sweep: Mutex<Instant>,
    policy_name: String,
    policy: HeaderValue,
    exclude_paths: Vec<String>,
    message: String,
}

impl RateLimiterState {
    /// `limit` requests per `window_ms`, refilled continuously.
    pub fn from_options(opts: &RateLimitOptions) -> Result<Self, ValidationError> {
        if opts.limit == 0 {
            return Err(ValidationError::new("limit", "must be greater than 0"));
        }
        if opts.window_ms == 0 {
            return Err(ValidationError::new("window_ms", "must be greater than 0"));
        }
        if let Some(path) = opts.exclude_paths.iter().find(|p| !p.starts_with('/')) {
            return Err(ValidationError::new(
                "exclude_paths",
                format!("'{}' must start with '/'", path),
            ));
        }

        let capacity = f64::from(opts.limit);
        let window_secs = opts.window_ms.div_ceil(1000);
        let policy_name = format!("\"{}-in-{}sec\"", opts.limit, window_secs);
        let policy = format!("{}; q={}; w={}", policy_name, opts.limit, window_secs);
        Ok(Self {
            buckets: DashMap::new(),
            capacity,
            refill_rate: capacity / (opts.window_ms as f64 / 1000.0),
            window: Duration::from_millis(opts.window_ms),
            last_sweep: Mutex::new(Instant::now()),
            policy_name,
            policy: HeaderValue::try_from(policy)
                .map_err(|e| ValidationError::new("limit", e.to_string()))?,
            exclude_paths: opts.exclude_paths.clone(),
            message: opts.message.clone(),
        })
    }

    /// Exact match, or a listed path followed by `/`.
    fn is_excluded(&self, path: &str) -> bool {
        self.exclude_paths.iter().any(|excluded| {
            let excluded = excluded.trim_end_matches('/');
            path == excluded
                || path
                    .strip_prefix(excluded)
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }

    /// Take one token from `client`'s bucket.
    pub fn check(&self, client: &str) -> Decision {
        let now = Instant::now();
        self.sweep_if_due(now);

        let mut bucket = self
            .buckets
            .entry(client.to_string())
            .or_insert_with(|| TokenBucket::new(self.capacity));
        let allowed = bucket.try_acquire(now, self.capacity, self.refill_rate);
        let tokens = bucket.tokens;
        drop(bucket);

        Decision {
            allowed,
            remaining: tokens.floor() as u32,
            reset_secs: self.secs_to_refill(self.capacity - tokens),
            retry_after_secs: self.secs_to_refill(1.0 - tokens),
        }
    }

    fn secs_to_refill(&self, missing: f64) -> u64 {
        if missing <= 0.0 {
            0
        } else {
            (missing * self.window.as_secs_f64() / self.capacity).ceil() as u64
        }
    }

    fn sweep_if_due(&self, now: Instant) {
        let mut last = self.last_sweep.lock().unwrap_or_else(PoisonError::into_inner);
        if now.duration_since(*last) < self.window {
            return;
        }
        *last = now;
        drop(last);
        self.sweep_idle_at(now);
    }

    /// Drop every bucket that has refilled to capacity. Returns how many were dropped.
    pub fn sweep_idle(&self) -> usize {
        self.sweep_idle_at(Instant::now())
    }

    fn sweep_idle_at(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| bucket.refilled(now, self.capacity, self.refill_rate) < self.capacity);
        let dropped = before.saturating_sub(self.buckets.len());
        if dropped > 0 {
            tracing::debug!(dropped, tracked = self.buckets.len(), "Idle rate limit buckets dropped");
        }
        dropped
    }

    /// Number of clients with a live bucket.
    pub fn tracked_clients(&self) -> usize {
        self.buckets.len()
    }

    fn insert_headers(&self, headers: &mut HeaderMap, decision: &Decision) {
        headers.insert(HeaderName::from_static("ratelimit-policy"), self.policy.clone());
        let state = format!(
            "{}; r={}; t={}",
            self.policy_name,
            decision.remaining,
            decision.reset_secs
        );
        if let Ok(value) = HeaderValue::try_from(state) {
            headers.insert(HeaderName::from_static("ratelimit"), value);
        }
        if !decision.allowed {
            headers.insert(header::RETRY_AFTER, HeaderValue::from(decision.retry_after_secs));
        }
    }
}

/// Middleware function for per-client rate limiting.
pub async fn rate_limit_middleware(
    State(state): State<Arc<RateLimiterState>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if state.is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let decision = state.check(&client);
    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        tracing::warn!(client = %client, path = %request.uri().path(), "Rate limit exceeded");
        metrics::record_rate_limited("window_limit");
        ApiError::too_many_requests(state.message.clone()).into_response()
    };
    state.insert_headers(response.headers_mut(), &decision);
    response
}
