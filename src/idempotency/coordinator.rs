//! Request collapsing by idempotency key.

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderName, Method};

use crate::cache::{TtlStore, TtlStoreConfig};
use crate::config::{IdempotencyOptions, ValidationError};
use crate::config::schema::DEFAULT_BODY_LIMIT;
use crate::idempotency::record::{CompletedResponse, IdempotencyRecord};

/// Store type backing the coordinator.
pub type IdempotencyStore = TtlStore<IdempotencyRecord>;

/// Body of the 409 returned for a key that is still in flight.
pub const CONFLICT_MESSAGE: &str = "A request with this idempotency key is already in progress";

/// Validated coordinator settings.
#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    /// Header carrying the key. `HeaderName` is lowercase, so lookup is
    /// case-insensitive.
    pub header_name: HeaderName,
    /// Methods subject to deduplication.
    pub methods: Vec<Method>,
    /// Retention of a key, both while in flight and after completion.
    pub ttl: Duration,
    /// Largest response body captured for replay.
    pub max_body_bytes: usize,
    /// Settings for a privately owned store.
    pub store: TtlStoreConfig,
}

impl IdempotencyConfig {
    /// Validate raw options from the config file.
    pub fn from_options(opts: &IdempotencyOptions) -> Result<Self, ValidationError> {
        let header_name = HeaderName::from_bytes(opts.header_name.as_bytes()).map_err(|_| {
            ValidationError::new(
                "header_name",
                format!("'{}' is not a valid header name", opts.header_name),
            )
        })?;

        if opts.methods.is_empty() {
            return Err(ValidationError::new("methods", "must list at least one method"));
        }
        let methods = opts
            .methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes())
                    .map_err(|_| ValidationError::new("methods", format!("'{}' is not a valid method", m)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        if opts.ttl_ms == 0 {
            return Err(ValidationError::new("ttl_ms", "must be greater than 0"));
        }
        if opts.capacity == 0 {
            return Err(ValidationError::new("capacity", "must be greater than 0"));
        }
        if opts.sweep_interval_ms == 0 {
            return Err(ValidationError::new("sweep_interval_ms", "must be greater than 0"));
        }
        if opts.max_body_bytes == 0 {
            return Err(ValidationError::new("max_body_bytes", "must be greater than 0"));
        }

        Ok(Self {
            header_name,
            methods,
            ttl: Duration::from_millis(opts.ttl_ms),
            max_body_bytes: opts.max_body_bytes,
            store: TtlStoreConfig {
                capacity: opts.capacity,
                sweep_interval: Duration::from_millis(opts.sweep_interval_ms),
            },
        })
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            header_name: HeaderName::from_static("idempotent-key"),
            methods: vec![Method::POST, Method::PUT, Method::PATCH],
            ttl: Duration::from_secs(24 * 60 * 60),
            max_body_bytes: DEFAULT_BODY_LIMIT,
            store: TtlStoreConfig::default(),
        }
    }
}

/// What to do with an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Not subject to deduplication. The store was not touched.
    Bypass,
    /// First sighting of the key, now marked in flight. Run the handler.
    Proceed(String),
    /// The key is still in flight.
    Conflict,
    /// The key already completed with this response.
    Replay(CompletedResponse),
}

/// Idempotency coordinator.
///
/// Collapses duplicate submissions of the same keyed write into a single
/// handler execution. The in-flight mark is placed with one atomic
/// insert-if-absent, so two concurrent first submissions cannot both run.
#[derive(Debug)]
pub struct Idempotency {
    config: IdempotencyConfig,
    store: Arc<IdempotencyStore>,
}

impl Idempotency {
    /// Coordinator with a private store built from `config.store`.
    pub fn new(config: IdempotencyConfig) -> Self {
        let store = Arc::new(TtlStore::new(config.store));
        Self { config, store }
    }

    /// Coordinator over a caller-owned store.
    pub fn with_store(config: IdempotencyConfig, store: Arc<IdempotencyStore>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<IdempotencyStore> {
        &self.store
    }

    /// The key for this request, if it is subject to deduplication.
    ///
    /// Empty values and values that are not visible ASCII count as absent.
    pub fn key_for(&self, method: &Method, headers: &HeaderMap) -> Option<String> {
        if !self.config.methods.contains(method) {
            return None;
        }
        headers
            .get(&self.config.header_name)
            .and_then(|value| value.to_str().ok())
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
    }

    /// Decide how to handle a request, marking its key in flight when new.
    pub fn admit(&self, method: &Method, headers: &HeaderMap) -> Admission {
        let Some(key) = self.key_for(method, headers) else {
            return Admission::Bypass;
        };

        match self
            .store
            .insert_if_absent(&key, IdempotencyRecord::InFlight, self.config.ttl)
        {
            None => Admission::Proceed(key),
            Some(IdempotencyRecord::InFlight) => Admission::Conflict,
            Some(IdempotencyRecord::Completed(response)) => Admission::Replay(response),
        }
    }

    /// Persist the response of a request admitted with [`Admission::Proceed`].
    ///
    /// Only an in-flight (or already evicted) key is written; a completed
    /// record is never overwritten. Returns whether the record was stored.
    pub fn complete(&self, key: &str, response: CompletedResponse) -> bool {
        self.store.set_if(
            key,
            IdempotencyRecord::Completed(response),
            self.config.ttl,
            |current| !matches!(current, Some(IdempotencyRecord::Completed(_))),
        )
    }
}
