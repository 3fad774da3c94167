//! Time-bounded key/value store with a capacity bound.
//!
//! # Responsibilities
//! - Lazy expiry of the requested key on every read
//! - Periodic background sweep of expired entries
//! - Eviction of the oldest-inserted entry when the capacity is reached
//!
//! # Design Decisions
//! - One mutex guards the map and the insertion-order index together,
//!   and it is never held across an `.await`
//! - Insertion order is a sequence number; overwriting a key keeps its slot
//! - The sweeper copies expired keys out, then deletes them one at a time

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::observability::metrics;

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Default interval between background sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Construction parameters for a [`TtlStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlStoreConfig {
    /// Maximum number of entries before the oldest one is evicted.
    pub capacity: usize,
    /// Interval of the background sweep.
    pub sweep_interval: Duration,
}

impl Default for TtlStoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

struct Entry<V> {
    value: V,
    expires_at: Instant,
    seq: u64,
}

impl<V> Entry<V> {
    /// Equal to the deadline is still alive.
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

struct Entries<V> {
    map: HashMap<String, Entry<V>>,
    /// Insertion sequence → key. The first element is the oldest live key.
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<V> Entries<V> {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            order: BTreeMap::new(),
            next_seq: 0,
        }
    }

    /// Look up a live entry, dropping it first if it has expired.
    fn live(&mut self, key: &str, now: Instant) -> Option<&Entry<V>> {
        if self.map.get(key)?.is_expired(now) {
            self.remove(key);
            metrics::record_store_eviction("expired", 1);
            return None;
        }
        self.map.get(key)
    }

    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.map.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    /// Insert or overwrite. Returns the key evicted to make room, if any.
    fn insert(&mut self, key: String, value: V, expires_at: Instant, capacity: usize) -> Option<String> {
        if let Some(entry) = self.map.get_mut(&key) {
            entry.value = value;
            entry.expires_at = expires_at;
            return None;
        }

        let evicted = if self.map.len() >= capacity {
            self.evict_oldest()
        } else {
            None
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.clone());
        self.map.insert(key, Entry { value, expires_at, seq });
        evicted
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.map.remove(&key);
        Some(key)
    }
}

fn lock<V>(entries: &Mutex<Entries<V>>) -> MutexGuard<'_, Entries<V>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One sweep pass: collect expired keys under the lock, then remove each
/// under its own short critical section after re-checking it.
fn sweep_expired<V>(entries: &Mutex<Entries<V>>) -> usize {
    let now = Instant::now();
    let expired: Vec<String> = lock(entries)
        .map
        .iter()
        .filter(|(_, entry)| entry.is_expired(now))
        .map(|(key, _)| key.clone())
        .collect();

    let mut removed = 0;
    for key in expired {
        let mut guard = lock(entries);
        if guard.map.get(&key).is_some_and(|entry| entry.is_expired(now)) {
            guard.remove(&key);
            removed += 1;
        }
    }

    let size = lock(entries).map.len();
    metrics::record_store_size(size);
    if removed > 0 {
        metrics::record_store_eviction("sweep", removed as u64);
    }
    removed
}

async fn run_sweeper<V>(
    entries: Arc<Mutex<Entries<V>>>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = sweep_expired(&entries);
                if removed > 0 {
                    tracing::debug!(removed, "TTL sweep removed expired entries");
                }
            }
            changed = stop.changed() => {
                // Err means the store itself was dropped.
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
        }
    }

    tracing::trace!("TTL sweeper stopped");
}

/// A thread-safe, time-bounded cache keyed by string.
///
/// Entries are logically absent once `now > set_time + ttl`. When a new key
/// is inserted while the store holds `capacity` entries, the entry that was
/// inserted first is evicted. Overwriting a key does not move it in that
/// order, so this is not an LRU.
///
/// If a Tokio runtime is available at construction time, a background task
/// sweeps expired entries every `sweep_interval`. The task stops on
/// [`TtlStore::destroy`] or when the store is dropped.
pub struct TtlStore<V> {
    entries: Arc<Mutex<Entries<V>>>,
    capacity: usize,
    stop: watch::Sender<bool>,
    sweeper: Option<JoinHandle<()>>,
}

impl<V> TtlStore<V>
where
    V: Clone + Send + 'static,
{
    /// Create a store and, when running inside Tokio, its sweeper task.
    pub fn new(config: TtlStoreConfig) -> Self {
        let entries = Arc::new(Mutex::new(Entries::new()));
        let (stop, stop_rx) = watch::channel(false);
        let period = config.sweep_interval.max(Duration::from_millis(1));

        let sweeper = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(run_sweeper(Arc::clone(&entries), period, stop_rx))),
            Err(_) => {
                tracing::debug!("No Tokio runtime, TTL store relies on lazy expiry only");
                None
            }
        };

        Self {
            entries,
            capacity: config.capacity.max(1),
            stop,
            sweeper,
        }
    }

    /// True iff `key` is present and unexpired.
    pub fn has(&self, key: &str) -> bool {
        self.lock().live(key, Instant::now()).is_some()
    }

    /// The stored value for `key`, if present and unexpired.
    pub fn get(&self, key: &str) -> Option<V> {
        self.lock()
            .live(key, Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Insert or overwrite `key` with a fresh TTL.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        let evicted = self.lock().insert(key.into(), value, expires_at, self.capacity);
        self.note_capacity_eviction(evicted);
    }

    /// Atomically insert `value` unless a live entry already exists.
    ///
    /// Returns the existing value when there is one; `None` means this call
    /// inserted.
    pub fn insert_if_absent(&self, key: &str, value: V, ttl: Duration) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();
        if let Some(existing) = entries.live(key, now) {
            return Some(existing.value.clone());
        }
        let evicted = entries.insert(key.to_owned(), value, now + ttl, self.capacity);
        drop(entries);
        self.note_capacity_eviction(evicted);
        None
    }

    /// Atomically overwrite `key` if `allow` accepts its current live value
    /// (`None` when absent). Returns whether the write happened.
    pub fn set_if<F>(&self, key: &str, value: V, ttl: Duration, allow: F) -> bool
    where
        F: FnOnce(Option<&V>) -> bool,
    {
        let now = Instant::now();
        let mut entries = self.lock();
        if !allow(entries.live(key, now).map(|entry| &entry.value)) {
            return false;
        }
        let evicted = entries.insert(key.to_owned(), value, now + ttl, self.capacity);
        drop(entries);
        self.note_capacity_eviction(evicted);
        true
    }

    /// Remove `key` regardless of its expiry.
    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().remove(key).map(|entry| entry.value)
    }

    /// Run one sweep pass now. Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        sweep_expired(&self.entries)
    }

    /// Stop the background sweep. Entries are kept and still expire lazily.
    pub fn destroy(&self) {
        self.stop.send_replace(true);
    }

    /// Whether a sweeper task was started and has not been stopped.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.is_some() && !*self.stop.borrow()
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn lock(&self) -> MutexGuard<'_, Entries<V>> {
        lock(&self.entries)
    }

    fn note_capacity_eviction(&self, evicted: Option<String>) {
        if let Some(key) = evicted {
            tracing::debug!(key = %key, capacity = self.capacity, "TTL store full, evicted oldest entry");
            metrics::record_store_eviction("capacity", 1);
        }
    }
}

impl<V> Default for TtlStore<V>
where
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new(TtlStoreConfig::default())
    }
}

impl<V> std::fmt::Debug for TtlStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlStore")
            .field("len", &lock(&self.entries).map.len())
            .field("capacity", &self.capacity)
            .field("sweeping", &(self.sweeper.is_some() && !*self.stop.borrow()))
            .finish()
    }
}
