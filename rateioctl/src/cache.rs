use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Cache key builders, so every call site agrees on the namespace.
pub mod keys {
    use crate::types::UserId;

    pub const PLATFORM_STATS: &str = "stats:platform";

    pub fn user_balance(user_id: UserId) -> String {
        format!("balance:{user_id}")
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.inserted_at) >= self.ttl
    }
}

/// In-process TTL cache for read-heavy lookups.
///
/// Values are stored as JSON so one cache instance can hold heterogeneous
/// entries; each entry carries its own TTL. Expired entries stop being
/// served immediately and are physically removed by the sweeper task.
/// `get_or_fetch` deduplicates concurrent fetches per key: one caller runs
/// the fetcher while the rest wait and reuse its result.
///
/// The cache is owned by the application state and injected where needed,
/// never reached through a global.
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    default_ttl: Duration,
}

impl TtlCache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            default_ttl,
        }
    }

    /// Read a fresh entry. Expired or missing keys read as `None`; a value
    /// that no longer deserializes into `T` is treated as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if entry.is_expired(Instant::now()) {
            return None;
        }
        match serde_json::from_value(entry.value.clone()) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Cached value under {key} does not deserialize: {e}");
                None
            }
        }
    }

    /// Store a value under `key`. A value that fails to serialize is logged
    /// and skipped; the cache never fails the caller.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Refusing to cache {key}: serialization failed: {e}");
                return;
            }
        };
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.entries.write().await.insert(key.to_string(), entry);
    }

    /// Drop a key. Returns whether an entry was present.
    pub async fn invalidate(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Remove expired entries, returning how many were dropped.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Cached read-through. On a miss, one caller runs `fetcher` while
    /// concurrent callers for the same key wait on a per-key gate and then
    /// reuse the cached result. Fetch errors propagate to the caller that
    /// ran the fetcher and are never cached; the next waiter retries.
    pub async fn get_or_fetch<T, F, Fut, E>(&self, key: &str, ttl: Option<Duration>, fetcher: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.get(key).await {
            trace!("Cache hit for {key}");
            return Ok(value);
        }

        // The in_flight lock only guards the gate map and is released
        // before waiting on the gate itself.
        let gate = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(key.to_string()).or_default())
        };
        let guard = gate.lock().await;

        // Whoever held the gate before us may have filled the cache.
        if let Some(value) = self.get(key).await {
            trace!("Cache filled while waiting for {key}");
            drop(guard);
            self.release_gate(key, &gate).await;
            return Ok(value);
        }

        trace!("Cache miss for {key}, fetching");
        let result = fetcher().await;
        if let Ok(value) = &result {
            self.set(key, value, ttl).await;
        }

        drop(guard);
        self.release_gate(key, &gate).await;
        result
    }

    /// Forced fetch: skips the cache read but still serializes with other
    /// fetches for the key and writes through on success. On failure the
    /// previous entry, if any, stays servable.
    pub async fn refresh<T, F, Fut, E>(&self, key: &str, ttl: Option<Duration>, fetcher: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let gate = {
            let mut in_flight = self.in_flight.lock().await;
            Arc::clone(in_flight.entry(key.to_string()).or_default())
        };
        let guard = gate.lock().await;

        let result = fetcher().await;
        if let Ok(value) = &result {
            self.set(key, value, ttl).await;
        }

        drop(guard);
        self.release_gate(key, &gate).await;
        result
    }

    async fn release_gate(&self, key: &str, gate: &Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().await;
        // Two strong counts left means the map entry and our own clone, so
        // nobody else is waiting on this key.
        if Arc::strong_count(gate) <= 2 {
            in_flight.remove(key);
        }
    }

    #[cfg(test)]
    async fn in_flight_len(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

/// Periodically sweep expired entries until the token is cancelled.
pub fn spawn_sweeper(cache: Arc<TtlCache>, interval: Duration, token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Cache sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let removed = cache.sweep().await;
                    if removed > 0 {
                        trace!("Swept {removed} expired cache entries");
                    }
                }
            }
        }
    })
}
