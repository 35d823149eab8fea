//! Execution result cache.
//!
//! Entries are keyed by the canonical hash of (definition, parameters) and
//! stored as serialized bytes with a TTL, access counters, and byte-size
//! accounting. Reads past `expires_at` are misses and evict the entry —
//! stale payloads are never returned. An entry that fails to deserialize
//! is treated the same way: evicted, counted, recomputed fresh.
//!
//! Capacity is enforced on write: when the total serialized size (or the
//! entry count) would exceed the configured limits, least-recently-
//! accessed entries are evicted until it fits.
//!
//! Concurrent requests for the same uncached key share one computation
//! through a per-key in-flight registry (`dashmap` of `watch` senders). A
//! leader that errors or is cancelled drops its sender without sending;
//! waiters observe the closed channel and retry rather than hanging.
//! Clocks go through `tokio::time::Instant` so paused-clock tests can
//! drive TTL expiry deterministically.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use aeris_report_core::{CacheKey, ExecutionResult};
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::CacheConfig;
use crate::error::{Error, Result};

/// One cached execution. The payload bytes are immutable after insert;
/// only the recency/counter fields move on a hit.
#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Arc<Vec<u8>>,
    created_at: Instant,
    expires_at: Instant,
    last_accessed: Instant,
    access_count: u64,
    size_bytes: usize,
}

#[derive(Debug, Default)]
struct Store {
    entries: HashMap<CacheKey, CacheEntry>,
    total_bytes: usize,
}

impl Store {
    fn remove(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.total_bytes -= entry.size_bytes;
        Some(entry)
    }
}

/// Point-in-time counters, in the shape the service exposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expired: u64,
}

type InFlightSender = Arc<watch::Sender<Option<ExecutionResult>>>;

/// The shared result cache.
pub struct ReportCache {
    store: RwLock<Store>,
    in_flight: dashmap::DashMap<CacheKey, InFlightSender>,
    config: CacheConfig,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expired: AtomicU64,
}

impl std::fmt::Debug for ReportCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.read().expect("cache lock poisoned");
        f.debug_struct("ReportCache")
            .field("entries", &store.entries.len())
            .field("total_bytes", &store.total_bytes)
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

impl ReportCache {
    pub fn new(config: CacheConfig) -> Self {
        ReportCache {
            store: RwLock::new(Store::default()),
            in_flight: dashmap::DashMap::new(),
            config,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expired: AtomicU64::new(0),
        }
    }

    /// Look up a key. Expired and undecodable entries behave as misses
    /// and are evicted; a hit bumps the access counter and recency.
    pub fn get(&self, key: &CacheKey) -> Option<ExecutionResult> {
        let now = Instant::now();
        let mut store = self.store.write().expect("cache lock poisoned");
        let Some(entry) = store.entries.get_mut(key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        if now >= entry.expires_at {
            store.remove(key);
            self.expired.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        let payload = entry.payload.clone();
        entry.last_accessed = now;
        entry.access_count += 1;
        drop(store);

        match serde_json::from_slice::<ExecutionResult>(&payload) {
            Ok(result) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(result)
            }
            Err(e) => {
                // Corrupt payload: evict, count, recompute fresh.
                let err = Error::cache_corruption(e.to_string());
                tracing::warn!(key = %key, error = %err, "evicting corrupt cache entry");
                if self
                    .store
                    .write()
                    .expect("cache lock poisoned")
                    .remove(key)
                    .is_some()
                {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a result under `key`. `ttl` defaults to the configured TTL.
    pub fn put(&self, key: CacheKey, result: &ExecutionResult, ttl: Option<Duration>) {
        let payload = match serde_json::to_vec(result) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "result not cacheable");
                return;
            }
        };
        let now = Instant::now();
        let size_bytes = payload.len();
        let entry = CacheEntry {
            payload: Arc::new(payload),
            created_at: now,
            expires_at: now + ttl.unwrap_or(self.config.default_ttl),
            last_accessed: now,
            access_count: 0,
            size_bytes,
        };

        let mut store = self.store.write().expect("cache lock poisoned");
        store.remove(&key);
        store.total_bytes += entry.size_bytes;
        store.entries.insert(key.clone(), entry);

        // Least-recently-accessed entries go first; the entry just written
        // is exempt so an oversized result still serves its own request.
        while store.entries.len() > self.config.max_entries
            || store.total_bytes > self.config.max_bytes
        {
            let victim = store
                .entries
                .iter()
                .filter(|(k, _)| **k != key)
                .min_by_key(|(_, e)| e.last_accessed)
                .map(|(k, _)| k.clone());
            match victim {
                Some(victim) => {
                    store.remove(&victim);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                }
                None => break,
            }
        }
    }

    /// Serve from cache or share one computation per key.
    ///
    /// Returns the result and whether it came from the cache (a follower
    /// that waited on another request's computation counts as cached: it
    /// executed nothing). The leader writes the cache before publishing,
    /// so waiters that observe an abandoned computation retry through a
    /// fresh lookup.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: CacheKey,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<(ExecutionResult, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ExecutionResult>>,
    {
        enum Role {
            Leader(InFlightSender),
            Follower(watch::Receiver<Option<ExecutionResult>>),
        }

        let mut compute = Some(compute);
        loop {
            if let Some(hit) = self.get(&key) {
                return Ok((hit, true));
            }

            // shard lock is released when the entry ref drops at match end
            let role = match self.in_flight.entry(key.clone()) {
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    let (tx, _) = watch::channel(None);
                    let tx = Arc::new(tx);
                    slot.insert(tx.clone());
                    Role::Leader(tx)
                }
                dashmap::mapref::entry::Entry::Occupied(entry) => {
                    Role::Follower(entry.get().subscribe())
                }
            };

            match role {
                Role::Leader(tx) => {
                    // This request runs the pipeline.
                    let guard = InFlightGuard {
                        key: key.clone(),
                        map: &self.in_flight,
                        tx,
                        finished: false,
                    };
                    let Some(compute) = compute.take() else {
                        unreachable!("leadership is taken at most once per call")
                    };
                    match compute().await {
                        Ok(result) => {
                            self.put(key, &result, ttl);
                            guard.finish(result.clone());
                            return Ok((result, false));
                        }
                        // Guard drops without sending: waiters observe
                        // closure and retry as their own leaders.
                        Err(e) => return Err(e),
                    }
                }
                Role::Follower(mut rx) => {
                    loop {
                        match rx.changed().await {
                            Ok(()) => {
                                if let Some(result) = rx.borrow().clone() {
                                    return Ok((result, true));
                                }
                            }
                            // Leader abandoned; retry from the top.
                            Err(_) => break,
                        }
                    }
                }
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.store.read().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn total_bytes(&self) -> usize {
        self.store.read().expect("cache lock poisoned").total_bytes
    }

    /// Access count and age of an entry, for introspection.
    pub fn entry_info(&self, key: &CacheKey) -> Option<(u64, Duration)> {
        let store = self.store.read().expect("cache lock poisoned");
        store
            .entries
            .get(key)
            .map(|e| (e.access_count, e.created_at.elapsed()))
    }

    /// Overwrite an entry's payload with undecodable bytes.
    #[cfg(test)]
    fn poison(&self, key: &CacheKey) {
        let mut store = self.store.write().expect("cache lock poisoned");
        if let Some(entry) = store.entries.get_mut(key) {
            entry.payload = Arc::new(b"not json".to_vec());
        }
    }
}

/// Removes the in-flight entry when the leader finishes or is dropped.
/// Publishing happens before removal so late subscribers still observe
/// the value; an unpublished drop closes the channel instead.
struct InFlightGuard<'a> {
    key: CacheKey,
    map: &'a dashmap::DashMap<CacheKey, InFlightSender>,
    tx: InFlightSender,
    finished: bool,
}

impl InFlightGuard<'_> {
    fn finish(mut self, result: ExecutionResult) {
        let _ = self.tx.send(Some(result));
        self.map.remove(&self.key);
        self.finished = true;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.map.remove(&self.key);
        }
    }
}
