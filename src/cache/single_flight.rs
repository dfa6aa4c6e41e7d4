//! # Single-Flight Result Cache
//!
//! Bounded, TTL-based store that runs at most one computation per key at a
//! time. Concurrent callers for the same key share that computation's outcome.
//!
//! ## Roles
//!
//! ```text
//! get_or_compute(key)
//!   ├── live entry        -> hit, return value
//!   ├── pending for key   -> waiter, await shared outcome
//!   └── neither           -> leader, register pending, spawn compute
//!                              ├── Ok  -> install entry, remove pending, publish
//!                              └── Err -> remove pending, publish (never cached)
//! ```
//!
//! The entry/pending check and the pending registration happen under one lock
//! acquisition, so two racing callers can never both become leader. The lock
//! is a single `parking_lot::Mutex` over both maps and is never held across an
//! `.await`.
//!
//! The computation runs on its own tokio task. Dropping or cancelling any
//! observer, the leader included, never aborts it; the result is still
//! installed and handed to whoever is left waiting.
//!
//! ## Expiry and eviction
//!
//! Expiry is lazy: an entry whose age has reached the TTL is dropped when it is
//! next read. A key that is never read again stays resident until capacity
//! eviction removes it or [`SingleFlightCache::purge_expired`] is called.
//! Capacity eviction removes the least-recently-accessed completed entry;
//! in-flight computations are not evictable.
//!
//! ## Reentrancy
//!
//! A compute closure must not call back into the cache for its own key. Doing
//! so makes the computation wait on itself and it never resolves.

use super::clock::{Clock, SystemClock};
use super::key::CacheKey;
use super::stats::{CacheStats, CacheStatsSnapshot};
use crate::config::CacheConfig;
use crate::error::{AnalyzerError, AnalyzerResult};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

type SharedOutcome<V> = Shared<BoxFuture<'static, AnalyzerResult<V>>>;

/// A completed, successful computation
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    key: CacheKey,
    value: V,
    inserted_at: Instant,
    last_accessed_at: Instant,
    access_seq: u64,
}

impl<V> CacheEntry<V> {
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    pub fn inserted_at(&self) -> Instant {
        self.inserted_at
    }

    pub fn last_accessed_at(&self) -> Instant {
        self.last_accessed_at
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

/// Bookkeeping for a computation that has not finished yet
struct PendingComputation<V> {
    key: CacheKey,
    result: SharedOutcome<V>,
    /// Observers attached so far, leader included
    waiter_count: usize,
    started_at: Instant,
}

struct CacheState<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    pending: HashMap<CacheKey, PendingComputation<V>>,
    /// Monotonic access counter; orders eviction even when timestamps tie
    access_seq: u64,
}

impl<V: Clone> CacheState<V> {
    fn next_seq(&mut self) -> u64 {
        self.access_seq += 1;
        self.access_seq
    }

    /// Return a live value and mark it accessed, dropping it if expired.
    ///
    /// The bool is true when an expired entry was removed.
    fn touch(&mut self, key: &CacheKey, now: Instant, ttl: Duration) -> (Option<V>, bool) {
        let expired = match self.entries.get(key) {
            None => return (None, false),
            Some(entry) => entry.is_expired(now, ttl),
        };

        if expired {
            self.entries.remove(key);
            return (None, true);
        }

        let seq = self.next_seq();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_accessed_at = now;
                entry.access_seq = seq;
                (Some(entry.value.clone()), false)
            }
            None => (None, false),
        }
    }

    /// Bring the store down to `max_entries`.
    ///
    /// Expired entries go first; live entries are then evicted
    /// least-recently-accessed first. Returns (expired dropped, live evicted).
    fn evict_to(&mut self, max_entries: usize, now: Instant, ttl: Duration) -> (usize, Vec<CacheKey>) {
        let mut expired = 0;
        if self.entries.len() > max_entries {
            let before = self.entries.len();
            self.entries.retain(|_, entry| !entry.is_expired(now, ttl));
            expired = before - self.entries.len();
        }

        let mut evicted = Vec::new();
        while self.entries.len() > max_entries {
            let Some(victim) = self
                .entries
                .values()
                .min_by_key(|entry| entry.access_seq)
                .map(|entry| entry.key.clone())
            else {
                break;
            };
            self.entries.remove(&victim);
            evicted.push(victim);
        }
        (expired, evicted)
    }
}

enum Lookup<V> {
    Hit(V),
    Join(SharedOutcome<V>),
    Lead(SharedOutcome<V>),
}

struct Inner<V> {
    state: Mutex<CacheState<V>>,
    ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    stats: CacheStats,
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Resolve a finished computation: drop the pending slot and, on success, install the entry
    fn complete(&self, key: &CacheKey, result: &AnalyzerResult<V>) {
        let now = self.clock.now();
        let mut state = self.state.lock();

        let elapsed = match state.pending.remove(key) {
            Some(pending) => {
                debug!(
                    key = %pending.key,
                    waiters = pending.waiter_count,
                    "Resolving pending computation"
                );
                now.saturating_duration_since(pending.started_at)
            }
            None => {
                error!(key = %key, "Computation finished without a pending slot");
                debug_assert!(false, "pending computation missing for {key}");
                Duration::ZERO
            }
        };

        match result {
            Ok(value) => {
                if state.entries.contains_key(key) {
                    error!(key = %key, "Cache entry already present for a pending key");
                    debug_assert!(false, "entry and pending coexisted for {key}");
                }

                let seq = state.next_seq();
                state.entries.insert(
                    key.clone(),
                    CacheEntry {
                        key: key.clone(),
                        value: value.clone(),
                        inserted_at: now,
                        last_accessed_at: now,
                        access_seq: seq,
                    },
                );
                let (expired, evicted) = state.evict_to(self.max_entries, now, self.ttl);
                let size = state.entries.len();
                drop(state);

                self.stats.record_insert();
                if expired > 0 {
                    self.stats.record_expirations(expired as u64);
                    debug!(count = expired, "Dropped expired entries to make room");
                }
                if !evicted.is_empty() {
                    self.stats.record_evictions(evicted.len() as u64);
                    debug!(count = evicted.len(), "Evicted least-recently-accessed entries");
                }
                info!(
                    key = %key,
                    duration_ms = elapsed.as_millis() as u64,
                    entries = size,
                    "Computation cached"
                );
            }
            Err(e) => {
                drop(state);
                self.stats.record_failure();
                warn!(
                    key = %key,
                    error = %e,
                    duration_ms = elapsed.as_millis() as u64,
                    "Computation failed, result not cached"
                );
            }
        }
    }
}

/// Content-addressed result cache with per-key single-flight computation.
///
/// Cloning is cheap and every clone shares the same store.
pub struct SingleFlightCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for SingleFlightCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> std::fmt::Debug for SingleFlightCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("SingleFlightCache")
            .field("entries", &state.entries.len())
            .field("pending", &state.pending.len())
            .field("ttl", &self.inner.ttl)
            .field("max_entries", &self.inner.max_entries)
            .finish()
    }
}

impl<V> SingleFlightCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self::with_clock(ttl, max_entries, Arc::new(SystemClock))
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries)
    }

    pub fn with_clock(ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        if max_entries == 0 {
            warn!("Cache capacity of 0 requested, using 1");
        }
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState {
                    entries: HashMap::new(),
                    pending: HashMap::new(),
                    access_seq: 0,
                }),
                ttl,
                max_entries: max_entries.max(1),
                clock,
                stats: CacheStats::default(),
            }),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.inner.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.inner.max_entries
    }

    /// Return the cached value for `key`, or compute it exactly once across all
    /// concurrent callers.
    ///
    /// Failures reach every caller attached to the computation and are not
    /// stored; the next call after a failure starts a fresh computation.
    pub async fn get_or_compute<F, Fut>(&self, key: CacheKey, compute: F) -> AnalyzerResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AnalyzerResult<V>> + Send + 'static,
    {
        match self.lookup_or_register(key, compute) {
            Lookup::Hit(value) => Ok(value),
            Lookup::Join(outcome) | Lookup::Lead(outcome) => outcome.await,
        }
    }

    /// Like [`get_or_compute`](Self::get_or_compute), but stops waiting when
    /// `token` is cancelled.
    ///
    /// Cancellation only detaches this caller. The computation keeps running
    /// and other callers still receive its outcome.
    pub async fn get_or_compute_with_cancellation<F, Fut>(
        &self,
        key: CacheKey,
        compute: F,
        token: &CancellationToken,
    ) -> AnalyzerResult<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AnalyzerResult<V>> + Send + 'static,
    {
        if token.is_cancelled() {
            return Err(AnalyzerError::Cancelled(format!(
                "request for {key} cancelled before lookup"
            )));
        }

        let outcome = match self.lookup_or_register(key.clone(), compute) {
            Lookup::Hit(value) => return Ok(value),
            Lookup::Join(outcome) | Lookup::Lead(outcome) => outcome,
        };
        let attached = outcome.clone();

        tokio::select! {
            biased;
            _ = token.cancelled() => {
                self.detach_waiter(&key, &attached);
                debug!(key = %key, "Caller cancelled while waiting");
                Err(AnalyzerError::Cancelled(format!("stopped waiting for {key}")))
            }
            result = outcome => result,
        }
    }

    /// Drop a cancelled observer from the waiter count of its computation
    fn detach_waiter(&self, key: &CacheKey, attached: &SharedOutcome<V>) {
        let mut state = self.inner.state.lock();
        if let Some(pending) = state.pending.get_mut(key) {
            // the slot may already belong to a newer computation for the same key
            if pending.result.ptr_eq(attached) {
                pending.waiter_count = pending.waiter_count.saturating_sub(1);
            }
        }
    }

    fn lookup_or_register<F, Fut>(&self, key: CacheKey, compute: F) -> Lookup<V>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = AnalyzerResult<V>> + Send + 'static,
    {
        let now = self.inner.clock.now();
        let (tx, outcome) = {
            let mut state = self.inner.state.lock();

            let (hit, expired) = state.touch(&key, now, self.inner.ttl);
            if expired {
                self.inner.stats.record_expirations(1);
            }
            if let Some(value) = hit {
                drop(state);
                self.inner.stats.record_hit();
                debug!(key = %key, "Cache hit");
                return Lookup::Hit(value);
            }

            if let Some(pending) = state.pending.get_mut(&key) {
                pending.waiter_count += 1;
                let outcome = pending.result.clone();
                let waiters = pending.waiter_count;
                drop(state);
                self.inner.stats.record_join();
                debug!(key = %key, waiters = waiters, "Joined in-flight computation");
                return Lookup::Join(outcome);
            }

            let (tx, rx) = oneshot::channel::<AnalyzerResult<V>>();
            let outcome: SharedOutcome<V> = async move {
                rx.await.unwrap_or_else(|_| {
                    Err(AnalyzerError::Internal(
                        "computation ended without producing a result".to_string(),
                    ))
                })
            }
            .boxed()
            .shared();

            state.pending.insert(
                key.clone(),
                PendingComputation {
                    key: key.clone(),
                    result: outcome.clone(),
                    waiter_count: 1,
                    started_at: now,
                },
            );
            (tx, outcome)
        };

        self.inner.stats.record_miss();
        info!(key = %key, "Cache miss, starting computation");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = match AssertUnwindSafe(async move { compute().await })
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(_) => Err(AnalyzerError::Internal(format!(
                    "computation for {key} panicked"
                ))),
            };
            inner.complete(&key, &result);
            // every observer may already be gone
            let _ = tx.send(result);
        });

        Lookup::Lead(outcome)
    }

    /// Look up a live value without computing; counts as an access
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let now = self.inner.clock.now();
        let (hit, expired) = self.inner.state.lock().touch(key, now, self.inner.ttl);
        if expired {
            self.inner.stats.record_expirations(1);
        }
        if hit.is_some() {
            self.inner.stats.record_hit();
        }
        hit
    }

    /// Snapshot of a live entry without updating its access time
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry<V>> {
        let now = self.inner.clock.now();
        self.inner
            .state
            .lock()
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now, self.inner.ttl))
            .cloned()
    }

    /// Whether a live entry exists for `key`; does not update access time
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.peek(key).is_some()
    }

    /// Remove the entry for `key`. In-flight computations are not affected.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = self.inner.state.lock().entries.remove(key).is_some();
        if removed {
            debug!(key = %key, "Cache entry invalidated");
        }
        removed
    }

    /// Remove every completed entry and return how many were dropped
    pub fn invalidate_all(&self) -> usize {
        let mut state = self.inner.state.lock();
        let count = state.entries.len();
        state.entries.clear();
        drop(state);
        info!(count = count, "Cache cleared");
        count
    }

    /// Eagerly drop expired entries; reads already ignore them
    pub fn purge_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let ttl = self.inner.ttl;
        let mut state = self.inner.state.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        let purged = before - state.entries.len();
        drop(state);

        if purged > 0 {
            self.inner.stats.record_expirations(purged as u64);
            debug!(count = purged, "Purged expired entries");
        }
        purged
    }

    /// Completed entries currently held, expired-but-unread ones included
    pub fn len(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_count(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// Observers still attached to the in-flight computation for `key`, if any.
    ///
    /// Callers that stop waiting through a cancellation token are subtracted.
    pub fn waiter_count(&self, key: &CacheKey) -> Option<usize> {
        self.inner
            .state
            .lock()
            .pending
            .get(key)
            .map(|pending| pending.waiter_count)
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Wait for every in-flight computation to finish; returns how many were awaited.
    ///
    /// Computations started while draining are not waited on.
    pub async fn drain(&self) -> usize {
        let outstanding: Vec<SharedOutcome<V>> = self
            .inner
            .state
            .lock()
            .pending
            .values()
            .map(|pending| pending.result.clone())
            .collect();

        let count = outstanding.len();
        if count > 0 {
            info!(count = count, "Draining in-flight computations");
            futures::future::join_all(outstanding).await;
        }
        count
    }
}
