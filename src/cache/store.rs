//! CacheStore - TTL-bounded, size-capped result cache
//!
//! Lookups are lock-free reads on a DashMap. Writes go through a small
//! mutex that owns the insertion order so the entry cap holds after every
//! `put`. Each entry carries a monotonically increasing sequence number;
//! eviction only removes an entry if its sequence still matches the order
//! record, so a newer write to the same key always survives (last writer
//! wins).
//!
//! Keys are content-addressed and carry no session. An entry remembers every
//! session that wrote it and is only dropped by `invalidate_session` once no
//! other session still owns it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{DuckflowError, Result};

use super::key::CacheKey;

/// One cached task output
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: Arc<Value>,
    pub provider: Option<Arc<str>>,
    pub created_at: Instant,
    pub ttl: Duration,
    seq: u64,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) > self.ttl
    }

    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

/// Point-in-time cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub evicted: u64,
}

/// Process-wide result cache
pub struct CacheStore {
    entries: DashMap<CacheKey, CacheEntry>,
    /// Insertion order for cap eviction: (seq, key)
    order: Mutex<VecDeque<(u64, CacheKey)>>,
    /// Sessions that wrote each key
    owners: DashMap<CacheKey, FxHashSet<Arc<str>>>,
    next_seq: AtomicU64,
    max_entries: usize,
    available: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    evicted: AtomicU64,
}

impl CacheStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            owners: DashMap::new(),
            next_seq: AtomicU64::new(0),
            max_entries,
            available: AtomicBool::new(true),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(DuckflowError::CacheUnavailable {
                reason: "cache store is offline".to_string(),
            })
        }
    }

    /// Look up a live entry. Expired entries are removed on the spot.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.ensure_available()?;
        let now = Instant::now();

        let (hit, stale) = match self.entries.get(key) {
            Some(entry) if !entry.is_expired_at(now) => (Some(entry.value().clone()), false),
            Some(_) => (None, true),
            None => (None, false),
        };

        if stale
            && self
                .entries
                .remove_if(key, |_, e| e.is_expired_at(now))
                .is_some()
        {
            self.owners.remove(key);
            self.expired.fetch_add(1, Ordering::Relaxed);
        }

        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        Ok(hit)
    }

    /// Store a value with its TTL
    pub fn put(&self, key: CacheKey, value: Arc<Value>, ttl: Duration) -> Result<()> {
        self.put_tagged(key, value, None, ttl, None)
    }

    /// Store a value, recording its provider and owning session
    pub fn put_tagged(
        &self,
        key: CacheKey,
        value: Arc<Value>,
        provider: Option<Arc<str>>,
        ttl: Duration,
        session_id: Option<&str>,
    ) -> Result<()> {
        self.ensure_available()?;

        {
            let mut order = self.order.lock();
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            self.entries.insert(
                key,
                CacheEntry {
                    key,
                    value,
                    provider,
                    created_at: Instant::now(),
                    ttl,
                    seq,
                },
            );
            order.push_back((seq, key));

            while self.entries.len() > self.max_entries {
                let Some((old_seq, old_key)) = order.pop_front() else {
                    break;
                };
                if self.entries.remove_if(&old_key, |_, e| e.seq == old_seq).is_some() {
                    self.owners.remove(&old_key);
                    self.evicted.fetch_add(1, Ordering::Relaxed);
                }
            }

            if let Some(session) = session_id {
                self.owners.entry(key).or_default().insert(Arc::from(session));
            }

            // Overwrites and invalidations leave stale order records behind
            if order.len() > self.compaction_threshold() {
                self.compact(&mut order);
            }
        }
        Ok(())
    }

    fn compaction_threshold(&self) -> usize {
        self.max_entries.max(16) * 2
    }

    /// Drop order records and owner tags that no longer match a live entry
    fn compact(&self, order: &mut VecDeque<(u64, CacheKey)>) {
        order.retain(|(seq, key)| self.entries.get(key).is_some_and(|e| e.seq == *seq));
        self.owners.retain(|key, _| self.entries.contains_key(key));
    }

    /// Drop one entry; returns whether it existed
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.owners.remove(key);
        self.entries.remove(key).is_some()
    }

    /// Forget `session_id` as an owner and drop the entries nobody else owns.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_session(&self, session_id: &str) -> usize {
        let mut orphaned = Vec::new();
        self.owners.retain(|key, sessions| {
            if sessions.remove(session_id) && sessions.is_empty() {
                orphaned.push(*key);
            }
            !sessions.is_empty()
        });
        let removed = orphaned
            .iter()
            .filter(|key| self.entries.remove(*key).is_some())
            .count();
        debug!(session = session_id, removed, "invalidated session cache entries");
        removed
    }

    /// Remove expired entries and compact bookkeeping.
    ///
    /// Idempotent; returns how many entries expired.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired_at(now));
        let removed = before.saturating_sub(self.entries.len());
        self.expired.fetch_add(removed as u64, Ordering::Relaxed);

        self.compact(&mut self.order.lock());
        removed
    }

    /// Toggle availability; while offline every get/put fails with `CacheUnavailable`
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

/// Run `sweep` every `interval` until `shutdown` fires
pub fn spawn_sweeper(
    cache: Arc<CacheStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = cache.sweep();
                    if removed > 0 {
                        debug!(removed, remaining = cache.len(), "cache sweep");
                    }
                }
            }
        }
        info!("cache sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(n: u64) -> CacheKey {
        CacheKey::from_raw(n)
    }

    #[test]
    fn put_then_get() {
        let cache = CacheStore::new(10);
        cache
            .put(key(1), Arc::new(json!("joy")), Duration::from_secs(60))
            .unwrap();

        let entry = cache.get(&key(1)).unwrap().unwrap();
        assert_eq!(*entry.value, json!("joy"));
        assert!(cache.get(&key(2)).unwrap().is_none());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn expired_entry_is_not_returned_and_removed() {
        let cache = CacheStore::new(10);
        cache
            .put(key(1), Arc::new(json!(1)), Duration::from_millis(10))
            .unwrap();
        std::thread::sleep(Duration::from_millis(25));

        assert!(cache.get(&key(1)).unwrap().is_none());
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.stats().expired, 1);
    }

    #[test]
    fn overwrite_refreshes_value_and_survives_eviction() {
        let cache = CacheStore::new(2);
        let ttl = Duration::from_secs(60);
        cache.put(key(1), Arc::new(json!("old")), ttl).unwrap();
        cache.put(key(2), Arc::new(json!(2)), ttl).unwrap();
        cache.put(key(1), Arc::new(json!("new")), ttl).unwrap();
        // Stale order record for key 1 is skipped; key 2 is the oldest live entry
        cache.put(key(3), Arc::new(json!(3)), ttl).unwrap();

        assert_eq!(cache.len(), 2);
        assert_eq!(*cache.get(&key(1)).unwrap().unwrap().value, json!("new"));
        assert!(cache.get(&key(2)).unwrap().is_none());
        assert!(cache.get(&key(3)).unwrap().is_some());
    }

    #[test]
    fn sweep_is_idempotent() {
        let cache = CacheStore::new(10);
        cache
            .put(key(1), Arc::new(json!(1)), Duration::from_millis(5))
            .unwrap();
        cache
            .put(key(2), Arc::new(json!(2)), Duration::from_secs(60))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.sweep(), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn session_invalidation_only_touches_that_session() {
        let cache = CacheStore::new(10);
        let ttl = Duration::from_secs(60);
        cache
            .put_tagged(key(1), Arc::new(json!(1)), None, ttl, Some("a"))
            .unwrap();
        cache
            .put_tagged(key(2), Arc::new(json!(2)), None, ttl, Some("a"))
            .unwrap();
        cache
            .put_tagged(key(3), Arc::new(json!(3)), None, ttl, Some("b"))
            .unwrap();

        assert_eq!(cache.invalidate_session("a"), 2);
        assert_eq!(cache.invalidate_session("a"), 0);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(3)).unwrap().is_some());
    }

    #[test]
    fn offline_cache_reports_unavailable() {
        let cache = CacheStore::new(10);
        cache.set_available(false);

        assert!(matches!(
            cache.get(&key(1)),
            Err(DuckflowError::CacheUnavailable { .. })
        ));
        assert!(cache
            .put(key(1), Arc::new(json!(1)), Duration::from_secs(1))
            .is_err());

        cache.set_available(true);
        assert!(cache.get(&key(1)).unwrap().is_none());
    }

    #[test]
    fn shared_entries_survive_until_every_owner_is_invalidated() {
        let cache = CacheStore::new(10);
        let ttl = Duration::from_secs(60);
        cache
            .put_tagged(key(1), Arc::new(json!(1)), None, ttl, Some("a"))
            .unwrap();
        cache
            .put_tagged(key(1), Arc::new(json!(1)), None, ttl, Some("b"))
            .unwrap();

        assert_eq!(cache.invalidate_session("a"), 0);
        assert!(cache.get(&key(1)).unwrap().is_some());
        assert_eq!(cache.invalidate_session("b"), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn rewrites_of_one_key_keep_bookkeeping_bounded() {
        let cache = CacheStore::new(4);
        let ttl = Duration::from_secs(60);
        for i in 0..1000 {
            cache
                .put_tagged(key(1), Arc::new(json!(i)), None, ttl, Some("a"))
                .unwrap();
            assert!(cache.order.lock().len() <= cache.compaction_threshold());
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.get(&key(1)).unwrap().unwrap().value, json!(999));
        assert_eq!(cache.owners.len(), 1);
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let cache = Arc::new(CacheStore::new(10));
        cache
            .put(key(1), Arc::new(json!(1)), Duration::from_millis(5))
            .unwrap();

        let shutdown = CancellationToken::new();
        let handle = spawn_sweeper(Arc::clone(&cache), Duration::from_millis(10), shutdown.clone());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.is_empty());

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
