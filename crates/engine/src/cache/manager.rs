//! Two-tier cache manager.
//!
//! Read path: L1 hit-and-fresh, else L2 hit-and-fresh (which repopulates L1
//! with the entry's remaining lifetime), else miss. On a miss the caller
//! either joins an in-flight computation for the same key or becomes its
//! leader; the leader's computation runs detached and writes through to both
//! tiers before it leaves the in-flight map.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use log::{debug, info, warn};
use serde::Serialize;

use super::inflight::{share, InFlight, Role, SharedAnalysis};
use super::key::CacheKey;
use super::memory::MemoryTier;
use super::store::{CacheEntry, PersistentStore};
use crate::clock::Clock;
use crate::models::{AnalysisResult, CacheTier};

#[derive(Default)]
struct Counters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
    collapsed: AtomicU64,
    backend_errors: AtomicU64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub l1_entries: usize,
    pub l1_capacity: usize,
    pub l1_hits: u64,
    pub l2_hits: u64,
    pub misses: u64,
    pub collapsed: u64,
    pub in_flight: usize,
    pub backend_errors: u64,
    pub persistent_tier: bool,
}

/// Outcome of a cache lookup.
pub enum CacheLookup {
    /// A fresh entry; `entry.tier` tells which tier served it.
    Hit { entry: CacheEntry },
    Pending { computation: SharedAnalysis, role: Role },
}

pub struct CacheManager {
    memory: MemoryTier,
    store: Option<Arc<dyn PersistentStore>>,
    inflight: InFlight,
    clock: Arc<dyn Clock>,
    counters: Counters,
}

impl CacheManager {
    pub fn new(
        l1_capacity: usize,
        store: Option<Arc<dyn PersistentStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            memory: MemoryTier::new(l1_capacity),
            store,
            inflight: InFlight::new(),
            clock,
            counters: Counters::default(),
        }
    }

    /// Check L1 then L2.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.clock.now();
        if let Some(entry) = self.memory.get(key, now) {
            self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.with_tier(CacheTier::Memory));
        }

        let store = self.store.as_ref()?;
        match store.get(key).await {
            Ok(Some(entry)) => {
                let now = self.clock.now();
                if entry.is_fresh(now) {
                    self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
                    // keeps its original expiry, so L1 gets the remaining lifetime
                    self.memory.insert(entry.clone().with_tier(CacheTier::Memory));
                    Some(entry.with_tier(CacheTier::Persistent))
                } else {
                    debug!("L2 entry {} expired, removing", key);
                    if let Err(e) = store.remove(key).await {
                        self.backend_error("remove", &e);
                    }
                    None
                }
            }
            Ok(None) => None,
            Err(e) => {
                self.backend_error("get", &e);
                None
            }
        }
    }

    /// Return a cached entry or a handle on the computation producing it.
    ///
    /// `compute` is only invoked when this caller becomes the leader. Its
    /// future runs as a detached task: it completes and writes through even
    /// if every waiting caller goes away. Results marked `partial` are not
    /// written.
    pub async fn get_or_compute<F>(self: &Arc<Self>, key: &CacheKey, ttl: Duration, compute: F) -> CacheLookup
    where
        F: FnOnce() -> BoxFuture<'static, AnalysisResult>,
    {
        if let Some(entry) = self.get(key).await {
            return CacheLookup::Hit { entry };
        }

        let joined = self.inflight.join_or_start(key, || {
            // a leader may have written through between our lookup and now
            if let Some(entry) = self.memory.get(key, self.clock.now()) {
                return Err(entry);
            }

            let this = Arc::clone(self);
            let task_key = key.clone();
            let work = compute();
            let handle = tokio::spawn(async move {
                let result = work.await;
                this.complete(&task_key, &result, ttl).await;
                this.inflight.finish(&task_key);
                Arc::new(result)
            });

            let weak: Weak<Self> = Arc::downgrade(self);
            let failed_key = key.clone();
            Ok(share(handle, move || {
                if let Some(this) = weak.upgrade() {
                    this.inflight.finish(&failed_key);
                }
            }))
        });

        match joined {
            Ok((computation, role)) => {
                match role {
                    Role::Leader => self.counters.misses.fetch_add(1, Ordering::Relaxed),
                    Role::Follower => self.counters.collapsed.fetch_add(1, Ordering::Relaxed),
                };
                CacheLookup::Pending { computation, role }
            }
            Err(entry) => {
                self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
                CacheLookup::Hit {
                    entry: entry.with_tier(CacheTier::Memory),
                }
            }
        }
    }

    async fn complete(&self, key: &CacheKey, result: &AnalysisResult, ttl: Duration) {
        if result.metadata.partial {
            debug!("Not caching partial result for {}", key);
            return;
        }
        self.put(key, result.clone(), ttl).await;
    }

    /// Write an entry through both tiers.
    pub async fn put(&self, key: &CacheKey, result: AnalysisResult, ttl: Duration) {
        let entry = CacheEntry::new(key.clone(), result, self.clock.now(), ttl);
        self.memory.insert(entry.clone());

        if let Some(store) = &self.store {
            if let Err(e) = store.put(key, &entry, ttl).await {
                self.backend_error("put", &e);
            }
        }
    }

    /// Remove a key from both tiers.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.memory.remove(key);
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(key).await {
                self.backend_error("remove", &e);
            }
        }
    }

    /// Drop expired entries from L1 and ask L2 to purge its own.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = self.memory.sweep(now);

        if let Some(store) = &self.store {
            match store.purge_expired(now).await {
                Ok(purged) => removed += purged,
                Err(e) => self.backend_error("purge", &e),
            }
        }
        if removed > 0 {
            debug!("Cache sweep removed {} expired entries", removed);
        }
        removed
    }

    /// Run [`sweep_expired`](Self::sweep_expired) every `interval` until the
    /// manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(self);
        info!("Starting cache sweeper every {:?}", interval);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(this) = weak.upgrade() else {
                    break;
                };
                this.sweep_expired().await;
            }
        })
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            l1_entries: self.memory.len(),
            l1_capacity: self.memory.capacity(),
            l1_hits: self.counters.l1_hits.load(Ordering::Relaxed),
            l2_hits: self.counters.l2_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            collapsed: self.counters.collapsed.load(Ordering::Relaxed),
            in_flight: self.inflight.len(),
            backend_errors: self.counters.backend_errors.load(Ordering::Relaxed),
            persistent_tier: self.store.is_some(),
        }
    }

    fn backend_error(&self, operation: &str, error: &crate::errors::CacheBackendError) {
        self.counters.backend_errors.fetch_add(1, Ordering::Relaxed);
        warn!("Persistent cache {} failed, treating as miss: {}", operation, error);
    }
}
