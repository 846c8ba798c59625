//! In-process (L1) cache tier.
//!
//! A sharded map bounded by entry count. When full, the oldest insertion is
//! evicted first. Overwriting a key counts as a new insertion, so the
//! eviction queue carries a sequence number per slot and skips slots that an
//! overwrite or removal made stale.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::{debug, warn};

use super::key::CacheKey;
use super::store::CacheEntry;

struct Slot {
    entry: CacheEntry,
    seq: u64,
}

pub struct MemoryTier {
    entries: DashMap<CacheKey, Slot>,
    order: Mutex<VecDeque<(CacheKey, u64)>>,
    capacity: usize,
    next_seq: AtomicU64,
}

impl MemoryTier {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: DashMap::with_capacity(capacity),
            order: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            next_seq: AtomicU64::new(0),
        }
    }

    fn lock_order(&self) -> MutexGuard<'_, VecDeque<(CacheKey, u64)>> {
        self.order.lock().unwrap_or_else(|poisoned| {
            warn!("L1 eviction queue mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Fresh entry for the key. An expired entry is removed on the way.
    pub fn get(&self, key: &CacheKey, now: DateTime<Utc>) -> Option<CacheEntry> {
        let fresh = self
            .entries
            .get(key)
            .map(|slot| slot.entry.is_fresh(now).then(|| slot.entry.clone()))?;
        if fresh.is_none() {
            self.entries
                .remove_if(key, |_, slot| !slot.entry.is_fresh(now));
        }
        fresh
    }

    pub fn insert(&self, entry: CacheEntry) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let key = entry.key.clone();
        self.entries.insert(key.clone(), Slot { entry, seq });

        let mut order = self.lock_order();
        order.push_back((key, seq));

        while self.entries.len() > self.capacity {
            let Some((oldest, oldest_seq)) = order.pop_front() else {
                break;
            };
            if self
                .entries
                .remove_if(&oldest, |_, slot| slot.seq == oldest_seq)
                .is_some()
            {
                debug!("L1 evicted {}", oldest);
            }
        }

        // drop slots left behind by overwrites and removals
        if order.len() > self.capacity * 2 {
            order.retain(|(key, seq)| {
                self.entries
                    .get(key)
                    .map_or(false, |slot| slot.seq == *seq)
            });
        }
    }

    pub fn remove(&self, key: &CacheKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, slot| slot.entry.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::sample_result;

    fn entry(name: &str, now: DateTime<Utc>, ttl_secs: u64) -> CacheEntry {
        CacheEntry::new(
            CacheKey::from_digest(name),
            sample_result(name),
            now,
            Duration::from_secs(ttl_secs),
        )
    }

    #[test]
    fn test_fifo_eviction() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let tier = MemoryTier::new(2);

        tier.insert(entry("a", now, 60));
        tier.insert(entry("b", now, 60));
        tier.insert(entry("c", now, 60));

        assert_eq!(tier.len(), 2);
        assert!(tier.get(&CacheKey::from_digest("a"), now).is_none());
        assert!(tier.get(&CacheKey::from_digest("b"), now).is_some());
        assert!(tier.get(&CacheKey::from_digest("c"), now).is_some());
    }

    #[test]
    fn test_overwrite_requeues_key() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let tier = MemoryTier::new(2);

        tier.insert(entry("a", now, 60));
        tier.insert(entry("b", now, 60));
        tier.insert(entry("a", now, 60));
        tier.insert(entry("c", now, 60));

        // "b" is now the oldest insertion
        assert!(tier.get(&CacheKey::from_digest("b"), now).is_none());
        assert!(tier.get(&CacheKey::from_digest("a"), now).is_some());
        assert!(tier.get(&CacheKey::from_digest("c"), now).is_some());
    }

    #[test]
    fn test_expired_entries_are_never_returned() {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let tier = MemoryTier::new(4);
        tier.insert(entry("a", start, 300));

        let key = CacheKey::from_digest("a");
        assert!(tier.get(&key, start + chrono::Duration::seconds(300)).is_some());
        assert!(tier.get(&key, start + chrono::Duration::seconds(301)).is_none());
        assert!(tier.is_empty());
    }

    #[test]
    fn test_sweep() {
        let start = DateTime::<Utc>::UNIX_EPOCH;
        let tier = MemoryTier::new(4);
        tier.insert(entry("short", start, 10));
        tier.insert(entry("long", start, 100));

        assert_eq!(tier.sweep(start + chrono::Duration::seconds(50)), 1);
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_queue_stays_bounded_under_overwrites() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let tier = MemoryTier::new(2);
        for _ in 0..100 {
            tier.insert(entry("a", now, 60));
        }
        assert!(tier.lock_order().len() <= 5);
        assert_eq!(tier.len(), 1);
    }
}
