//! Cache entries and the persistent tier contract.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use super::key::CacheKey;
use crate::errors::CacheBackendError;
use crate::models::{AnalysisResult, CacheTier};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: CacheKey,
    pub result: AnalysisResult,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Tier this copy of the entry was read from.
    #[serde(default)]
    pub tier: CacheTier,
}

impl CacheEntry {
    pub fn new(key: CacheKey, result: AnalysisResult, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            key,
            result,
            created_at: now,
            expires_at: expiry_after(now, ttl),
            tier: CacheTier::Memory,
        }
    }

    pub fn with_tier(mut self, tier: CacheTier) -> Self {
        self.tier = tier;
        self
    }

    /// An entry is served up to and including its expiry instant.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now <= self.expires_at
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// `now + ttl`, saturating at the latest representable instant.
pub(crate) fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    i64::try_from(ttl.as_millis())
        .ok()
        .and_then(chrono::Duration::try_milliseconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The persistent (L2) cache tier.
///
/// Writes are idempotent upserts keyed by the cache key. Implementations may
/// return expired entries from `get`; the cache manager checks freshness.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheBackendError>;

    async fn put(
        &self,
        key: &CacheKey,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> Result<(), CacheBackendError>;

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheBackendError>;

    /// Delete entries that expired before `now`. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheBackendError>;
}

/// Process-local persistent tier, for tests and single-process deployments
/// without a database.
#[derive(Default)]
pub struct InMemoryStore {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl PersistentStore for InMemoryStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheBackendError> {
        Ok(self
            .entries
            .get(key)
            .map(|e| e.value().clone().with_tier(CacheTier::Persistent)))
    }

    async fn put(
        &self,
        key: &CacheKey,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> Result<(), CacheBackendError> {
        let mut entry = entry.clone();
        entry.expires_at = expiry_after(entry.created_at, ttl);
        self.entries.insert(key.clone(), entry);
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheBackendError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, CacheBackendError> {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.is_fresh(now));
        Ok(before.saturating_sub(self.entries.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_result;

    #[test]
    fn test_huge_ttl_saturates() {
        let now = DateTime::<Utc>::UNIX_EPOCH;
        assert_eq!(expiry_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            expiry_after(now, Duration::from_secs(u64::MAX / 1000)),
            DateTime::<Utc>::MAX_UTC
        );

        let entry = CacheEntry::new(CacheKey::from_digest("k"), sample_result("0xABC"), now, Duration::MAX);
        assert!(entry.is_fresh(now + chrono::Duration::days(365 * 1000)));
    }

    #[tokio::test]
    async fn test_store_reports_persistent_origin() {
        let store = InMemoryStore::new();
        let now = DateTime::<Utc>::UNIX_EPOCH;
        let key = CacheKey::from_digest("k");
        let entry = CacheEntry::new(key.clone(), sample_result("0xABC"), now, Duration::from_secs(60));
        assert_eq!(entry.tier, CacheTier::Memory);

        store.put(&key, &entry, Duration::MAX).await.unwrap();
        let loaded = store.get(&key).await.unwrap().unwrap();
        assert_eq!(loaded.tier, CacheTier::Persistent);
        assert_eq!(loaded.expires_at, DateTime::<Utc>::MAX_UTC);
    }
}
