//! Database model for persisted analysis results.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use vantage_engine::{CacheEntry, CacheKey, CacheTier};

use crate::errors::{Result, StorageError};

/// One row of `analysis_cache`. The result is stored as its JSON contract.
#[derive(Queryable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::analysis_cache)]
pub struct AnalysisCacheDB {
    pub cache_key: String,
    pub payload: String,
    pub created_at_ms: i64,
    pub expires_at_ms: i64,
}

impl AnalysisCacheDB {
    pub fn from_entry(key: &CacheKey, entry: &CacheEntry) -> Result<Self> {
        Ok(Self {
            cache_key: key.as_str().to_string(),
            payload: serde_json::to_string(&entry.result)?,
            created_at_ms: entry.created_at.timestamp_millis(),
            expires_at_ms: entry.expires_at.timestamp_millis(),
        })
    }

    pub fn into_entry(self) -> Result<CacheEntry> {
        Ok(CacheEntry {
            key: CacheKey::from_digest(self.cache_key),
            result: serde_json::from_str(&self.payload)?,
            created_at: millis_to_datetime(self.created_at_ms)?,
            expires_at: millis_to_datetime(self.expires_at_ms)?,
            tier: CacheTier::Persistent,
        })
    }
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StorageError::CorruptRow(format!("timestamp out of range: {}", ms)))
}
