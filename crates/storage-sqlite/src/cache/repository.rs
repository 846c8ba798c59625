use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::task;

use super::model::AnalysisCacheDB;
use crate::db::{self, get_connection, DbPool, WriteHandle};
use crate::errors::{Result, StorageError};
use crate::schema::analysis_cache;
use vantage_engine::{CacheBackendError, CacheEntry, CacheKey, PersistentStore};

/// Persistent cache tier backed by one SQLite table.
///
/// Reads go through the pool on the blocking thread pool; writes are
/// serialized through the writer actor.
pub struct SqliteCacheStore {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteCacheStore {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        SqliteCacheStore { pool, writer }
    }

    /// Create (or reopen) the database at `db_path`, apply migrations and
    /// start the writer. Must be called inside a Tokio runtime.
    pub fn open(db_path: &str) -> Result<Self> {
        let db_path = db::init(db_path)?;
        let pool = db::create_pool(&db_path)?;
        db::run_migrations(&pool)?;
        let writer = db::spawn_writer((*pool).clone());
        Ok(Self::new(pool, writer))
    }

    /// Number of stored rows, expired ones included.
    pub fn len(&self) -> Result<usize> {
        let mut conn = get_connection(&self.pool)?;
        let count: i64 = analysis_cache::table.count().get_result(&mut conn)?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let pool = Arc::clone(&self.pool);
        let digest = key.as_str().to_string();
        task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            let row = analysis_cache::table
                .find(digest)
                .first::<AnalysisCacheDB>(&mut conn)
                .optional()?;
            row.map(AnalysisCacheDB::into_entry).transpose()
        })
        .await?
    }

    async fn store(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration) -> Result<()> {
        let mut row = AnalysisCacheDB::from_entry(key, entry)?;
        row.expires_at_ms = row
            .created_at_ms
            .saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));

        self.writer
            .exec(move |conn| {
                diesel::replace_into(analysis_cache::table)
                    .values(&row)
                    .execute(conn)?;
                Ok(())
            })
            .await
    }

    async fn delete(&self, key: &CacheKey) -> Result<()> {
        let digest = key.as_str().to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(analysis_cache::table.find(digest)).execute(conn)?;
                Ok(())
            })
            .await
    }

    async fn purge(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now.timestamp_millis();
        let removed = self
            .writer
            .exec(move |conn| {
                diesel::delete(analysis_cache::table.filter(analysis_cache::expires_at_ms.lt(cutoff)))
                    .execute(conn)
                    .map_err(StorageError::from)
            })
            .await?;
        if removed > 0 {
            debug!("Purged {} expired cache rows", removed);
        }
        Ok(removed)
    }
}

#[async_trait]
impl PersistentStore for SqliteCacheStore {
    async fn get(&self, key: &CacheKey) -> std::result::Result<Option<CacheEntry>, CacheBackendError> {
        Ok(self.load(key).await?)
    }

    async fn put(
        &self,
        key: &CacheKey,
        entry: &CacheEntry,
        ttl: Duration,
    ) -> std::result::Result<(), CacheBackendError> {
        Ok(self.store(key, entry, ttl).await?)
    }

    async fn remove(&self, key: &CacheKey) -> std::result::Result<(), CacheBackendError> {
        Ok(self.delete(key).await?)
    }

    async fn purge_expired(
        &self,
        now: DateTime<Utc>,
    ) -> std::result::Result<usize, CacheBackendError> {
        Ok(self.purge(now).await?)
    }
}
