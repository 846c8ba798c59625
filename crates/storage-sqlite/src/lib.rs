//! SQLite persistent cache tier for the Vantage analysis engine.
//!
//! Implements [`vantage_engine::PersistentStore`] on top of Diesel with a
//! pooled read path and a single-writer actor for upserts and purges.
//!
//! ```text
//! vantage-engine (CacheManager)
//!          │  PersistentStore
//!          ▼
//!  storage-sqlite (this crate)
//!          │
//!          ▼
//!      SQLite DB
//! ```

pub mod cache;
pub mod db;
pub mod errors;
pub mod schema;

pub use cache::SqliteCacheStore;
pub use db::{create_pool, get_connection, init, run_migrations, DbConnection, DbPool, WriteHandle};
pub use errors::StorageError;
