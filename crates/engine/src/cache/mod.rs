//! Two-tier analysis cache.
//!
//! - `key` - Deterministic request digests
//! - `memory` - Bounded in-process tier with FIFO eviction
//! - `store` - Cache entries and the persistent tier trait
//! - `inflight` - Request collapsing for concurrent identical misses
//! - `manager` - Read path, write-through, invalidation and sweeping

mod inflight;
mod key;
mod manager;
mod memory;
mod store;

pub use inflight::{Role, SharedAnalysis};
pub use key::CacheKey;
pub use manager::{CacheLookup, CacheManager, CacheStats};
pub use memory::MemoryTier;
pub use store::{CacheEntry, InMemoryStore, PersistentStore};
