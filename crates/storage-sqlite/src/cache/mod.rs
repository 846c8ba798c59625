//! Persisted analysis results (the L2 cache tier).

mod model;
mod repository;

pub use model::AnalysisCacheDB;
pub use repository::SqliteCacheStore;
