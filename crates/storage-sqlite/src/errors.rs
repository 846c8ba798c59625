//! Storage-specific error types for SQLite operations.
//!
//! Diesel and r2d2 errors are wrapped in [`StorageError`] inside this crate
//! and converted to the engine's [`CacheBackendError`] at the trait boundary.

use diesel::result::Error as DieselError;
use thiserror::Error;
use vantage_engine::errors::CacheBackendError;

/// Storage-specific errors that wrap Diesel and r2d2 types.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[from] diesel::ConnectionError),

    #[error("Connection pool error: {0}")]
    PoolError(#[from] r2d2::Error),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] DieselError),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Database path error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache row: {0}")]
    CorruptRow(String),

    #[error("Blocking read task failed: {0}")]
    BlockingTask(#[from] tokio::task::JoinError),

    /// The single-writer task is gone or dropped a reply.
    #[error("Writer actor unavailable: {0}")]
    WriterUnavailable(String),
}

impl From<StorageError> for CacheBackendError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ConnectionFailed(e) => CacheBackendError::Unavailable(e.to_string()),
            StorageError::PoolError(e) => CacheBackendError::Unavailable(e.to_string()),
            StorageError::WriterUnavailable(e) => CacheBackendError::Unavailable(e),
            StorageError::BlockingTask(e) => CacheBackendError::Unavailable(e.to_string()),
            StorageError::Io(e) => CacheBackendError::Unavailable(e.to_string()),
            StorageError::QueryFailed(e) => CacheBackendError::Query(e.to_string()),
            StorageError::MigrationFailed(e) => CacheBackendError::Query(e),
            StorageError::SerializationError(e) => CacheBackendError::Serialization(e.to_string()),
            StorageError::CorruptRow(e) => CacheBackendError::Serialization(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
