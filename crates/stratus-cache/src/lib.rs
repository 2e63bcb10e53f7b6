//! Stratus Cache - Local metadata store
//!
//! SQLite-backed system of record for:
//! - Item identity and tree position (`parent_path`, `name`)
//! - Version tokens and sizes
//! - Sync status, session errors and in-flight transfer handles
//!
//! ## Architecture
//!
//! This crate implements the `IMetadataStore` port from `stratus-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with schema setup
//! - [`SqliteMetadataStore`] - The `IMetadataStore` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use stratus_cache::{DatabasePool, SqliteMetadataStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/stratus/default.db")).await?;
//! let store = SqliteMetadataStore::new(pool.pool().clone());
//! // Use store as IMetadataStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod store;

pub use pool::DatabasePool;
pub use store::SqliteMetadataStore;

use stratus_core::domain::DomainError;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema setup failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be turned back into a domain value
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<DomainError> for CacheError {
    fn from(e: DomainError) -> Self {
        CacheError::SerializationError(e.to_string())
    }
}
