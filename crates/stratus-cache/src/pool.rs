//! Database connection pool management
//!
//! Wraps SQLx's `SqlitePool` with:
//! - Automatic directory creation for database files
//! - WAL journal mode so readers never block on the single writer
//! - Schema setup on every open (statements are idempotent)
//! - In-memory mode for tests

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

use crate::CacheError;

/// Embedded schema, applied with `sqlx::raw_sql`
const SCHEMA: &str = include_str!("migrations/0001_items.sql");

/// Pool of SQLite connections for one domain's metadata store
///
/// File-backed pools use up to 5 connections with a 5-second busy timeout.
/// In-memory pools are limited to one connection, since every SQLite
/// in-memory connection is its own database.
#[derive(Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (or creates) the database file at `db_path`
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the directory or connection
    /// cannot be created, or `CacheError::MigrationFailed` if the schema
    /// cannot be applied.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to open metadata store at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::apply_schema(&pool).await?;

        tracing::info!(path = %db_path.display(), "Metadata store opened");

        Ok(Self { pool })
    }

    /// Creates an in-memory database for tests
    ///
    /// # Errors
    ///
    /// Same as [`DatabasePool::new`].
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        Self::apply_schema(&pool).await?;

        tracing::debug!("In-memory metadata store initialized");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Waits for open connections to finish and closes the pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn apply_schema(pool: &SqlitePool) -> Result<(), CacheError> {
        sqlx::raw_sql(SCHEMA).execute(pool).await.map_err(|e| {
            CacheError::MigrationFailed(format!("Failed to apply item schema: {}", e))
        })?;
        tracing::debug!("Metadata store schema ready");
        Ok(())
    }
}
