//! SQLite implementation of IMetadataStore
//!
//! One `items` table holds every record of a domain. Tree position is
//! `(parent_path, name)`, kept unique by an index; identifiers never change
//! once assigned.
//!
//! ## Type Mapping
//!
//! | Domain Type      | SQL Type | Strategy                                   |
//! |------------------|----------|--------------------------------------------|
//! | ItemId           | TEXT     | `.as_str()` / `ItemId::new()`              |
//! | RemotePath       | TEXT     | `.as_str()` / `RemotePath::new()`          |
//! | ItemStatus       | TEXT     | `.as_str()` / `FromStr` (snake_case)       |
//! | TransferHandle   | TEXT     | `.as_str()` / `TransferHandle::new()`      |
//! | DateTime<Utc>    | TEXT     | `to_rfc3339()` / `parse_from_rfc3339()`    |
//! | bool             | INTEGER  | 0 / 1                                      |
//!
//! ## Subtree matching
//!
//! Descendants of a directory at `P` are the rows whose `parent_path` is `P`
//! or starts with `P/`. Matching uses `substr` rather than `LIKE` so that
//! `%` and `_` in names need no escaping and `/a` never matches `/ab`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

use stratus_core::domain::{
    split_path, ItemId, ItemRecord, ItemStatus, RemotePath, TransferHandle,
};
use stratus_core::ports::IMetadataStore;

use crate::CacheError;

const COLUMNS: &str = "id, parent_path, name, etag, size, modified_at, content_type, \
                       is_directory, status, session_error, transfer_handle";

/// SQLite-based implementation of the metadata store port
pub struct SqliteMetadataStore {
    pool: SqlitePool,
}

impl SqliteMetadataStore {
    /// Creates a store over the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn record_from_row(row: &SqliteRow) -> Result<ItemRecord, CacheError> {
    let id: String = row.get("id");
    let parent_path: String = row.get("parent_path");
    let name: String = row.get("name");
    let etag: String = row.get("etag");
    let size: i64 = row.get("size");
    let modified_at: String = row.get("modified_at");
    let content_type: Option<String> = row.get("content_type");
    let is_directory: bool = row.get("is_directory");
    let status: String = row.get("status");
    let session_error: Option<String> = row.get("session_error");
    let transfer_handle: Option<String> = row.get("transfer_handle");

    let record = ItemRecord::new(
        ItemId::new(id)?,
        RemotePath::new(parent_path)?,
        name,
        is_directory,
    )?
    .with_etag(etag)
    .with_size(u64::try_from(size).unwrap_or(0))
    .with_modified(parse_datetime(&modified_at)?)
    .with_content_type(content_type)
    .with_status(ItemStatus::from_str(&status)?, session_error)
    .with_transfer_handle(transfer_handle.map(TransferHandle::new));

    Ok(record)
}

fn records_from_rows(rows: &[SqliteRow]) -> Result<Vec<ItemRecord>, CacheError> {
    rows.iter().map(record_from_row).collect()
}

// ============================================================================
// Transaction helpers
// ============================================================================

/// Identifiers of every row strictly below `path`
async fn subtree_ids(
    conn: &mut SqliteConnection,
    path: &RemotePath,
) -> Result<Vec<String>, CacheError> {
    let ids: Vec<String> = if path.is_root() {
        sqlx::query_scalar("SELECT id FROM items")
            .fetch_all(&mut *conn)
            .await?
    } else {
        sqlx::query_scalar(
            "SELECT id FROM items \
             WHERE parent_path = ? OR substr(parent_path, 1, length(?) + 1) = ? || '/'",
        )
        .bind(path.as_str())
        .bind(path.as_str())
        .bind(path.as_str())
        .fetch_all(&mut *conn)
        .await?
    };
    Ok(ids)
}

/// Deletes every row strictly below `path`, returning their identifiers
async fn delete_subtree(
    conn: &mut SqliteConnection,
    path: &RemotePath,
) -> Result<Vec<String>, CacheError> {
    let ids = subtree_ids(conn, path).await?;
    if ids.is_empty() {
        return Ok(ids);
    }
    sqlx::query(
        "DELETE FROM items \
         WHERE parent_path = ? OR substr(parent_path, 1, length(?) + 1) = ? || '/'",
    )
    .bind(path.as_str())
    .bind(path.as_str())
    .bind(path.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(ids)
}

/// Removes whatever other record sits at `parent/name`, with its subtree
async fn evict_position(
    conn: &mut SqliteConnection,
    parent: &RemotePath,
    name: &str,
    keep: &ItemId,
) -> Result<Vec<String>, CacheError> {
    let occupant = sqlx::query(
        "SELECT id, is_directory FROM items WHERE parent_path = ? AND name = ? AND id != ?",
    )
    .bind(parent.as_str())
    .bind(name)
    .bind(keep.as_str())
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = occupant else {
        return Ok(Vec::new());
    };
    let occupant_id: String = row.get("id");
    let is_directory: bool = row.get("is_directory");

    let mut evicted = Vec::new();
    if is_directory {
        evicted = delete_subtree(conn, &parent.join(name)?).await?;
    }
    sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(&occupant_id)
        .execute(&mut *conn)
        .await?;
    evicted.insert(0, occupant_id);

    tracing::trace!(parent = %parent, name, evicted = evicted.len(), "Evicted position occupant");
    Ok(evicted)
}

/// Rewrites the `old` prefix of every descendant's parent path to `new`
async fn rewrite_prefix(
    conn: &mut SqliteConnection,
    old: &RemotePath,
    new: &RemotePath,
) -> Result<u64, CacheError> {
    let result = sqlx::query(
        "UPDATE items SET parent_path = ? || substr(parent_path, length(?) + 1) \
         WHERE parent_path = ? OR substr(parent_path, 1, length(?) + 1) = ? || '/'",
    )
    .bind(new.as_str())
    .bind(old.as_str())
    .bind(old.as_str())
    .bind(old.as_str())
    .bind(old.as_str())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

async fn fetch_by_id(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<ItemRecord>, CacheError> {
    let row = sqlx::query(&format!("SELECT {COLUMNS} FROM items WHERE id = ?"))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(record_from_row).transpose()
}

fn ids_from_strings(ids: Vec<String>) -> Result<Vec<ItemId>, CacheError> {
    ids.into_iter()
        .map(|id| ItemId::new(id).map_err(CacheError::from))
        .collect()
}

// ============================================================================
// IMetadataStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IMetadataStore for SqliteMetadataStore {
    async fn get(&self, id: &ItemId) -> anyhow::Result<Option<ItemRecord>> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM items WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_by_path(&self, path: &RemotePath) -> anyhow::Result<Option<ItemRecord>> {
        if path.is_root() {
            return Ok(None);
        }
        let (parent, name) = split_path(path)?;

        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM items WHERE parent_path = ? AND name = ?"
        ))
        .bind(parent.as_str())
        .bind(&name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn children_of(&self, parent_path: &RemotePath) -> anyhow::Result<Vec<ItemRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM items WHERE parent_path = ? ORDER BY name"
        ))
        .bind(parent_path.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(records_from_rows(&rows)?)
    }

    async fn descendants_of(&self, path: &RemotePath) -> anyhow::Result<Vec<ItemRecord>> {
        let rows = if path.is_root() {
            sqlx::query(&format!("SELECT {COLUMNS} FROM items"))
                .fetch_all(&self.pool)
                .await?
        } else {
            sqlx::query(&format!(
                "SELECT {COLUMNS} FROM items \
                 WHERE parent_path = ? OR substr(parent_path, 1, length(?) + 1) = ? || '/'"
            ))
            .bind(path.as_str())
            .bind(path.as_str())
            .bind(path.as_str())
            .fetch_all(&self.pool)
            .await?
        };

        let mut records = records_from_rows(&rows)?;
        records.sort_by_key(|r| r.path());
        Ok(records)
    }

    async fn in_flight(&self) -> anyhow::Result<Vec<ItemRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM items WHERE status IN (?, ?) ORDER BY parent_path, name"
        ))
        .bind(ItemStatus::Uploading.as_str())
        .bind(ItemStatus::Downloading.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(records_from_rows(&rows)?)
    }

    async fn upsert(&self, record: &ItemRecord) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        evict_position(&mut tx, record.parent_path(), record.name(), record.id()).await?;

        // A directory that changed position takes its subtree along
        let previous = sqlx::query("SELECT parent_path, name, is_directory FROM items WHERE id = ?")
            .bind(record.id().as_str())
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(row) = previous {
            let was_directory: bool = row.get("is_directory");
            let old_parent: String = row.get("parent_path");
            let old_name: String = row.get("name");
            let old_path = RemotePath::new(old_parent)?.join(&old_name)?;
            let new_path = record.path();
            if was_directory && old_path != new_path {
                if record.is_directory() {
                    rewrite_prefix(&mut tx, &old_path, &new_path).await?;
                } else {
                    delete_subtree(&mut tx, &old_path).await?;
                }
            }
        }

        sqlx::query(
            "INSERT INTO items (id, parent_path, name, etag, size, modified_at, content_type, \
                                is_directory, status, session_error, transfer_handle) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                parent_path = excluded.parent_path, \
                name = excluded.name, \
                etag = excluded.etag, \
                size = excluded.size, \
                modified_at = excluded.modified_at, \
                content_type = excluded.content_type, \
                is_directory = excluded.is_directory, \
                status = excluded.status, \
                session_error = excluded.session_error, \
                transfer_handle = excluded.transfer_handle",
        )
        .bind(record.id().as_str())
        .bind(record.parent_path().as_str())
        .bind(record.name())
        .bind(record.etag())
        .bind(i64::try_from(record.size()).unwrap_or(i64::MAX))
        .bind(record.modified().to_rfc3339())
        .bind(record.content_type())
        .bind(record.is_directory())
        .bind(record.status().as_str())
        .bind(record.session_error())
        .bind(record.transfer_handle().map(TransferHandle::as_str))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::trace!(item_id = %record.id(), path = %record.path(), "Upserted item");
        Ok(())
    }

    async fn delete(&self, id: &ItemId) -> anyhow::Result<Option<Vec<ItemId>>> {
        let mut tx = self.pool.begin().await?;

        let Some(record) = fetch_by_id(&mut tx, id.as_str()).await? else {
            return Ok(None);
        };

        let mut removed = vec![id.as_str().to_string()];
        if record.is_directory() {
            removed.extend(delete_subtree(&mut tx, &record.path()).await?);
        }
        sqlx::query("DELETE FROM items WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::trace!(item_id = %id, removed = removed.len(), "Deleted item");
        Ok(Some(ids_from_strings(removed)?))
    }

    async fn rename_and_cascade(
        &self,
        id: &ItemId,
        new_parent: &RemotePath,
        new_name: &str,
    ) -> anyhow::Result<Option<ItemRecord>> {
        let new_path = new_parent.join(new_name)?;
        let mut tx = self.pool.begin().await?;

        let Some(record) = fetch_by_id(&mut tx, id.as_str()).await? else {
            return Ok(None);
        };
        let old_path = record.path();
        if old_path == new_path {
            return Ok(Some(record));
        }
        if record.is_directory() && new_path.is_descendant_of(&old_path) {
            anyhow::bail!("Cannot move {} into its own subtree at {}", old_path, new_path);
        }

        evict_position(&mut tx, new_parent, new_name, id).await?;

        sqlx::query("UPDATE items SET parent_path = ?, name = ? WHERE id = ?")
            .bind(new_parent.as_str())
            .bind(new_name)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        let mut cascaded = 0;
        if record.is_directory() {
            cascaded = rewrite_prefix(&mut tx, &old_path, &new_path).await?;
        }

        let updated = fetch_by_id(&mut tx, id.as_str()).await?;
        tx.commit().await?;

        tracing::trace!(
            item_id = %id,
            from = %old_path,
            to = %new_path,
            cascaded,
            "Renamed item"
        );
        Ok(updated)
    }

    async fn set_status(
        &self,
        id: &ItemId,
        status: ItemStatus,
        error: Option<&str>,
    ) -> anyhow::Result<Option<ItemRecord>> {
        let error = if status == ItemStatus::Normal { None } else { error };

        let row = sqlx::query(&format!(
            "UPDATE items SET status = ?, session_error = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(status.as_str())
        .bind(error)
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        tracing::trace!(item_id = %id, status = %status, "Updated item status");
        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn set_transfer_handle(
        &self,
        id: &ItemId,
        handle: Option<&TransferHandle>,
    ) -> anyhow::Result<Option<ItemRecord>> {
        let row = sqlx::query(&format!(
            "UPDATE items SET transfer_handle = ? WHERE id = ? RETURNING {COLUMNS}"
        ))
        .bind(handle.map(TransferHandle::as_str))
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(record_from_row).transpose()?)
    }
}
