//! Metadata store port (driven/secondary port)
//!
//! The local system of record for tree shape and sync status.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, memory, etc.) and don't need domain-level classification.
//! - A missing identifier is an expected outcome during races with deletion,
//!   so lookups and targeted updates return `Ok(None)` rather than an error.
//! - `upsert`, `delete` and `rename_and_cascade` are atomic: readers observe
//!   either the state before or after the call, never a half-applied cascade.
//! - No method performs network I/O.

use crate::domain::{ItemId, ItemRecord, ItemStatus, RemotePath, TransferHandle};

/// Port trait for item metadata persistence
#[async_trait::async_trait]
pub trait IMetadataStore: Send + Sync {
    /// Retrieves a record by identifier
    async fn get(&self, id: &ItemId) -> anyhow::Result<Option<ItemRecord>>;

    /// Retrieves the record positioned at `path`
    async fn get_by_path(&self, path: &RemotePath) -> anyhow::Result<Option<ItemRecord>>;

    /// Lists the direct children of `parent_path`, ordered by name
    async fn children_of(&self, parent_path: &RemotePath) -> anyhow::Result<Vec<ItemRecord>>;

    /// Lists every record strictly below `path`, ordered by full path
    async fn descendants_of(&self, path: &RemotePath) -> anyhow::Result<Vec<ItemRecord>>;

    /// Lists records whose status is `uploading` or `downloading`
    async fn in_flight(&self) -> anyhow::Result<Vec<ItemRecord>>;

    /// Inserts or replaces a record
    ///
    /// Any other record occupying the same `(parent_path, name)` is removed
    /// together with its subtree, so sibling names stay unique.
    async fn upsert(&self, record: &ItemRecord) -> anyhow::Result<()>;

    /// Removes a record and, for a directory, all of its descendants
    ///
    /// Returns the removed identifiers, or `None` if `id` is unknown.
    async fn delete(&self, id: &ItemId) -> anyhow::Result<Option<Vec<ItemId>>>;

    /// Moves a record to `new_parent/new_name`
    ///
    /// For a directory every descendant's `parent_path` prefix is rewritten
    /// in the same transaction. Returns the updated record, or `None` if
    /// `id` is unknown.
    async fn rename_and_cascade(
        &self,
        id: &ItemId,
        new_parent: &RemotePath,
        new_name: &str,
    ) -> anyhow::Result<Option<ItemRecord>>;

    /// Sets the status and session error of a record
    ///
    /// Setting `Normal` clears the session error. Returns the updated record,
    /// or `None` if `id` is unknown.
    async fn set_status(
        &self,
        id: &ItemId,
        status: ItemStatus,
        error: Option<&str>,
    ) -> anyhow::Result<Option<ItemRecord>>;

    /// Records or clears the in-flight transfer handle of a record
    async fn set_transfer_handle(
        &self,
        id: &ItemId,
        handle: Option<&TransferHandle>,
    ) -> anyhow::Result<Option<ItemRecord>>;
}
