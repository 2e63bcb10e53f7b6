//! Remote operation client port (driven/secondary port)
//!
//! This module defines the interface the engine uses to reach the backend.
//! The wire protocol lives entirely in the adapter; the engine only sees
//! paths, entries and [`RemoteError`]s.
//!
//! ## Design Notes
//!
//! - Every method is a suspension point. The engine never holds a store
//!   transaction across one of these calls.
//! - Errors use the typed [`RemoteError`] rather than `anyhow` because the
//!   engine must map them one-to-one onto the host-facing taxonomy.
//! - Transfers report progress and their background task handle through a
//!   [`TransferObserver`] supplied by the caller.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    DomainError, ItemId, ItemRecord, RemoteError, RemotePath, TransferHandle,
};

// ============================================================================
// DTOs
// ============================================================================

/// How deep a listing descends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListDepth {
    /// Direct children only
    Children,
    /// The whole subtree
    Infinite,
}

/// An item as reported by the backend
///
/// Listings never include the listed container itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Backend-assigned identifier
    pub id: ItemId,
    /// Absolute remote path
    pub path: RemotePath,
    /// Version token
    pub etag: String,
    /// Size in bytes (0 for directories)
    pub size: u64,
    /// Last modification time
    pub modified: DateTime<Utc>,
    /// MIME type, when the backend knows it
    pub content_type: Option<String>,
    /// Whether the entry is a directory
    pub is_directory: bool,
}

impl RemoteEntry {
    /// Convert into a fresh `Normal` item record
    ///
    /// # Errors
    /// Returns error if the entry is positioned at the root path.
    pub fn into_record(self) -> Result<ItemRecord, DomainError> {
        Ok(ItemRecord::at_path(self.id, &self.path, self.is_directory)?
            .with_etag(self.etag)
            .with_size(self.size)
            .with_modified(self.modified)
            .with_content_type(self.content_type))
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Identifier of the written item (new on create, unchanged on replace)
    pub id: ItemId,
    /// New version token
    pub etag: String,
    /// Modification time recorded by the backend
    pub modified: DateTime<Utc>,
    /// Stored size in bytes
    pub size: u64,
}

/// Result of a successful download
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Local file holding the downloaded content
    pub local_file: PathBuf,
    /// Version token observed during the download
    pub etag: String,
    /// Size in bytes
    pub size: u64,
    /// Modification time observed during the download
    pub modified: DateTime<Utc>,
}

// ============================================================================
// TransferObserver
// ============================================================================

/// Receives progress and task-handle callbacks for one transfer
pub trait TransferObserver: Send + Sync {
    /// Bytes transferred so far out of `total`
    fn on_progress(&self, completed: u64, total: u64);

    /// The backend started a background task for this transfer
    fn on_task(&self, handle: TransferHandle);
}

/// An observer that ignores every callback
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl TransferObserver for NoopObserver {
    fn on_progress(&self, _completed: u64, _total: u64) {}

    fn on_task(&self, _handle: TransferHandle) {}
}

// ============================================================================
// IRemoteClient trait
// ============================================================================

/// Port trait for backend operations
#[async_trait::async_trait]
pub trait IRemoteClient: Send + Sync {
    /// Moves or renames `src` to `dst`
    ///
    /// Fails if `dst` exists and `overwrite` is false.
    async fn move_item(
        &self,
        src: &RemotePath,
        dst: &RemotePath,
        overwrite: bool,
    ) -> Result<(), RemoteError>;

    /// Creates a directory at `path` and returns its entry
    async fn create_directory(&self, path: &RemotePath) -> Result<RemoteEntry, RemoteError>;

    /// Writes content to `path`
    ///
    /// `local_file` of `None` writes an empty file. With `overwrite` false
    /// the call creates a new item and fails if `path` already exists; with
    /// `overwrite` true it replaces the content of the item at `path`.
    async fn upload(
        &self,
        path: &RemotePath,
        local_file: Option<&Path>,
        overwrite: bool,
        observer: &dyn TransferObserver,
    ) -> Result<UploadOutcome, RemoteError>;

    /// Downloads the latest content of `path` into a local file
    async fn download(
        &self,
        path: &RemotePath,
        observer: &dyn TransferObserver,
    ) -> Result<DownloadOutcome, RemoteError>;

    /// Deletes `path` (recursively for directories)
    async fn delete(&self, path: &RemotePath) -> Result<(), RemoteError>;

    /// Lists entries below `path`
    async fn list(&self, path: &RemotePath, depth: ListDepth)
        -> Result<Vec<RemoteEntry>, RemoteError>;
}
