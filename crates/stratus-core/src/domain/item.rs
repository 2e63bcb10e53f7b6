//! Item record domain entity
//!
//! An [`ItemRecord`] is the metadata store's view of one file or directory.
//! Its tree position is `(parent_path, name)`; its identity is the
//! backend-assigned [`ItemId`], which never changes across renames.
//!
//! ## Status transitions
//!
//! ```text
//!                upload start               success
//!   ┌────────┐ ─────────────► ┌───────────┐ ────────► ┌────────┐
//!   │ Normal │                │ Uploading │           │ Normal │
//!   └────────┘ ◄───────┐      └───────────┘           └────────┘
//!       │              │            │ failure / cancel
//!       │ download     │ success    ▼
//!       ▼              │      ┌─────────────┐
//!   ┌─────────────┐ ───┘      │ UploadError │
//!   │ Downloading │           └─────────────┘
//!   └─────────────┘ ── failure / cancel ──► DownloadError
//! ```
//!
//! Only the synchronization engine drives these transitions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ItemId, RemotePath, TransferHandle};

// ============================================================================
// ItemStatus
// ============================================================================

/// Direction of a content transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Local content pushed to the backend
    Upload,
    /// Remote content pulled to a local file
    Download,
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferKind::Upload => write!(f, "upload"),
            TransferKind::Download => write!(f, "download"),
        }
    }
}

/// Synchronization status of an item record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// In sync with the backend
    #[default]
    Normal,
    /// Content upload in progress
    Uploading,
    /// Content download in progress
    Downloading,
    /// The last upload failed or was cancelled
    UploadError,
    /// The last download failed or was cancelled
    DownloadError,
}

impl ItemStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Normal => "normal",
            ItemStatus::Uploading => "uploading",
            ItemStatus::Downloading => "downloading",
            ItemStatus::UploadError => "upload_error",
            ItemStatus::DownloadError => "download_error",
        }
    }

    /// Returns true while a transfer is in flight
    pub fn is_transferring(&self) -> bool {
        matches!(self, ItemStatus::Uploading | ItemStatus::Downloading)
    }

    /// Returns true for either error state
    pub fn is_error(&self) -> bool {
        matches!(self, ItemStatus::UploadError | ItemStatus::DownloadError)
    }

    /// In-flight status for a transfer direction
    pub fn in_flight(kind: TransferKind) -> Self {
        match kind {
            TransferKind::Upload => ItemStatus::Uploading,
            TransferKind::Download => ItemStatus::Downloading,
        }
    }

    /// Error status for a transfer direction
    pub fn error_for(kind: TransferKind) -> Self {
        match kind {
            TransferKind::Upload => ItemStatus::UploadError,
            TransferKind::Download => ItemStatus::DownloadError,
        }
    }

    /// Transfer direction of an in-flight status
    pub fn transfer_kind(&self) -> Option<TransferKind> {
        match self {
            ItemStatus::Uploading => Some(TransferKind::Upload),
            ItemStatus::Downloading => Some(TransferKind::Download),
            _ => None,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(ItemStatus::Normal),
            "uploading" => Ok(ItemStatus::Uploading),
            "downloading" => Ok(ItemStatus::Downloading),
            "upload_error" => Ok(ItemStatus::UploadError),
            "download_error" => Ok(ItemStatus::DownloadError),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

// ============================================================================
// ItemRecord
// ============================================================================

/// Persistent metadata for one file or directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    id: ItemId,
    parent_path: RemotePath,
    name: String,
    etag: String,
    size: u64,
    modified: DateTime<Utc>,
    content_type: Option<String>,
    is_directory: bool,
    status: ItemStatus,
    session_error: Option<String>,
    transfer_handle: Option<TransferHandle>,
}

impl ItemRecord {
    /// Create a record at `parent_path/name`
    ///
    /// # Errors
    /// Returns error if `id` is the root identifier or `name` is not a
    /// valid single path component.
    pub fn new(
        id: ItemId,
        parent_path: RemotePath,
        name: impl Into<String>,
        is_directory: bool,
    ) -> Result<Self, DomainError> {
        if id.is_root() {
            return Err(DomainError::InvalidId(
                "The root identifier cannot be stored".to_string(),
            ));
        }
        let name = name.into();
        parent_path.join(&name)?;
        Ok(Self {
            id,
            parent_path,
            name,
            etag: String::new(),
            size: 0,
            modified: Utc::now(),
            content_type: None,
            is_directory,
            status: ItemStatus::Normal,
            session_error: None,
            transfer_handle: None,
        })
    }

    /// Create a file record
    ///
    /// # Errors
    /// See [`ItemRecord::new`].
    pub fn new_file(
        id: ItemId,
        parent_path: RemotePath,
        name: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Self::new(id, parent_path, name, false)
    }

    /// Create a directory record
    ///
    /// # Errors
    /// See [`ItemRecord::new`].
    pub fn new_directory(
        id: ItemId,
        parent_path: RemotePath,
        name: impl Into<String>,
    ) -> Result<Self, DomainError> {
        Self::new(id, parent_path, name, true)
    }

    /// Create a record positioned at a full path
    ///
    /// # Errors
    /// Returns error if `path` is the root.
    pub fn at_path(id: ItemId, path: &RemotePath, is_directory: bool) -> Result<Self, DomainError> {
        let (parent, name) = split_path(path)?;
        Self::new(id, parent, name, is_directory)
    }

    // --- Builder-style setters used when loading or adopting records ---

    #[must_use]
    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = etag.into();
        self
    }

    #[must_use]
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = modified;
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: Option<String>) -> Self {
        self.content_type = content_type;
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: ItemStatus, session_error: Option<String>) -> Self {
        self.status = status;
        self.session_error = session_error;
        self
    }

    #[must_use]
    pub fn with_transfer_handle(mut self, handle: Option<TransferHandle>) -> Self {
        self.transfer_handle = handle;
        self
    }

    // --- Getters ---

    pub fn id(&self) -> &ItemId {
        &self.id
    }

    pub fn parent_path(&self) -> &RemotePath {
        &self.parent_path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn etag(&self) -> &str {
        &self.etag
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn session_error(&self) -> Option<&str> {
        self.session_error.as_deref()
    }

    pub fn transfer_handle(&self) -> Option<&TransferHandle> {
        self.transfer_handle.as_ref()
    }

    /// Full path of the item (`parent_path` joined with `name`)
    pub fn path(&self) -> RemotePath {
        // name was validated as a component at construction and on relocate
        self.parent_path
            .join(&self.name)
            .unwrap_or_else(|_| self.parent_path.clone())
    }

    // --- Mutators ---

    /// Set the status. Entering `Normal` clears the session error.
    pub fn set_status(&mut self, status: ItemStatus, session_error: Option<String>) {
        self.status = status;
        self.session_error = if status == ItemStatus::Normal {
            None
        } else {
            session_error
        };
    }

    /// Adopt backend-confirmed version attributes after a successful write
    pub fn apply_remote_version(&mut self, etag: impl Into<String>, size: u64, modified: DateTime<Utc>) {
        self.etag = etag.into();
        self.size = size;
        self.modified = modified;
    }

    /// Move the record to a new tree position
    ///
    /// # Errors
    /// Returns error if `name` is not a valid path component.
    pub fn relocate(&mut self, parent_path: RemotePath, name: impl Into<String>) -> Result<(), DomainError> {
        let name = name.into();
        parent_path.join(&name)?;
        self.parent_path = parent_path;
        self.name = name;
        Ok(())
    }

    pub fn set_transfer_handle(&mut self, handle: Option<TransferHandle>) {
        self.transfer_handle = handle;
    }

    pub fn set_content_type(&mut self, content_type: Option<String>) {
        self.content_type = content_type;
    }
}

/// Split a non-root path into `(parent, name)`
///
/// # Errors
/// Returns error for the root path.
pub fn split_path(path: &RemotePath) -> Result<(RemotePath, String), DomainError> {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => Ok((parent, name.to_string())),
        _ => Err(DomainError::InvalidPath(
            "The root path has no parent".to_string(),
        )),
    }
}
