//! Conversion between stored records and host-facing projected items

use std::sync::Arc;

use chrono::Utc;

use stratus_core::domain::{
    Capabilities, ItemId, ItemRecord, ItemStatus, ProjectedItem, RemotePath, SyncError,
    DEFAULT_CONTENT_TYPE, DIRECTORY_CONTENT_TYPE,
};
use stratus_core::ports::IMetadataStore;

/// Session error shown when an error status carries no stored diagnostic
const UNKNOWN_ERROR: &str = "unknown error";

/// Builds [`ProjectedItem`]s from [`ItemRecord`]s
#[derive(Clone)]
pub struct ItemAdapter {
    store: Arc<dyn IMetadataStore>,
}

impl ItemAdapter {
    pub fn new(store: Arc<dyn IMetadataStore>) -> Self {
        Self { store }
    }

    /// Projects `record`, resolving its parent identifier from the store
    ///
    /// An unknown parent is reported as the root.
    pub async fn adapt(&self, record: &ItemRecord) -> ProjectedItem {
        let parent = self.parent_identifier(record.parent_path()).await;
        Self::adapt_with_parent(record, parent)
    }

    /// Projects `record` under an already known parent identifier
    pub fn adapt_with_parent(record: &ItemRecord, parent: ItemId) -> ProjectedItem {
        let status = record.status();
        let error_text = || {
            record
                .session_error()
                .unwrap_or(UNKNOWN_ERROR)
                .to_string()
        };

        let (content_type, document_size, capabilities) = if record.is_directory() {
            (DIRECTORY_CONTENT_TYPE.to_string(), None, Capabilities::directory())
        } else {
            (
                record
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string(),
                Some(record.size()),
                Capabilities::file(),
            )
        };

        ProjectedItem {
            identifier: record.id().clone(),
            parent_identifier: parent,
            filename: record.name().to_string(),
            content_type,
            document_size,
            content_modification_date: record.modified(),
            item_version: record.etag().to_string(),
            capabilities,
            is_uploaded: !matches!(status, ItemStatus::Uploading | ItemStatus::UploadError),
            is_uploading: status == ItemStatus::Uploading,
            is_downloaded: !matches!(status, ItemStatus::Downloading | ItemStatus::DownloadError),
            is_downloading: status == ItemStatus::Downloading,
            upload_error: (status == ItemStatus::UploadError).then(error_text),
            download_error: (status == ItemStatus::DownloadError).then(error_text),
        }
    }

    /// The synthesized root container
    pub fn root_item() -> ProjectedItem {
        ProjectedItem {
            identifier: ItemId::root(),
            parent_identifier: ItemId::root(),
            filename: "/".to_string(),
            content_type: DIRECTORY_CONTENT_TYPE.to_string(),
            document_size: None,
            content_modification_date: Utc::now(),
            item_version: String::new(),
            capabilities: Capabilities::root(),
            is_uploaded: true,
            is_uploading: false,
            is_downloaded: true,
            is_downloading: false,
            upload_error: None,
            download_error: None,
        }
    }

    /// Identifier of the directory at `parent_path`
    pub async fn parent_identifier(&self, parent_path: &RemotePath) -> ItemId {
        if parent_path.is_root() {
            return ItemId::root();
        }
        match self.store.get_by_path(parent_path).await {
            Ok(Some(parent)) => parent.id().clone(),
            Ok(None) => {
                tracing::debug!(parent = %parent_path, "Parent not in store, reporting root");
                ItemId::root()
            }
            Err(e) => {
                tracing::warn!(parent = %parent_path, error = %e, "Parent lookup failed, reporting root");
                ItemId::root()
            }
        }
    }

    /// Path of the container `id`
    ///
    /// # Errors
    ///
    /// `NoSuchItem` if `id` is unknown or not a directory, `Storage` if the
    /// lookup fails.
    pub async fn resolve_directory_path(&self, id: &ItemId) -> Result<RemotePath, SyncError> {
        if id.is_root() {
            return Ok(RemotePath::root());
        }
        let record = self
            .store
            .get(id)
            .await
            .map_err(SyncError::storage)?
            .ok_or_else(|| SyncError::NoSuchItem(format!("container {}", id)))?;
        if !record.is_directory() {
            return Err(SyncError::NoSuchItem(format!("{} is not a directory", id)));
        }
        Ok(record.path())
    }
}
