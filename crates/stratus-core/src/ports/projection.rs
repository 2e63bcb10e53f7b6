//! Host projection port (driving/primary port)
//!
//! The verbs a host filesystem-projection layer issues against a domain.
//! The synchronization engine implements this trait; a host binding holds
//! it as `Arc<dyn IProjectionHost>` and never touches the engine's
//! internals.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{ChangedFields, ItemId, ItemTemplate, ProjectedItem, SyncError};

/// Opaque continuation token for a paginated enumeration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageToken(String);

impl PageToken {
    /// Wrap an encoded token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of an enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerationPage {
    pub items: Vec<ProjectedItem>,
    /// Token for the next page; `None` once the traversal is finished
    pub next_page: Option<PageToken>,
}

impl EnumerationPage {
    /// Returns true if no further pages follow
    pub fn is_last(&self) -> bool {
        self.next_page.is_none()
    }
}

/// Downloaded contents handed back to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedContents {
    /// Local file holding the content
    pub path: PathBuf,
    /// The item with any metadata refreshed during the download
    pub item: ProjectedItem,
}

/// Port trait served to the host projection layer
#[async_trait::async_trait]
pub trait IProjectionHost: Send + Sync {
    /// Returns the current projection of an item
    async fn item_for(&self, id: &ItemId) -> Result<ProjectedItem, SyncError>;

    /// Downloads the latest content of an item
    ///
    /// Any explicit `version` is rejected with `FeatureUnsupported`.
    async fn fetch_contents(
        &self,
        id: &ItemId,
        version: Option<&str>,
    ) -> Result<FetchedContents, SyncError>;

    /// Creates a new item from a host template
    async fn create_item(
        &self,
        template: &ItemTemplate,
        contents: Option<&Path>,
    ) -> Result<ProjectedItem, SyncError>;

    /// Applies structural and/or content changes to an item
    async fn modify_item(
        &self,
        item: &ProjectedItem,
        changed: &ChangedFields,
        contents: Option<&Path>,
    ) -> Result<ProjectedItem, SyncError>;

    /// Deletes an item (recursively for directories)
    async fn delete_item(&self, id: &ItemId) -> Result<(), SyncError>;

    /// Lists a container's children, one page at a time
    async fn enumerate(
        &self,
        container: &ItemId,
        page: Option<&PageToken>,
    ) -> Result<EnumerationPage, SyncError>;

    /// The host reports that its set of materialized items changed
    fn materialized_items_changed(&self);
}
