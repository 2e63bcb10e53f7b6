//! Host-facing item representation
//!
//! The host projection layer never sees [`ItemRecord`](super::ItemRecord)s.
//! It exchanges [`ProjectedItem`]s, proposes new items with an
//! [`ItemTemplate`], and describes edits with [`ChangedFields`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ItemId;

/// Content type reported for directories
pub const DIRECTORY_CONTENT_TYPE: &str = "inode/directory";

/// Content type reported for files without a stored type
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// ============================================================================
// Capabilities
// ============================================================================

/// Operations the host may offer on an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub reading: bool,
    pub writing: bool,
    pub renaming: bool,
    pub reparenting: bool,
    pub deleting: bool,
    pub adding_sub_items: bool,
    pub content_enumerating: bool,
}

impl Capabilities {
    /// Capabilities of a regular file
    pub fn file() -> Self {
        Self {
            reading: true,
            writing: true,
            renaming: true,
            reparenting: true,
            deleting: true,
            adding_sub_items: false,
            content_enumerating: false,
        }
    }

    /// Capabilities of a directory
    pub fn directory() -> Self {
        Self {
            reading: true,
            writing: false,
            renaming: true,
            reparenting: true,
            deleting: true,
            adding_sub_items: true,
            content_enumerating: true,
        }
    }

    /// Capabilities of the root container (cannot be moved or deleted)
    pub fn root() -> Self {
        Self {
            renaming: false,
            reparenting: false,
            deleting: false,
            ..Self::directory()
        }
    }
}

// ============================================================================
// ProjectedItem
// ============================================================================

/// The item representation exchanged with the host projection layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectedItem {
    /// Stable identifier
    pub identifier: ItemId,
    /// Identifier of the containing directory (root for top-level items)
    pub parent_identifier: ItemId,
    /// Last path component
    pub filename: String,
    /// MIME type, or [`DIRECTORY_CONTENT_TYPE`] for directories
    pub content_type: String,
    /// Size in bytes (None for directories)
    pub document_size: Option<u64>,
    pub content_modification_date: DateTime<Utc>,
    /// Remote version token
    pub item_version: String,
    pub capabilities: Capabilities,
    pub is_uploaded: bool,
    pub is_uploading: bool,
    pub is_downloaded: bool,
    pub is_downloading: bool,
    /// Diagnostic text when the last upload failed
    pub upload_error: Option<String>,
    /// Diagnostic text when the last download failed
    pub download_error: Option<String>,
}

impl ProjectedItem {
    /// Returns true for directories
    pub fn is_directory(&self) -> bool {
        self.content_type == DIRECTORY_CONTENT_TYPE
    }
}

// ============================================================================
// ItemTemplate
// ============================================================================

/// A host proposal for a new item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemTemplate {
    pub filename: String,
    pub parent_identifier: ItemId,
    pub is_directory: bool,
    pub content_type: Option<String>,
    pub modified: Option<DateTime<Utc>>,
}

impl ItemTemplate {
    /// Template for a file under `parent`
    pub fn file(parent: ItemId, filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            parent_identifier: parent,
            is_directory: false,
            content_type: None,
            modified: None,
        }
    }

    /// Template for a directory under `parent`
    pub fn directory(parent: ItemId, filename: impl Into<String>) -> Self {
        Self {
            is_directory: true,
            ..Self::file(parent, filename)
        }
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

// ============================================================================
// ChangedFields
// ============================================================================

/// An item attribute the host reports as changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemField {
    Filename,
    ParentIdentifier,
    Contents,
    ContentModificationDate,
    LastUsedDate,
    TagData,
    FavoriteRank,
    ExtendedAttributes,
}

/// The set of fields changed by a modify request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFields(BTreeSet<ItemField>);

impl ChangedFields {
    /// An empty change set
    pub fn none() -> Self {
        Self::default()
    }

    /// Build a change set from a list of fields
    pub fn of(fields: &[ItemField]) -> Self {
        Self(fields.iter().copied().collect())
    }

    #[must_use]
    pub fn with(mut self, field: ItemField) -> Self {
        self.0.insert(field);
        self
    }

    pub fn contains(&self, field: ItemField) -> bool {
        self.0.contains(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Name or parent changed
    pub fn has_structural_change(&self) -> bool {
        self.contains(ItemField::Filename) || self.contains(ItemField::ParentIdentifier)
    }

    /// Content changed
    pub fn has_content_change(&self) -> bool {
        self.contains(ItemField::Contents)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ItemField> {
        self.0.iter()
    }
}
