//! Container enumeration
//!
//! The [`Enumerator`] lists a container on the remote, merges the listing
//! into the metadata store and then serves the stored children as pages.
//!
//! ## Modes
//!
//! | Mode | Remote listing | Deletion scope       | Pages served from   |
//! |------|----------------|----------------------|---------------------|
//! | fast | `Children`     | direct children      | `children_of`       |
//! | full | `Infinite`     | the whole subtree    | `descendants_of`    |
//!
//! In fast mode a move into a directory that was never enumerated is only
//! seen as a deletion (when the old parent is listed again) and later as a
//! creation (when the new parent is listed). Full mode lists the subtree in
//! one go and detects such moves by identifier.
//!
//! ## Merge order
//!
//! Entries are upserted parents first, so a moved directory carries its
//! stored subtree before its children are compared. Stored records in scope
//! whose identifiers are absent from the listing are removed last.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};

use stratus_core::config::EnumerationMode;
use stratus_core::domain::{ItemId, ItemRecord, RemotePath, SyncError};
use stratus_core::ports::{
    EnumerationPage, IMetadataStore, IRemoteClient, ListDepth, PageToken, RemoteEntry,
};

use crate::adapter::ItemAdapter;

// ============================================================================
// MergeReport
// ============================================================================

/// What an enumeration changed in the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Entries stored for the first time
    pub added: usize,
    /// Entries whose version or attributes changed in place
    pub updated: usize,
    /// Entries found at a new path under a known identifier
    pub moved: usize,
    /// Stored records absent from the listing
    pub deleted: usize,
}

impl MergeReport {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.moved == 0 && self.deleted == 0
    }
}

// ============================================================================
// Page tokens
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct Cursor {
    container: String,
    offset: usize,
}

/// Encodes a continuation token for `container` at `offset`
pub fn encode_page_token(container: &ItemId, offset: usize) -> PageToken {
    let cursor = Cursor {
        container: container.as_str().to_string(),
        offset,
    };
    // Serializing a struct of a string and an integer cannot fail
    let json = serde_json::to_vec(&cursor).unwrap_or_default();
    PageToken::new(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json))
}

/// Decodes a continuation token into its container and offset
///
/// # Errors
///
/// `NoSuchItem` for tokens that were not produced by [`encode_page_token`].
pub fn decode_page_token(token: &PageToken) -> Result<(ItemId, usize), SyncError> {
    let malformed = || SyncError::NoSuchItem(format!("malformed page token {}", token.as_str()));

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token.as_str())
        .map_err(|_| malformed())?;
    let cursor: Cursor = serde_json::from_slice(&bytes).map_err(|_| malformed())?;
    let container = ItemId::new(cursor.container).map_err(|_| malformed())?;
    Ok((container, cursor.offset))
}

// ============================================================================
// Enumerator
// ============================================================================

/// Lists containers, merges listings and serves pages
#[derive(Clone)]
pub struct Enumerator {
    remote: Arc<dyn IRemoteClient>,
    store: Arc<dyn IMetadataStore>,
    adapter: ItemAdapter,
    mode: EnumerationMode,
    page_size: usize,
}

impl Enumerator {
    pub fn new(
        remote: Arc<dyn IRemoteClient>,
        store: Arc<dyn IMetadataStore>,
        mode: EnumerationMode,
        page_size: usize,
    ) -> Self {
        Self {
            adapter: ItemAdapter::new(Arc::clone(&store)),
            remote,
            store,
            mode,
            page_size: page_size.max(1),
        }
    }

    pub fn mode(&self) -> EnumerationMode {
        self.mode
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    fn depth(&self) -> ListDepth {
        match self.mode {
            EnumerationMode::Fast => ListDepth::Children,
            EnumerationMode::Full => ListDepth::Infinite,
        }
    }

    fn in_scope(&self, base: &RemotePath, path: &RemotePath) -> bool {
        match self.mode {
            EnumerationMode::Fast => path.parent().as_ref() == Some(base),
            EnumerationMode::Full => path.is_descendant_of(base),
        }
    }

    async fn stored_scope(&self, base: &RemotePath) -> Result<Vec<ItemRecord>, SyncError> {
        let records = match self.mode {
            EnumerationMode::Fast => self.store.children_of(base).await,
            EnumerationMode::Full => self.store.descendants_of(base).await,
        };
        records.map_err(SyncError::storage)
    }

    /// Lists `container` on the remote and merges the result into the store
    ///
    /// # Errors
    ///
    /// `NoSuchItem` for an unknown container, the mapped remote error if the
    /// listing fails, `Storage` if the merge cannot be written.
    pub async fn refresh(&self, container: &ItemId) -> Result<MergeReport, SyncError> {
        let base = self.adapter.resolve_directory_path(container).await?;
        let entries = self.remote.list(&base, self.depth()).await?;
        tracing::debug!(
            container = %container,
            path = %base,
            mode = %self.mode,
            entries = entries.len(),
            "Remote listing received"
        );
        self.merge(&base, entries).await
    }

    /// Merges a remote listing of `base` into the store
    ///
    /// # Errors
    ///
    /// `Storage` if a store read or write fails.
    pub async fn merge(
        &self,
        base: &RemotePath,
        entries: Vec<RemoteEntry>,
    ) -> Result<MergeReport, SyncError> {
        let mut entries: Vec<RemoteEntry> = entries
            .into_iter()
            .filter(|entry| {
                let keep = self.in_scope(base, &entry.path);
                if !keep {
                    tracing::debug!(path = %entry.path, "Ignoring out-of-scope entry");
                }
                keep
            })
            .collect();
        entries.sort_by(|a, b| (a.path.depth(), &a.path).cmp(&(b.path.depth(), &b.path)));

        let listed: HashSet<ItemId> = entries.iter().map(|entry| entry.id.clone()).collect();
        let missing: Vec<ItemId> = self
            .stored_scope(base)
            .await?
            .into_iter()
            .filter(|record| !listed.contains(record.id()))
            .map(|record| record.id().clone())
            .collect();

        let mut report = MergeReport::default();

        for entry in entries {
            let existing = self.store.get(&entry.id).await.map_err(SyncError::storage)?;
            let incoming = match entry.into_record() {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unusable remote entry");
                    continue;
                }
            };

            let record = match existing {
                None => {
                    report.added += 1;
                    incoming
                }
                Some(current) => {
                    if current.path() != incoming.path() {
                        report.moved += 1;
                        tracing::debug!(
                            item_id = %current.id(),
                            from = %current.path(),
                            to = %incoming.path(),
                            "Detected remote move"
                        );
                    } else if differs(&current, &incoming) {
                        report.updated += 1;
                    } else {
                        continue;
                    }
                    keep_local_state(&current, incoming)
                }
            };

            self.store.upsert(&record).await.map_err(SyncError::storage)?;
        }

        for id in &missing {
            if let Some(removed) = self.store.delete(id).await.map_err(SyncError::storage)? {
                tracing::debug!(item_id = %id, removed = removed.len(), "Removed vanished item");
            }
        }
        report.deleted = missing.len();

        tracing::info!(
            path = %base,
            added = report.added,
            updated = report.updated,
            moved = report.moved,
            deleted = report.deleted,
            "Enumeration merged"
        );
        Ok(report)
    }

    /// Serves one page of the stored listing of `container`
    ///
    /// # Errors
    ///
    /// `NoSuchItem` for an unknown container, `Storage` if the store fails.
    pub async fn page(
        &self,
        container: &ItemId,
        offset: usize,
    ) -> Result<EnumerationPage, SyncError> {
        let base = self.adapter.resolve_directory_path(container).await?;
        let records = self.stored_scope(&base).await?;

        if offset >= records.len() {
            return Ok(EnumerationPage {
                items: Vec::new(),
                next_page: None,
            });
        }
        let end = (offset + self.page_size).min(records.len());

        let items = match self.mode {
            EnumerationMode::Fast => records[offset..end]
                .iter()
                .map(|record| ItemAdapter::adapt_with_parent(record, container.clone()))
                .collect(),
            EnumerationMode::Full => {
                let mut parents: HashMap<RemotePath, ItemId> = records
                    .iter()
                    .filter(|record| record.is_directory())
                    .map(|record| (record.path(), record.id().clone()))
                    .collect();
                parents.insert(base.clone(), container.clone());

                let mut items = Vec::with_capacity(end - offset);
                for record in &records[offset..end] {
                    let item = match parents.get(record.parent_path()) {
                        Some(parent) => ItemAdapter::adapt_with_parent(record, parent.clone()),
                        None => self.adapter.adapt(record).await,
                    };
                    items.push(item);
                }
                items
            }
        };

        let next_page = (end < records.len()).then(|| encode_page_token(container, end));
        Ok(EnumerationPage { items, next_page })
    }

    /// Serves the page a continuation token points at
    ///
    /// # Errors
    ///
    /// `NoSuchItem` for a malformed token or one issued for another container.
    pub async fn resume(
        &self,
        container: &ItemId,
        token: &PageToken,
    ) -> Result<EnumerationPage, SyncError> {
        let (token_container, offset) = decode_page_token(token)?;
        if &token_container != container {
            return Err(SyncError::NoSuchItem(format!(
                "page token for {} used with {}",
                token_container, container
            )));
        }
        self.page(container, offset).await
    }
}

fn differs(current: &ItemRecord, incoming: &ItemRecord) -> bool {
    current.etag() != incoming.etag()
        || current.size() != incoming.size()
        || current.modified() != incoming.modified()
        || current.is_directory() != incoming.is_directory()
}

/// Remote attributes from `incoming`, sync state from `current`
fn keep_local_state(current: &ItemRecord, incoming: ItemRecord) -> ItemRecord {
    let content_type = incoming
        .content_type()
        .or(current.content_type())
        .map(str::to_string);
    incoming
        .with_content_type(content_type)
        .with_status(current.status(), current.session_error().map(str::to_string))
        .with_transfer_handle(current.transfer_handle().cloned())
}
