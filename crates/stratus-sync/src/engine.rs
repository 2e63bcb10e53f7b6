//! Item synchronization engine
//!
//! The [`SyncEngine`] serves host projection requests for one domain. It
//! validates preconditions, runs every remote-affecting operation as a
//! single job on the domain's ordering lane, and reconciles the result into
//! the metadata store.
//!
//! ## Operation Flow
//!
//! ```text
//! host request ──► SyncEngine ──► OperationSerializer lane ──► IRemoteClient
//!                                                                  │
//!      ProjectedItem ◄── ItemAdapter ◄── IMetadataStore update ◄───┘
//! ```
//!
//! ## Modify ordering
//!
//! A modify that renames and replaces content runs as one lane job. The
//! move call and the store cascade finish before the upload is issued, and
//! a failed upload never reverts the move: the record stays at its new path
//! with status `upload_error`.
//!
//! ## Error bookkeeping
//!
//! Failures are always returned to the caller. Status and session-error
//! writes made while handling a failure are best-effort and only logged.
//! Downloads also run on the lane, so a fetch waits for a pending upload of
//! the same item instead of racing it. The registry refuses a second
//! transfer for an item that already has one.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::RwLock;

use stratus_core::config::{Config, EnumerationMode};
use stratus_core::domain::{
    Account, ChangedFields, ItemField, ItemId, ItemRecord, ItemStatus, ItemTemplate,
    ProjectedItem, RemoteError, RemotePath, SyncError, TransferHandle, TransferKind,
};
use stratus_core::ports::{
    ChangeReason, EnumerationPage, FetchedContents, IChangeSignaler, IMetadataStore,
    IProjectionHost, IRemoteClient, ISyncEventSink, PageToken, SyncEvent,
};

use crate::adapter::ItemAdapter;
use crate::enumerator::{Enumerator, MergeReport};
use crate::serializer::{LaneKey, OperationSerializer};
use crate::transfers::{TransferRegistry, TransferTicket, CANCELLED_MESSAGE};

/// Default number of items per enumeration page
pub const DEFAULT_PAGE_SIZE: usize = 100;

// ============================================================================
// EngineSettings
// ============================================================================

/// Per-domain engine settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Domain identifier, also the ordering lane name
    pub domain: String,
    pub mode: EnumerationMode,
    pub page_size: usize,
}

impl EngineSettings {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            mode: EnumerationMode::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            domain: config.domain.identifier.clone(),
            mode: config.enumeration.mode,
            page_size: config.enumeration.page_size,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: EnumerationMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

struct EngineInner {
    settings: EngineSettings,
    remote: Arc<dyn IRemoteClient>,
    store: Arc<dyn IMetadataStore>,
    serializer: OperationSerializer,
    transfers: TransferRegistry,
    adapter: ItemAdapter,
    enumerator: Enumerator,
    signaler: Arc<dyn IChangeSignaler>,
    events: Option<Arc<dyn ISyncEventSink>>,
    account: RwLock<Option<Account>>,
}

/// Synchronization engine for one domain
///
/// Cheap to clone; clones share the same lanes, registry and account.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    /// Creates an engine with no account set
    ///
    /// # Arguments
    /// * `settings` - Domain identifier and enumeration settings
    /// * `remote` - Backend operations (IRemoteClient)
    /// * `store` - Item records (IMetadataStore)
    /// * `signaler` - Working-set notifications for the host
    /// * `events` - Optional companion event sink
    pub fn new(
        settings: EngineSettings,
        remote: Arc<dyn IRemoteClient>,
        store: Arc<dyn IMetadataStore>,
        signaler: Arc<dyn IChangeSignaler>,
        events: Option<Arc<dyn ISyncEventSink>>,
    ) -> Self {
        let enumerator = Enumerator::new(
            Arc::clone(&remote),
            Arc::clone(&store),
            settings.mode,
            settings.page_size,
        );
        Self {
            inner: Arc::new(EngineInner {
                adapter: ItemAdapter::new(Arc::clone(&store)),
                transfers: TransferRegistry::new(Arc::clone(&store)),
                serializer: OperationSerializer::new(),
                enumerator,
                settings,
                remote,
                store,
                signaler,
                events,
                account: RwLock::new(None),
            }),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.inner.settings
    }

    pub fn transfers(&self) -> &TransferRegistry {
        &self.inner.transfers
    }

    pub fn serializer(&self) -> &OperationSerializer {
        &self.inner.serializer
    }

    /// Establishes or clears the account for the domain
    pub async fn set_account(&self, account: Option<Account>) {
        match &account {
            Some(a) => tracing::info!(account = %a.display_name(), domain = %a.domain, "Account set"),
            None => tracing::info!(domain = %self.inner.settings.domain, "Account cleared"),
        }
        *self.inner.account.write().await = account;
    }

    pub async fn account(&self) -> Option<Account> {
        self.inner.account.read().await.clone()
    }

    /// Moves transfers a previous process left in flight to their error state
    ///
    /// # Errors
    ///
    /// Returns an error if the in-flight records cannot be listed.
    pub async fn recover_interrupted(&self) -> anyhow::Result<usize> {
        let recovered = self.inner.transfers.recover_interrupted().await?;
        if recovered > 0 {
            tracing::warn!(recovered, "Recovered interrupted transfers");
        }
        Ok(recovered)
    }

    /// Stops accepting operations and waits for queued ones to finish
    pub async fn shutdown(&self) {
        self.inner.serializer.shutdown().await;
    }

    // ========================================================================
    // Item lookup
    // ========================================================================

    /// Current projection of an item
    ///
    /// # Errors
    ///
    /// `NoSuchItem` if the item is not stored, `Storage` if the lookup fails.
    pub async fn item_for(&self, id: &ItemId) -> Result<ProjectedItem, SyncError> {
        if id.is_root() {
            return Ok(ItemAdapter::root_item());
        }
        let record = self.require_record(id).await?;
        Ok(self.inner.adapter.adapt(&record).await)
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Creates a directory or file on the backend and records it
    ///
    /// `contents` of `None` creates an empty file. No record is stored
    /// unless the backend confirms the item.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without an account, `NoSuchItem` for an unknown
    /// parent or an invalid name, or the mapped remote error.
    #[tracing::instrument(skip(self, template, contents), fields(name = %template.filename, parent = %template.parent_identifier))]
    pub async fn create_item(
        &self,
        template: &ItemTemplate,
        contents: Option<&Path>,
    ) -> Result<ProjectedItem, SyncError> {
        let result = async {
            self.require_account().await?;
            let this = self.clone();
            let template = template.clone();
            let contents = contents.map(Path::to_path_buf);
            self.inner
                .serializer
                .submit(&self.lane(), async move {
                    this.create_on_lane(template, contents).await
                })
                .await?
        }
        .await;

        if let Err(err) = &result {
            self.report_failure(None, "create", err);
        }
        result
    }

    async fn create_on_lane(
        &self,
        template: ItemTemplate,
        contents: Option<PathBuf>,
    ) -> Result<ProjectedItem, SyncError> {
        let parent_path = self
            .inner
            .adapter
            .resolve_directory_path(&template.parent_identifier)
            .await?;
        let path = parent_path.join(&template.filename)?;
        if let Some(existing) = self
            .inner
            .store
            .get_by_path(&path)
            .await
            .map_err(SyncError::storage)?
        {
            return Err(SyncError::RemoteOperationFailed {
                code: 412,
                description: format!("{} already exists as item {}", path, existing.id()),
            });
        }

        let record = if template.is_directory {
            let entry = self.inner.remote.create_directory(&path).await?;
            entry.into_record()?
        } else {
            let mut ticket = self
                .inner
                .transfers
                .begin(ItemId::provisional(), TransferKind::Upload)?;
            let observer = ticket.observer();
            let result = self
                .track(
                    &mut ticket,
                    self.inner.remote.upload(&path, contents.as_deref(), false, &observer),
                )
                .await;
            self.inner.transfers.finish(ticket);
            let outcome = result?;

            let mut record = ItemRecord::at_path(outcome.id, &path, false)?
                .with_etag(outcome.etag)
                .with_size(outcome.size)
                .with_modified(outcome.modified);
            record.set_content_type(template.content_type.clone());
            record
        };

        self.inner
            .store
            .upsert(&record)
            .await
            .map_err(SyncError::storage)?;

        tracing::info!(item_id = %record.id(), path = %path, "Item created");
        self.emit(SyncEvent::ItemCreated {
            id: record.id().clone(),
            path,
        });
        Ok(self.inner.adapter.adapt(&record).await)
    }

    // ========================================================================
    // Modify
    // ========================================================================

    /// Applies a rename/move and/or content replacement
    ///
    /// The structural change is durable before any upload starts. A failed
    /// upload leaves the item at its new location with status `upload_error`.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without an account, `NoSuchItem` for an unknown
    /// item, parent or missing contents, or the mapped remote error.
    #[tracing::instrument(skip(self, item, changed, contents), fields(item_id = %item.identifier))]
    pub async fn modify_item(
        &self,
        item: &ProjectedItem,
        changed: &ChangedFields,
        contents: Option<&Path>,
    ) -> Result<ProjectedItem, SyncError> {
        let result = async {
            self.require_account().await?;
            let this = self.clone();
            let item = item.clone();
            let changed = changed.clone();
            let contents = contents.map(Path::to_path_buf);
            self.inner
                .serializer
                .submit(&self.lane(), async move {
                    this.modify_on_lane(item, changed, contents).await
                })
                .await?
        }
        .await;

        if let Err(err) = &result {
            self.report_failure(Some(&item.identifier), "modify", err);
        }
        result
    }

    async fn modify_on_lane(
        &self,
        item: ProjectedItem,
        changed: ChangedFields,
        contents: Option<PathBuf>,
    ) -> Result<ProjectedItem, SyncError> {
        let structural = changed.has_structural_change();
        let content = changed.has_content_change();

        // Directories carry no content; anything else without a structural
        // or content change is a no-op.
        if (item.is_directory() && !structural) || (!structural && !content) {
            tracing::debug!(item_id = %item.identifier, "Nothing to propagate");
            return Ok(item);
        }

        let id = item.identifier.clone();
        let mut current: Option<ItemRecord> = None;

        if structural {
            let record = self.require_record(&id).await?;
            let record = self.apply_structural_change(record, &item, &changed).await?;
            if record.is_directory() {
                self.emit(SyncEvent::ItemModified {
                    id: id.clone(),
                    path: record.path(),
                });
                return Ok(self.inner.adapter.adapt(&record).await);
            }
            current = Some(record);
        }

        if content {
            let contents = contents.ok_or_else(|| {
                SyncError::NoSuchItem(format!("no content supplied for {}", id))
            })?;
            let record = match current {
                Some(record) => record,
                None => self.require_record(&id).await?,
            };
            if record.is_directory() {
                return Ok(self.inner.adapter.adapt(&record).await);
            }
            current = Some(self.upload_contents(record, &contents).await?);
        }

        let record = match current {
            Some(record) => record,
            None => self.require_record(&id).await?,
        };
        self.emit(SyncEvent::ItemModified {
            id,
            path: record.path(),
        });
        Ok(self.inner.adapter.adapt(&record).await)
    }

    /// Moves the item remotely, then in the store (cascading for directories)
    async fn apply_structural_change(
        &self,
        record: ItemRecord,
        item: &ProjectedItem,
        changed: &ChangedFields,
    ) -> Result<ItemRecord, SyncError> {
        let new_parent = if changed.contains(ItemField::ParentIdentifier) {
            self.inner
                .adapter
                .resolve_directory_path(&item.parent_identifier)
                .await?
        } else {
            record.parent_path().clone()
        };
        let new_name = if changed.contains(ItemField::Filename) {
            item.filename.as_str()
        } else {
            record.name()
        };

        let old_path = record.path();
        let new_path = new_parent.join(new_name)?;
        if old_path == new_path {
            return Ok(record);
        }
        if record.is_directory() && new_path.is_descendant_of(&old_path) {
            return Err(SyncError::RemoteOperationFailed {
                code: 409,
                description: format!("cannot move {} into itself", old_path),
            });
        }

        self.inner
            .remote
            .move_item(&old_path, &new_path, false)
            .await?;

        let moved = self
            .inner
            .store
            .rename_and_cascade(record.id(), &new_parent, new_name)
            .await
            .map_err(SyncError::storage)?
            .ok_or_else(|| SyncError::NoSuchItem(record.id().to_string()))?;

        if moved.is_directory() {
            self.inner
                .signaler
                .signal_working_set(ChangeReason::DirectoryMoved {
                    id: moved.id().clone(),
                });
        }
        tracing::info!(
            item_id = %moved.id(),
            from = %old_path,
            to = %new_path,
            directory = moved.is_directory(),
            "Item moved"
        );
        Ok(moved)
    }

    /// Uploads new content to the record's current path
    async fn upload_contents(
        &self,
        record: ItemRecord,
        contents: &Path,
    ) -> Result<ItemRecord, SyncError> {
        let id = record.id().clone();
        let path = record.path();

        let mut ticket = self.inner.transfers.begin(id.clone(), TransferKind::Upload)?;
        if let Err(e) = self
            .inner
            .store
            .set_status(&id, ItemStatus::Uploading, None)
            .await
        {
            tracing::warn!(item_id = %id, error = %e, "Failed to mark item uploading");
        }

        let observer = ticket.observer();
        let result = self
            .track(
                &mut ticket,
                self.inner.remote.upload(&path, Some(contents), true, &observer),
            )
            .await;
        self.inner.transfers.finish(ticket);

        match result {
            Ok(outcome) => {
                if outcome.id != id {
                    tracing::warn!(
                        item_id = %id,
                        reported = %outcome.id,
                        "Backend reported a different identifier for a replaced item"
                    );
                }
                let mut updated = record;
                updated.apply_remote_version(outcome.etag, outcome.size, outcome.modified);
                updated.set_status(ItemStatus::Normal, None);
                updated.set_transfer_handle(None);
                self.inner
                    .store
                    .upsert(&updated)
                    .await
                    .map_err(SyncError::storage)?;
                tracing::info!(item_id = %id, path = %path, etag = %updated.etag(), "Content uploaded");
                Ok(updated)
            }
            Err(SyncError::Cancelled) => {
                self.settle_cancelled(&id, TransferKind::Upload).await;
                Err(SyncError::Cancelled)
            }
            Err(err) => {
                self.record_transfer_failure(&id, TransferKind::Upload, &err)
                    .await;
                Err(err)
            }
        }
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Deletes an item remotely, then its record and any descendants
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without an account, `NoSuchItem` for an unknown
    /// item, or the mapped remote error (the record is kept).
    #[tracing::instrument(skip(self))]
    pub async fn delete_item(&self, id: &ItemId) -> Result<(), SyncError> {
        let result = async {
            self.require_account().await?;
            let this = self.clone();
            let owned = id.clone();
            self.inner
                .serializer
                .submit(&self.lane(), async move { this.delete_on_lane(owned).await })
                .await?
        }
        .await;

        if let Err(err) = &result {
            self.report_failure(Some(id), "delete", err);
        }
        result
    }

    async fn delete_on_lane(&self, id: ItemId) -> Result<(), SyncError> {
        let record = self.require_record(&id).await?;
        let path = record.path();

        self.inner.remote.delete(&path).await?;

        let removed = self
            .inner
            .store
            .delete(&id)
            .await
            .map_err(SyncError::storage)?
            .unwrap_or_default();
        for removed_id in &removed {
            self.inner.transfers.discard(removed_id);
        }

        if record.is_directory() {
            self.inner
                .signaler
                .signal_working_set(ChangeReason::DirectoryDeleted { id: id.clone() });
        }
        tracing::info!(item_id = %id, path = %path, removed = removed.len(), "Item deleted");
        self.emit(SyncEvent::ItemDeleted { id, path });
        Ok(())
    }

    // ========================================================================
    // Fetch contents
    // ========================================================================

    /// Downloads the latest content of a file
    ///
    /// # Errors
    ///
    /// `FeatureUnsupported` for an explicit version or a directory,
    /// `NotAuthenticated` without an account, `NoSuchItem` for an unknown
    /// item, `Cancelled`, or the mapped remote error.
    #[tracing::instrument(skip(self))]
    pub async fn fetch_contents(
        &self,
        id: &ItemId,
        version: Option<&str>,
    ) -> Result<FetchedContents, SyncError> {
        let result = self.fetch_inner(id, version).await;
        if let Err(err) = &result {
            self.report_failure(Some(id), "fetch", err);
        }
        result
    }

    async fn fetch_inner(
        &self,
        id: &ItemId,
        version: Option<&str>,
    ) -> Result<FetchedContents, SyncError> {
        self.require_account().await?;
        if let Some(version) = version {
            return Err(SyncError::FeatureUnsupported(format!(
                "fetching version {} of {}; only the latest version is available",
                version, id
            )));
        }

        // Queued behind any upload or move of the same item on the lane
        let this = self.clone();
        let owned = id.clone();
        self.inner
            .serializer
            .submit(&self.lane(), async move { this.fetch_on_lane(owned).await })
            .await?
    }

    async fn fetch_on_lane(&self, id: ItemId) -> Result<FetchedContents, SyncError> {
        let record = self.require_record(&id).await?;
        if record.is_directory() {
            return Err(SyncError::FeatureUnsupported(format!(
                "{} is a directory and has no content",
                id
            )));
        }

        let mut ticket = self
            .inner
            .transfers
            .begin(id.clone(), TransferKind::Download)?;
        if let Err(e) = self
            .inner
            .store
            .set_status(&id, ItemStatus::Downloading, None)
            .await
        {
            tracing::warn!(item_id = %id, error = %e, "Failed to mark item downloading");
        }

        let path = record.path();
        let observer = ticket.observer();
        let result = self
            .track(&mut ticket, self.inner.remote.download(&path, &observer))
            .await;
        self.inner.transfers.finish(ticket);

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(SyncError::Cancelled) => {
                self.settle_cancelled(&id, TransferKind::Download).await;
                return Err(SyncError::Cancelled);
            }
            Err(err) => {
                self.record_transfer_failure(&id, TransferKind::Download, &err)
                    .await;
                return Err(err);
            }
        };

        let mut refreshed = record;
        refreshed.apply_remote_version(outcome.etag, outcome.size, outcome.modified);
        refreshed.set_status(ItemStatus::Normal, None);
        refreshed.set_transfer_handle(None);
        self.inner
            .store
            .upsert(&refreshed)
            .await
            .map_err(SyncError::storage)?;

        tracing::info!(
            item_id = %id,
            local = %outcome.local_file.display(),
            etag = %refreshed.etag(),
            "Content fetched"
        );
        Ok(FetchedContents {
            path: outcome.local_file,
            item: self.inner.adapter.adapt(&refreshed).await,
        })
    }

    // ========================================================================
    // Transfers
    // ========================================================================

    /// Cancels the active transfer of an item
    ///
    /// Returns false if no transfer was active.
    pub async fn cancel_transfer(&self, id: &ItemId) -> bool {
        match self.inner.transfers.cancel(id).await {
            Some(kind) => {
                self.emit(SyncEvent::TransferCancelled {
                    id: id.clone(),
                    kind,
                });
                true
            }
            None => false,
        }
    }

    /// Runs a remote transfer until it finishes or is cancelled
    ///
    /// Task handles reported meanwhile are persisted on the record.
    async fn track<T, F>(&self, ticket: &mut TransferTicket, transfer: F) -> Result<T, SyncError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        tokio::pin!(transfer);
        let cancel = ticket.cancel_token();
        let item_id = ticket.item_id().clone();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(item_id = %item_id, "Transfer cancelled while running");
                    return Err(SyncError::Cancelled);
                }
                Some(handle) = ticket.next_handle() => {
                    self.persist_handle(&item_id, &handle).await;
                }
                result = &mut transfer => {
                    return result.map_err(SyncError::from);
                }
            }
        }
    }

    async fn persist_handle(&self, id: &ItemId, handle: &TransferHandle) {
        match self.inner.store.set_transfer_handle(id, Some(handle)).await {
            Ok(Some(_)) => tracing::debug!(item_id = %id, handle = %handle, "Transfer handle saved"),
            Ok(None) => tracing::trace!(item_id = %id, "No record yet for transfer handle"),
            Err(e) => {
                tracing::warn!(item_id = %id, error = %e, "Failed to save transfer handle");
            }
        }
    }

    /// Records a cancellation that did not come through `cancel_transfer`
    ///
    /// `TransferRegistry::cancel` already moves the record to its error
    /// state; anything still marked as transferring is settled here.
    async fn settle_cancelled(&self, id: &ItemId, kind: TransferKind) {
        match self.inner.store.get(id).await {
            Ok(Some(record)) if record.status().is_transferring() => {
                tracing::info!(item_id = %id, %kind, "Settling transfer stopped without cancel request");
                if let Err(e) = self
                    .inner
                    .store
                    .set_status(id, ItemStatus::error_for(kind), Some(CANCELLED_MESSAGE))
                    .await
                {
                    tracing::error!(item_id = %id, error = %e, "Failed to record cancelled transfer");
                }
                if let Err(e) = self.inner.store.set_transfer_handle(id, None).await {
                    tracing::warn!(item_id = %id, error = %e, "Failed to clear transfer handle");
                }
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(item_id = %id, error = %e, "Failed to read cancelled item");
            }
        }
    }

    async fn record_transfer_failure(&self, id: &ItemId, kind: TransferKind, err: &SyncError) {
        let description = err.to_string();
        if let Err(e) = self
            .inner
            .store
            .set_status(id, ItemStatus::error_for(kind), Some(&description))
            .await
        {
            tracing::error!(item_id = %id, error = %e, "Failed to record transfer failure");
        }
        if let Err(e) = self.inner.store.set_transfer_handle(id, None).await {
            tracing::warn!(item_id = %id, error = %e, "Failed to clear transfer handle");
        }
    }

    // ========================================================================
    // Enumeration
    // ========================================================================

    /// Lists a container, one page at a time
    ///
    /// The first call (no token) refreshes the container from the remote on
    /// the domain lane before serving the first page.
    ///
    /// # Errors
    ///
    /// `NotAuthenticated` without an account, `NoSuchItem` for an unknown
    /// container or a malformed token, or the mapped remote error.
    #[tracing::instrument(skip(self, page))]
    pub async fn enumerate(
        &self,
        container: &ItemId,
        page: Option<&PageToken>,
    ) -> Result<EnumerationPage, SyncError> {
        let result = async {
            self.require_account().await?;
            match page {
                Some(token) => self.inner.enumerator.resume(container, token).await,
                None => {
                    self.refresh(container).await?;
                    self.inner.enumerator.page(container, 0).await
                }
            }
        }
        .await;

        if let Err(err) = &result {
            self.report_failure(Some(container), "enumerate", err);
        }
        result
    }

    /// Lists a container on the remote and merges the result into the store
    ///
    /// # Errors
    ///
    /// Same as [`SyncEngine::enumerate`].
    pub async fn refresh(&self, container: &ItemId) -> Result<MergeReport, SyncError> {
        let enumerator = self.inner.enumerator.clone();
        let owned = container.clone();
        let report = self
            .inner
            .serializer
            .submit(&self.lane(), async move { enumerator.refresh(&owned).await })
            .await??;

        if !report.is_empty() {
            self.inner
                .signaler
                .signal_working_set(ChangeReason::EnumerationMerged {
                    container: container.clone(),
                });
        }
        self.emit(SyncEvent::EnumerationFinished {
            container: container.clone(),
            added: report.added,
            updated: report.updated,
            moved: report.moved,
            deleted: report.deleted,
        });
        Ok(report)
    }

    /// The host reports a change in its materialized set
    pub fn materialized_items_changed(&self) {
        tracing::debug!("Materialized items changed");
        self.inner
            .signaler
            .signal_working_set(ChangeReason::MaterializedItemsChanged);
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn lane(&self) -> LaneKey {
        LaneKey::domain(self.inner.settings.domain.as_str())
    }

    async fn require_account(&self) -> Result<Account, SyncError> {
        self.inner
            .account
            .read()
            .await
            .clone()
            .ok_or(SyncError::NotAuthenticated)
    }

    async fn require_record(&self, id: &ItemId) -> Result<ItemRecord, SyncError> {
        if id.is_root() {
            return Err(SyncError::NoSuchItem(
                "the root container has no record".to_string(),
            ));
        }
        self.inner
            .store
            .get(id)
            .await
            .map_err(SyncError::storage)?
            .ok_or_else(|| SyncError::NoSuchItem(id.to_string()))
    }

    fn emit(&self, event: SyncEvent) {
        if let Some(events) = &self.inner.events {
            tracing::trace!(event = event.kind(), "Emitting sync event");
            events.emit(event);
        }
    }

    fn report_failure(&self, id: Option<&ItemId>, operation: &str, err: &SyncError) {
        tracing::warn!(
            item_id = ?id.map(ItemId::as_str),
            operation,
            code = err.code(),
            error = %err,
            "Operation failed"
        );
        self.emit(SyncEvent::ItemFailed {
            id: id.cloned(),
            operation: operation.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
        });
    }
}

// ============================================================================
// IProjectionHost
// ============================================================================

#[async_trait::async_trait]
impl IProjectionHost for SyncEngine {
    async fn item_for(&self, id: &ItemId) -> Result<ProjectedItem, SyncError> {
        SyncEngine::item_for(self, id).await
    }

    async fn fetch_contents(
        &self,
        id: &ItemId,
        version: Option<&str>,
    ) -> Result<FetchedContents, SyncError> {
        SyncEngine::fetch_contents(self, id, version).await
    }

    async fn create_item(
        &self,
        template: &ItemTemplate,
        contents: Option<&Path>,
    ) -> Result<ProjectedItem, SyncError> {
        SyncEngine::create_item(self, template, contents).await
    }

    async fn modify_item(
        &self,
        item: &ProjectedItem,
        changed: &ChangedFields,
        contents: Option<&Path>,
    ) -> Result<ProjectedItem, SyncError> {
        SyncEngine::modify_item(self, item, changed, contents).await
    }

    async fn delete_item(&self, id: &ItemId) -> Result<(), SyncError> {
        SyncEngine::delete_item(self, id).await
    }

    async fn enumerate(
        &self,
        container: &ItemId,
        page: Option<&PageToken>,
    ) -> Result<EnumerationPage, SyncError> {
        SyncEngine::enumerate(self, container, page).await
    }

    fn materialized_items_changed(&self) {
        SyncEngine::materialized_items_changed(self)
    }
}
