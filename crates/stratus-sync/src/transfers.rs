//! Progress/task registry for uploads and downloads.
//!
//! Provides [`TransferRegistry`], which tracks in-flight transfers keyed by
//! item identifier.
//!
//! - **Progress tracking**: a watch channel per transfer
//! - **Cancellation**: a `CancellationToken` per transfer, observed by the
//!   engine while the remote call runs
//! - **Reattachment**: background task handles reported by the remote
//!   client are persisted on the record and can be looked up again
//!
//! The registry is in-memory. After a restart, [`TransferRegistry::recover_interrupted`]
//! moves records a previous process left mid-transfer into their error state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use stratus_core::domain::{ItemId, ItemStatus, SyncError, TransferHandle, TransferKind};
use stratus_core::ports::{IMetadataStore, TransferObserver};

/// Session error recorded when the host cancels a transfer
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Session error recorded for transfers cut short by a previous shutdown
pub const INTERRUPTED_MESSAGE: &str = "transfer interrupted";

// ============================================================================
// TransferProgress
// ============================================================================

/// Bytes moved so far out of the expected total
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferProgress {
    pub completed: u64,
    pub total: u64,
}

impl TransferProgress {
    /// Completion as a fraction in `0.0..=1.0` (1.0 for empty transfers)
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.completed as f64 / self.total as f64).min(1.0)
    }
}

// ============================================================================
// ActiveTransfer / TransferTicket
// ============================================================================

struct ActiveTransfer {
    serial: u64,
    kind: TransferKind,
    cancel: CancellationToken,
    progress: Arc<watch::Sender<TransferProgress>>,
    handle: Option<TransferHandle>,
    started_at: DateTime<Utc>,
}

/// Callback sink handed to the remote client for one transfer
///
/// Progress goes to the registry's watch channel. Task handles are recorded
/// in the registry and forwarded to the ticket holder so they can be
/// persisted while the transfer is still running.
#[derive(Clone)]
pub struct TicketObserver {
    item_id: ItemId,
    serial: u64,
    active: Arc<DashMap<ItemId, ActiveTransfer>>,
    progress: Arc<watch::Sender<TransferProgress>>,
    handles: mpsc::UnboundedSender<TransferHandle>,
}

impl TransferObserver for TicketObserver {
    fn on_progress(&self, completed: u64, total: u64) {
        self.progress.send_replace(TransferProgress { completed, total });
    }

    fn on_task(&self, handle: TransferHandle) {
        if let Some(mut entry) = self.active.get_mut(&self.item_id) {
            if entry.serial == self.serial {
                entry.handle = Some(handle.clone());
            }
        }
        tracing::debug!(item_id = %self.item_id, handle = %handle, "Transfer task started");
        let _ = self.handles.send(handle);
    }
}

/// Ownership of one registered transfer
///
/// Return it to [`TransferRegistry::finish`] when the transfer ends.
pub struct TransferTicket {
    item_id: ItemId,
    kind: TransferKind,
    serial: u64,
    cancel: CancellationToken,
    observer: TicketObserver,
    handles: mpsc::UnboundedReceiver<TransferHandle>,
}

impl TransferTicket {
    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    pub fn kind(&self) -> TransferKind {
        self.kind
    }

    /// Observer to pass to the remote client
    pub fn observer(&self) -> TicketObserver {
        self.observer.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Next task handle reported by the remote client
    pub async fn next_handle(&mut self) -> Option<TransferHandle> {
        self.handles.recv().await
    }
}

// ============================================================================
// TransferRegistry
// ============================================================================

/// Tracks cancellable, observable transfers by item identifier
pub struct TransferRegistry {
    active: Arc<DashMap<ItemId, ActiveTransfer>>,
    store: Arc<dyn IMetadataStore>,
    next_serial: AtomicU64,
}

impl TransferRegistry {
    pub fn new(store: Arc<dyn IMetadataStore>) -> Self {
        Self {
            active: Arc::new(DashMap::new()),
            store,
            next_serial: AtomicU64::new(1),
        }
    }

    /// Registers a new transfer for `item_id`
    ///
    /// # Errors
    ///
    /// Fails with a 409 `RemoteOperationFailed` while another transfer is
    /// registered for the same item. The running transfer is left alone.
    pub fn begin(&self, item_id: ItemId, kind: TransferKind) -> Result<TransferTicket, SyncError> {
        let cancel = CancellationToken::new();
        let (progress_tx, _) = watch::channel(TransferProgress::default());
        let progress = Arc::new(progress_tx);
        let (handles_tx, handles_rx) = mpsc::unbounded_channel();

        let serial = match self.active.entry(item_id.clone()) {
            Entry::Occupied(existing) => {
                let running = existing.get().kind;
                tracing::warn!(item_id = %item_id, ?kind, ?running, "Transfer refused, item busy");
                return Err(SyncError::RemoteOperationFailed {
                    code: 409,
                    description: format!("{} of {} already in progress", running, item_id),
                });
            }
            Entry::Vacant(slot) => {
                let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);
                slot.insert(ActiveTransfer {
                    serial,
                    kind,
                    cancel: cancel.clone(),
                    progress: Arc::clone(&progress),
                    handle: None,
                    started_at: Utc::now(),
                });
                serial
            }
        };

        tracing::debug!(item_id = %item_id, ?kind, "Transfer registered");

        Ok(TransferTicket {
            item_id: item_id.clone(),
            kind,
            serial,
            cancel,
            observer: TicketObserver {
                item_id,
                serial,
                active: Arc::clone(&self.active),
                progress,
                handles: handles_tx,
            },
            handles: handles_rx,
        })
    }

    /// Releases a finished transfer
    ///
    /// Has no effect if the transfer was cancelled or discarded meanwhile.
    pub fn finish(&self, ticket: TransferTicket) {
        let removed = self
            .active
            .remove_if(&ticket.item_id, |_, entry| entry.serial == ticket.serial);
        if let Some((id, entry)) = removed {
            let elapsed = Utc::now() - entry.started_at;
            tracing::debug!(
                item_id = %id,
                kind = ?entry.kind,
                elapsed_ms = elapsed.num_milliseconds(),
                "Transfer finished"
            );
        }
    }

    /// Latest progress of the transfer for `id`
    pub fn progress(&self, id: &ItemId) -> Option<TransferProgress> {
        self.active.get(id).map(|entry| *entry.progress.borrow())
    }

    /// Watch the progress of the transfer for `id`
    pub fn subscribe(&self, id: &ItemId) -> Option<watch::Receiver<TransferProgress>> {
        self.active.get(id).map(|entry| entry.progress.subscribe())
    }

    pub fn is_active(&self, id: &ItemId) -> bool {
        self.active.contains_key(id)
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Kind of the transfer for `id`, if one is active
    pub fn kind_of(&self, id: &ItemId) -> Option<TransferKind> {
        self.active.get(id).map(|entry| entry.kind)
    }

    /// Finds a live transfer by the task handle the remote client reported
    pub fn reattach(
        &self,
        handle: &TransferHandle,
    ) -> Option<(ItemId, watch::Receiver<TransferProgress>)> {
        self.active.iter().find_map(|entry| {
            (entry.handle.as_ref() == Some(handle))
                .then(|| (entry.key().clone(), entry.progress.subscribe()))
        })
    }

    /// Cancels the transfer for `id`
    ///
    /// The record moves to the transfer's error state with session error
    /// `"cancelled"` and loses its persisted handle. Store failures are
    /// logged. Returns the kind of the cancelled transfer, or `None` if no
    /// transfer was active.
    pub async fn cancel(&self, id: &ItemId) -> Option<TransferKind> {
        let (_, entry) = self.active.remove(id)?;
        entry.cancel.cancel();

        let status = ItemStatus::error_for(entry.kind);
        if let Err(e) = self.store.set_status(id, status, Some(CANCELLED_MESSAGE)).await {
            tracing::error!(item_id = %id, error = %e, "Failed to record cancelled transfer");
        }
        if let Err(e) = self.store.set_transfer_handle(id, None).await {
            tracing::error!(item_id = %id, error = %e, "Failed to clear transfer handle");
        }

        tracing::info!(item_id = %id, kind = ?entry.kind, "Transfer cancelled");
        Some(entry.kind)
    }

    /// Stops the transfer for `id` without touching the store
    ///
    /// Used when the record itself is gone.
    pub fn discard(&self, id: &ItemId) {
        if let Some((_, entry)) = self.active.remove(id) {
            entry.cancel.cancel();
            tracing::debug!(item_id = %id, "Transfer discarded");
        }
    }

    /// Moves records left `uploading`/`downloading` by a previous process
    /// into the matching error state
    ///
    /// Records with a transfer live in this process are skipped. Persisted
    /// handles are kept. Returns the number of records recovered.
    ///
    /// # Errors
    ///
    /// Returns an error if the in-flight records cannot be listed.
    pub async fn recover_interrupted(&self) -> anyhow::Result<usize> {
        let stale = self.store.in_flight().await?;
        let mut recovered = 0;

        for record in stale {
            if self.is_active(record.id()) {
                continue;
            }
            let Some(kind) = record.status().transfer_kind() else {
                continue;
            };
            match self
                .store
                .set_status(record.id(), ItemStatus::error_for(kind), Some(INTERRUPTED_MESSAGE))
                .await
            {
                Ok(Some(_)) => {
                    recovered += 1;
                    tracing::info!(
                        item_id = %record.id(),
                        path = %record.path(),
                        handle = ?record.transfer_handle().map(TransferHandle::as_str),
                        "Recovered interrupted transfer"
                    );
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::error!(item_id = %record.id(), error = %e, "Failed to recover transfer");
                }
            }
        }

        Ok(recovered)
    }
}
